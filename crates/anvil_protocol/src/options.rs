//! Compilation request options.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anvil_diagnostics::ReportingFilter;
use serde::{Deserialize, Serialize};

/// Which kind of client is asking for a compile.
///
/// Serialized by canonical name so the daemon never depends on the client's
/// variant order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum CompilerMode {
    /// A plain, whole-module compile.
    NonIncremental,
    /// An incremental compile driven by [`IncrementalCompilationOptions`].
    Incremental,
    /// A build-system integration that manages its own incrementality.
    BuildSystem,
}

impl CompilerMode {
    const ALL: [CompilerMode; 3] = [
        CompilerMode::NonIncremental,
        CompilerMode::Incremental,
        CompilerMode::BuildSystem,
    ];

    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            CompilerMode::NonIncremental => "NON_INCREMENTAL_COMPILER",
            CompilerMode::Incremental => "INCREMENTAL_COMPILER",
            CompilerMode::BuildSystem => "BUILD_SYSTEM_COMPILER",
        }
    }

    /// Resolves a canonical name by exact match.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

impl From<CompilerMode> for String {
    fn from(mode: CompilerMode) -> Self {
        mode.name().to_string()
    }
}

impl TryFrom<String> for CompilerMode {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        CompilerMode::from_name(&name).ok_or_else(|| format!("unknown compiler mode '{name}'"))
    }
}

/// The kind of output the compiler produces.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TargetPlatform {
    /// Bytecode for the virtual machine target.
    Bytecode,
    /// Script output for the scripting target.
    Script,
    /// Metadata only (no executable code).
    Metadata,
}

impl TargetPlatform {
    const ALL: [TargetPlatform; 3] = [
        TargetPlatform::Bytecode,
        TargetPlatform::Script,
        TargetPlatform::Metadata,
    ];

    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            TargetPlatform::Bytecode => "bytecode",
            TargetPlatform::Script => "script",
            TargetPlatform::Metadata => "metadata",
        }
    }

    /// Resolves a canonical name by exact match.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<TargetPlatform> for String {
    fn from(platform: TargetPlatform) -> Self {
        platform.name().to_string()
    }
}

impl TryFrom<String> for TargetPlatform {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        TargetPlatform::from_name(&name).ok_or_else(|| format!("unknown target platform '{name}'"))
    }
}

/// What to compile and how to report it.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct CompilationOptions {
    /// Which kind of client is calling.
    pub compiler_mode: CompilerMode,
    /// The output kind.
    pub target_platform: TargetPlatform,
    /// Stable category codes of messages the caller wants.
    pub reporting_categories: BTreeSet<i32>,
    /// Stable code of the least severe message the caller wants.
    pub min_severity: i32,
    /// Present for incremental compiles.
    pub incremental: Option<IncrementalCompilationOptions>,
}

impl CompilationOptions {
    /// Creates non-incremental options from a reporting filter.
    pub fn new(compiler_mode: CompilerMode, target_platform: TargetPlatform, filter: ReportingFilter) -> Self {
        Self {
            compiler_mode,
            target_platform,
            reporting_categories: filter.categories,
            min_severity: filter.min_severity,
            incremental: None,
        }
    }

    /// Creates options for a build-system client with the given verbosity.
    pub fn for_build_system(target_platform: TargetPlatform, verbose: bool) -> Self {
        Self::new(
            CompilerMode::BuildSystem,
            target_platform,
            ReportingFilter::encode(verbose),
        )
    }

    /// Attaches the incremental extension and switches to incremental mode.
    pub fn with_incremental(mut self, incremental: IncrementalCompilationOptions) -> Self {
        self.compiler_mode = CompilerMode::Incremental;
        self.incremental = Some(incremental);
        self
    }

    /// The reporting filter these options carry.
    pub fn reporting_filter(&self) -> ReportingFilter {
        ReportingFilter {
            categories: self.reporting_categories.clone(),
            min_severity: self.min_severity,
        }
    }
}

/// The incremental extension of [`CompilationOptions`].
///
/// When `are_file_changes_known` is false the file sets carry no meaning; use
/// [`known_changes`](Self::known_changes) rather than reading them directly.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct IncrementalCompilationOptions {
    /// Whether the caller knows exactly which files changed.
    pub are_file_changes_known: bool,
    /// Files modified since the last build.
    pub modified_files: BTreeSet<PathBuf>,
    /// Files deleted since the last build.
    pub deleted_files: BTreeSet<PathBuf>,
    /// Directory holding incremental caches.
    pub working_dir: PathBuf,
    /// File (relative to `working_dir`) recording the cache version.
    pub custom_cache_version_file_name: String,
    /// The cache version the caller expects.
    pub custom_cache_version: i32,
}

impl IncrementalCompilationOptions {
    /// Options for a caller that knows exactly what changed.
    pub fn with_known_changes(
        modified_files: impl IntoIterator<Item = PathBuf>,
        deleted_files: impl IntoIterator<Item = PathBuf>,
        working_dir: impl Into<PathBuf>,
        custom_cache_version_file_name: impl Into<String>,
        custom_cache_version: i32,
    ) -> Self {
        Self {
            are_file_changes_known: true,
            modified_files: modified_files.into_iter().collect(),
            deleted_files: deleted_files.into_iter().collect(),
            working_dir: working_dir.into(),
            custom_cache_version_file_name: custom_cache_version_file_name.into(),
            custom_cache_version,
        }
    }

    /// Options for a caller that leaves change detection to the callee.
    pub fn with_unknown_changes(
        working_dir: impl Into<PathBuf>,
        custom_cache_version_file_name: impl Into<String>,
        custom_cache_version: i32,
    ) -> Self {
        Self {
            are_file_changes_known: false,
            modified_files: BTreeSet::new(),
            deleted_files: BTreeSet::new(),
            working_dir: working_dir.into(),
            custom_cache_version_file_name: custom_cache_version_file_name.into(),
            custom_cache_version,
        }
    }

    /// `(modified, deleted)` if the caller knows its changes, otherwise `None`.
    pub fn known_changes(&self) -> Option<(&BTreeSet<PathBuf>, &BTreeSet<PathBuf>)> {
        self.are_file_changes_known
            .then_some((&self.modified_files, &self.deleted_files))
    }

    /// Path of the cache version file.
    pub fn cache_version_path(&self) -> PathBuf {
        self.working_dir.join(Path::new(&self.custom_cache_version_file_name))
    }
}
