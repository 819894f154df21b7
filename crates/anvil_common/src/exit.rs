//! The closed exit-status vocabulary shared by the remote and fallback paths.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of a compile request.
///
/// Both the daemon and the in-process fallback report results in this
/// vocabulary. Across process or module boundaries a status travels by its
/// canonical name ([`ExitStatus::name`]) or its process exit code, never by
/// variant index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ExitStatus {
    /// Compilation finished without errors.
    Ok,
    /// The compiler reported errors in the user's sources.
    CompilationError,
    /// The compiler, daemon, or orchestration layer failed unexpectedly.
    InternalError,
    /// A script compiled and ran, but its execution failed.
    ScriptExecutionError,
    /// The compiler ran out of memory.
    OomError,
}

impl ExitStatus {
    /// Every status, in declaration order.
    pub const ALL: [ExitStatus; 5] = [
        ExitStatus::Ok,
        ExitStatus::CompilationError,
        ExitStatus::InternalError,
        ExitStatus::ScriptExecutionError,
        ExitStatus::OomError,
    ];

    /// Canonical symbolic name.
    pub fn name(self) -> &'static str {
        match self {
            ExitStatus::Ok => "OK",
            ExitStatus::CompilationError => "COMPILATION_ERROR",
            ExitStatus::InternalError => "INTERNAL_ERROR",
            ExitStatus::ScriptExecutionError => "SCRIPT_EXECUTION_ERROR",
            ExitStatus::OomError => "OOM_ERROR",
        }
    }

    /// Resolves a canonical name by exact, case-sensitive match.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Process exit code for this status.
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Ok => 0,
            ExitStatus::CompilationError => 1,
            ExitStatus::InternalError => 2,
            ExitStatus::ScriptExecutionError => 3,
            ExitStatus::OomError => 137,
        }
    }

    /// Resolves a process exit code, if it belongs to the vocabulary.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Maps a process exit code, treating unknown codes as [`ExitStatus::InternalError`].
    pub fn from_process_code(code: i32) -> Self {
        Self::from_code(code).unwrap_or(ExitStatus::InternalError)
    }

    /// Returns `true` for [`ExitStatus::Ok`].
    pub fn is_ok(self) -> bool {
        self == ExitStatus::Ok
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<ExitStatus> for String {
    fn from(status: ExitStatus) -> Self {
        status.name().to_string()
    }
}

impl TryFrom<String> for ExitStatus {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        ExitStatus::from_name(&name).ok_or_else(|| format!("unknown exit status '{name}'"))
    }
}

/// A result value produced outside this crate's type identity.
///
/// Compiler entry points hand back values whose concrete type the caller cannot
/// name or trust. The only thing a caller may rely on is the symbolic name,
/// which is then re-resolved locally with [`ExitStatus::from_name`].
pub trait ForeignResult {
    /// The symbolic name of the result (e.g. `"COMPILATION_ERROR"`).
    fn symbolic_name(&self) -> String;
}

impl ForeignResult for ExitStatus {
    fn symbolic_name(&self) -> String {
        self.name().to_string()
    }
}

impl ForeignResult for String {
    fn symbolic_name(&self) -> String {
        self.clone()
    }
}

impl ForeignResult for &'static str {
    fn symbolic_name(&self) -> String {
        (*self).to_string()
    }
}
