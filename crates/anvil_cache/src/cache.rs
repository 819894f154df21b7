//! High-level cache handle used by the daemon.
//!
//! [`Cache`] ties the manifest and the source hasher together: it loads or
//! creates the manifest for a working directory, applies invalidations from the
//! planner, records freshly compiled sources, and persists the result.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::CacheError;
use crate::hasher::{ChangeSet, SourceHasher};
use crate::incremental::{ChangeDetector, IncrementalCache};
use crate::manifest::{CacheManifest, FileCache};

/// Subdirectory of the working directory holding the manifest.
pub const CACHE_SUBDIR: &str = ".anvil-cache";

/// Incremental cache for one working directory.
///
/// All reads are fail-safe: a missing, corrupt, or foreign-compiler manifest
/// results in an empty cache rather than an error.
pub struct Cache {
    /// Directory holding `manifest.json`.
    cache_dir: PathBuf,

    /// The manifest tracking per-source state.
    manifest: CacheManifest,
}

impl Cache {
    /// Loads the cache under `working_dir`, or creates a fresh one.
    pub fn load_or_create(working_dir: &Path, compiler_key: &str) -> Self {
        let cache_dir = working_dir.join(CACHE_SUBDIR);
        let manifest = CacheManifest::load(&cache_dir)
            .filter(|m| m.is_compatible(compiler_key))
            .unwrap_or_else(|| CacheManifest::new(compiler_key));
        debug!(cache_dir = %cache_dir.display(), files = manifest.files.len(), "loaded cache");
        Self { cache_dir, manifest }
    }

    /// Detects which of `file_paths` (plus every tracked source) changed.
    pub fn detect_changes(&self, file_paths: &[PathBuf]) -> ChangeSet {
        self.scanner(file_paths.to_vec()).scan()
    }

    /// A detector over a snapshot of the current manifest.
    ///
    /// The snapshot lets the planner mutate the cache while the detector is
    /// alive.
    pub fn scanner(&self, candidates: Vec<PathBuf>) -> SourceScan {
        SourceScan {
            manifest: self.manifest.clone(),
            candidates,
        }
    }

    /// Records the current content of freshly compiled sources as clean.
    ///
    /// Sources that can no longer be read are dropped from the manifest.
    pub fn record_compiled(&mut self, sources: &[PathBuf]) {
        for source in sources {
            match SourceHasher::hash_file(source) {
                Ok(hash) => {
                    let outputs = self
                        .manifest
                        .files
                        .remove(source)
                        .map(|fc| fc.outputs)
                        .unwrap_or_default();
                    let mut entry = FileCache::new(hash);
                    entry.outputs = outputs;
                    self.manifest.files.insert(source.clone(), entry);
                }
                Err(_) => {
                    self.manifest.files.remove(source);
                }
            }
        }
    }

    /// Persists the manifest.
    pub fn save(&self) -> Result<(), CacheError> {
        self.manifest.save(&self.cache_dir)
    }

    /// Returns the current manifest.
    pub fn manifest(&self) -> &CacheManifest {
        &self.manifest
    }
}

impl IncrementalCache for Cache {
    fn invalidate(&mut self, source: &Path) {
        if let Some(entry) = self.manifest.files.get_mut(source) {
            entry.dirty = true;
        }
    }

    fn remove(&mut self, source: &Path) {
        self.manifest.files.remove(source);
    }

    fn clear(&mut self) {
        self.manifest.files.clear();
    }
}

/// Content-hash change detection over a manifest snapshot.
pub struct SourceScan {
    manifest: CacheManifest,
    candidates: Vec<PathBuf>,
}

impl SourceScan {
    fn scan(&self) -> ChangeSet {
        let paths: BTreeSet<PathBuf> = self
            .candidates
            .iter()
            .chain(self.manifest.files.keys())
            .cloned()
            .collect();
        let paths: Vec<PathBuf> = paths.into_iter().collect();
        let hashes = SourceHasher::hash_files(&paths);
        SourceHasher::detect_changes(&hashes, &self.manifest)
    }
}

impl ChangeDetector for SourceScan {
    fn detect_changes(&self) -> Result<ChangeSet, CacheError> {
        Ok(self.scan())
    }
}
