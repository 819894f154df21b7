//! Incremental rebuild planning.
//!
//! The planner turns [`IncrementalCompilationOptions`] into a
//! [`RebuildDirective`]. Order of checks:
//!
//! 1. The cache version gate: if the stored version differs from the requested
//!    one (or none is stored), every cache is cleared and a full rebuild is
//!    forced, whatever the caller says about changed files.
//! 2. Caller-known changes: modified sources are invalidated, deleted sources
//!    are removed, and no change detection runs.
//! 3. Otherwise the [`ChangeDetector`] scans for changes and the same
//!    invalidation/removal is applied to what it finds.

use std::path::{Path, PathBuf};

use anvil_protocol::IncrementalCompilationOptions;
use tracing::{debug, info};

use crate::error::CacheError;
use crate::hasher::ChangeSet;
use crate::version::CacheVersionFile;

/// Mutations the planner applies to incremental caches.
pub trait IncrementalCache {
    /// Marks every entry derived from `source` as stale.
    fn invalidate(&mut self, source: &Path);

    /// Forgets every entry derived from `source`.
    fn remove(&mut self, source: &Path);

    /// Drops all entries.
    fn clear(&mut self);
}

/// Finds changed sources when the caller does not know them.
pub trait ChangeDetector {
    /// Scans for changes since the last recorded build.
    fn detect_changes(&self) -> Result<ChangeSet, CacheError>;
}

/// Why a full rebuild was forced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FullRebuildReason {
    /// No readable cache version was recorded.
    NoCacheVersion,
    /// The recorded cache version differs from the requested one.
    CacheVersionChanged {
        /// The version found on disk.
        stored: i32,
        /// The version the caller requested.
        requested: i32,
    },
}

impl std::fmt::Display for FullRebuildReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FullRebuildReason::NoCacheVersion => write!(f, "no cache version recorded"),
            FullRebuildReason::CacheVersionChanged { stored, requested } => {
                write!(f, "cache version changed from {stored} to {requested}")
            }
        }
    }
}

/// What the compiler should rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildDirective {
    /// All caches were dropped; rebuild everything.
    Full {
        /// Why the rebuild was forced.
        reason: FullRebuildReason,
    },
    /// Rebuild only the listed sources.
    Incremental {
        /// Sources whose entries were invalidated.
        dirty: Vec<PathBuf>,
        /// Sources whose entries were removed.
        removed: Vec<PathBuf>,
    },
}

impl RebuildDirective {
    /// Returns `true` if a full rebuild was forced.
    pub fn is_full(&self) -> bool {
        matches!(self, RebuildDirective::Full { .. })
    }
}

/// Plans incremental rebuilds.
pub struct IncrementalPlanner;

impl IncrementalPlanner {
    /// Checks the cache version and applies invalidations to `cache`.
    pub fn plan(
        options: &IncrementalCompilationOptions,
        cache: &mut dyn IncrementalCache,
        detector: &dyn ChangeDetector,
    ) -> Result<RebuildDirective, CacheError> {
        let version_file = CacheVersionFile::new(options.cache_version_path());
        let requested = options.custom_cache_version;
        let reason = match version_file.read() {
            Some(stored) if stored == requested => None,
            Some(stored) => Some(FullRebuildReason::CacheVersionChanged { stored, requested }),
            None => Some(FullRebuildReason::NoCacheVersion),
        };
        if let Some(reason) = reason {
            info!(working_dir = %options.working_dir.display(), %reason, "forcing full rebuild");
            cache.clear();
            return Ok(RebuildDirective::Full { reason });
        }

        let (dirty, removed) = match options.known_changes() {
            Some((modified, deleted)) => {
                debug!(modified = modified.len(), deleted = deleted.len(), "using caller-provided changes");
                (
                    modified.iter().cloned().collect::<Vec<_>>(),
                    deleted.iter().cloned().collect::<Vec<_>>(),
                )
            }
            None => {
                let changes = detector.detect_changes()?;
                debug!(
                    new = changes.new_files.len(),
                    modified = changes.modified_files.len(),
                    deleted = changes.deleted_files.len(),
                    "detected changes"
                );
                (changes.dirty_files(), changes.deleted_files)
            }
        };

        for source in &dirty {
            cache.invalidate(source);
        }
        for source in &removed {
            cache.remove(source);
        }
        Ok(RebuildDirective::Incremental { dirty, removed })
    }

    /// Records the requested cache version after a successful build.
    pub fn commit(options: &IncrementalCompilationOptions) -> Result<(), CacheError> {
        CacheVersionFile::new(options.cache_version_path()).write(options.custom_cache_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct RecordingCache {
        invalidated: Vec<PathBuf>,
        removed: Vec<PathBuf>,
        cleared: usize,
    }

    impl IncrementalCache for RecordingCache {
        fn invalidate(&mut self, source: &Path) {
            self.invalidated.push(source.to_path_buf());
        }
        fn remove(&mut self, source: &Path) {
            self.removed.push(source.to_path_buf());
        }
        fn clear(&mut self) {
            self.cleared += 1;
        }
    }

    struct CountingDetector {
        calls: Cell<usize>,
        changes: ChangeSet,
    }

    impl CountingDetector {
        fn new(changes: ChangeSet) -> Self {
            Self {
                calls: Cell::new(0),
                changes,
            }
        }
    }

    impl ChangeDetector for CountingDetector {
        fn detect_changes(&self) -> Result<ChangeSet, CacheError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.changes.clone())
        }
    }

    fn known(dir: &Path, version: i32) -> IncrementalCompilationOptions {
        IncrementalCompilationOptions::with_known_changes(
            [PathBuf::from("a.src")],
            [PathBuf::from("b.src")],
            dir,
            "cache-version.txt",
            version,
        )
    }

    #[test]
    fn known_changes_are_authoritative() {
        let dir = tempfile::tempdir().unwrap();
        let options = known(dir.path(), 1);
        IncrementalPlanner::commit(&options).unwrap();

        let mut cache = RecordingCache::default();
        let detector = CountingDetector::new(ChangeSet::default());
        let directive = IncrementalPlanner::plan(&options, &mut cache, &detector).unwrap();

        assert_eq!(cache.invalidated, vec![PathBuf::from("a.src")]);
        assert_eq!(cache.removed, vec![PathBuf::from("b.src")]);
        assert_eq!(cache.cleared, 0);
        assert_eq!(detector.calls.get(), 0);
        assert_eq!(
            directive,
            RebuildDirective::Incremental {
                dirty: vec![PathBuf::from("a.src")],
                removed: vec![PathBuf::from("b.src")],
            }
        );
    }

    #[test]
    fn cache_version_change_forces_full_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        CacheVersionFile::new(dir.path().join("cache-version.txt")).write(1).unwrap();

        let mut cache = RecordingCache::default();
        let detector = CountingDetector::new(ChangeSet::default());
        let directive = IncrementalPlanner::plan(&known(dir.path(), 2), &mut cache, &detector).unwrap();

        assert_eq!(
            directive,
            RebuildDirective::Full {
                reason: FullRebuildReason::CacheVersionChanged { stored: 1, requested: 2 },
            }
        );
        assert!(directive.is_full());
        assert_eq!(cache.cleared, 1);
        assert!(cache.invalidated.is_empty());
        assert_eq!(detector.calls.get(), 0);
    }

    #[test]
    fn missing_version_forces_full_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = RecordingCache::default();
        let detector = CountingDetector::new(ChangeSet::default());
        let directive = IncrementalPlanner::plan(&known(dir.path(), 1), &mut cache, &detector).unwrap();
        assert_eq!(directive, RebuildDirective::Full { reason: FullRebuildReason::NoCacheVersion });
    }

    #[test]
    fn unknown_changes_use_detector_and_ignore_file_sets() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = IncrementalCompilationOptions::with_unknown_changes(dir.path(), "v", 4);
        options.modified_files.insert(PathBuf::from("ignored.src"));
        IncrementalPlanner::commit(&options).unwrap();

        let detector = CountingDetector::new(ChangeSet {
            new_files: vec![PathBuf::from("n.src")],
            modified_files: vec![PathBuf::from("m.src")],
            deleted_files: vec![PathBuf::from("d.src")],
            unchanged_files: vec![PathBuf::from("u.src")],
        });
        let mut cache = RecordingCache::default();
        IncrementalPlanner::plan(&options, &mut cache, &detector).unwrap();

        assert_eq!(detector.calls.get(), 1);
        assert_eq!(cache.invalidated, vec![PathBuf::from("m.src"), PathBuf::from("n.src")]);
        assert_eq!(cache.removed, vec![PathBuf::from("d.src")]);
    }

    #[test]
    fn commit_records_version() {
        let dir = tempfile::tempdir().unwrap();
        let options = known(dir.path(), 9);
        IncrementalPlanner::commit(&options).unwrap();
        assert_eq!(CacheVersionFile::new(options.cache_version_path()).read(), Some(9));
    }

    #[test]
    fn reason_display() {
        let r = FullRebuildReason::CacheVersionChanged { stored: 1, requested: 2 };
        assert_eq!(r.to_string(), "cache version changed from 1 to 2");
    }
}
