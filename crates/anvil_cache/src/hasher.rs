//! Source file hashing and change detection.
//!
//! Computes content hashes for source files and compares them against the
//! manifest to classify each file as new, modified, deleted, or unchanged.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anvil_common::ContentHash;

use crate::error::CacheError;
use crate::manifest::CacheManifest;

/// Result of comparing current source hashes against the manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Files that are not present in the manifest.
    pub new_files: Vec<PathBuf>,

    /// Files whose content hash differs from the manifest, or whose entry was
    /// invalidated.
    pub modified_files: Vec<PathBuf>,

    /// Files present in the manifest but not in the current file set.
    pub deleted_files: Vec<PathBuf>,

    /// Files whose content hash matches the manifest.
    pub unchanged_files: Vec<PathBuf>,
}

impl ChangeSet {
    /// Returns `true` if there are no new, modified, or deleted files.
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.modified_files.is_empty() && self.deleted_files.is_empty()
    }

    /// Files that need recompilation (new + modified), sorted.
    pub fn dirty_files(&self) -> Vec<PathBuf> {
        let mut dirty: Vec<PathBuf> = self
            .new_files
            .iter()
            .chain(&self.modified_files)
            .cloned()
            .collect();
        dirty.sort();
        dirty
    }
}

/// Utility for computing content hashes of source files and detecting changes.
pub struct SourceHasher;

impl SourceHasher {
    /// Computes the XXH3-128 content hash of a single file.
    pub fn hash_file(path: &Path) -> Result<ContentHash, CacheError> {
        ContentHash::from_file(path).map_err(|e| CacheError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Computes content hashes for multiple files.
    ///
    /// Files that cannot be read are skipped, so they show up as deleted.
    pub fn hash_files(paths: &[PathBuf]) -> BTreeMap<PathBuf, ContentHash> {
        paths
            .iter()
            .filter_map(|path| Self::hash_file(path).ok().map(|h| (path.clone(), h)))
            .collect()
    }

    /// Compares current file hashes against the manifest.
    pub fn detect_changes(
        current_hashes: &BTreeMap<PathBuf, ContentHash>,
        manifest: &CacheManifest,
    ) -> ChangeSet {
        let mut changes = ChangeSet::default();

        for (path, hash) in current_hashes {
            match manifest.files.get(path) {
                Some(fc) if fc.content_hash == *hash && !fc.dirty => {
                    changes.unchanged_files.push(path.clone());
                }
                Some(_) => changes.modified_files.push(path.clone()),
                None => changes.new_files.push(path.clone()),
            }
        }

        changes.deleted_files = manifest
            .files
            .keys()
            .filter(|p| !current_hashes.contains_key(*p))
            .cloned()
            .collect();

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FileCache;

    fn manifest_with(path: &str, hash: ContentHash) -> CacheManifest {
        let mut manifest = CacheManifest::new("k");
        manifest.files.insert(PathBuf::from(path), FileCache::new(hash));
        manifest
    }

    #[test]
    fn hash_file_nonexistent_errors() {
        assert!(SourceHasher::hash_file(Path::new("/nonexistent/file.src")).is_err());
    }

    #[test]
    fn hash_files_skips_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.src");
        std::fs::write(&a, "fun a() {}").unwrap();
        let hashes = SourceHasher::hash_files(&[a.clone(), dir.path().join("missing.src")]);
        assert_eq!(hashes.len(), 1);
        assert!(hashes.contains_key(&a));
    }

    #[test]
    fn detect_all_new() {
        let manifest = CacheManifest::new("k");
        let hashes = BTreeMap::from([
            (PathBuf::from("b.src"), ContentHash::from_bytes(b"b")),
            (PathBuf::from("a.src"), ContentHash::from_bytes(b"a")),
        ]);
        let cs = SourceHasher::detect_changes(&hashes, &manifest);
        assert_eq!(cs.new_files, vec![PathBuf::from("a.src"), PathBuf::from("b.src")]);
        assert_eq!(cs.dirty_files().len(), 2);
    }

    #[test]
    fn detect_unchanged_and_modified() {
        let old = ContentHash::from_bytes(b"old");
        let manifest = manifest_with("a.src", old);

        let same = BTreeMap::from([(PathBuf::from("a.src"), old)]);
        assert!(SourceHasher::detect_changes(&same, &manifest).is_empty());

        let changed = BTreeMap::from([(PathBuf::from("a.src"), ContentHash::from_bytes(b"new"))]);
        let cs = SourceHasher::detect_changes(&changed, &manifest);
        assert_eq!(cs.modified_files, vec![PathBuf::from("a.src")]);
    }

    #[test]
    fn dirty_entry_counts_as_modified() {
        let hash = ContentHash::from_bytes(b"same");
        let mut manifest = manifest_with("a.src", hash);
        manifest.files.get_mut(Path::new("a.src")).unwrap().dirty = true;
        let hashes = BTreeMap::from([(PathBuf::from("a.src"), hash)]);
        let cs = SourceHasher::detect_changes(&hashes, &manifest);
        assert_eq!(cs.modified_files.len(), 1);
    }

    #[test]
    fn detect_deleted() {
        let manifest = manifest_with("gone.src", ContentHash::from_bytes(b"x"));
        let cs = SourceHasher::detect_changes(&BTreeMap::new(), &manifest);
        assert_eq!(cs.deleted_files, vec![PathBuf::from("gone.src")]);
        assert!(cs.dirty_files().is_empty());
    }
}
