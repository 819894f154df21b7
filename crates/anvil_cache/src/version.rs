//! The caller-owned cache version file.

use std::path::{Path, PathBuf};

use crate::error::CacheError;

/// A file holding a single integer: the cache version the last build used.
///
/// The caller picks the file name and the version; when the stored version
/// differs from the requested one, every cache under the working directory is
/// considered unusable.
#[derive(Debug, Clone)]
pub struct CacheVersionFile {
    path: PathBuf,
}

impl CacheVersionFile {
    /// Refers to the version file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored version. Missing or malformed content is `None`.
    pub fn read(&self) -> Option<i32> {
        std::fs::read_to_string(&self.path)
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    /// Records `version`, creating parent directories as needed.
    pub fn write(&self, version: i32) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(&self.path, version.to_string()).map_err(|e| CacheError::Io {
            path: self.path.clone(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(CacheVersionFile::new(dir.path().join("v.txt")).read(), None);
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let file = CacheVersionFile::new(dir.path().join("caches").join("v.txt"));
        file.write(7).unwrap();
        assert_eq!(file.read(), Some(7));
    }

    #[test]
    fn garbage_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.txt");
        std::fs::write(&path, "seven").unwrap();
        assert_eq!(CacheVersionFile::new(path).read(), None);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.txt");
        std::fs::write(&path, " 12\n").unwrap();
        assert_eq!(CacheVersionFile::new(path).read(), Some(12));
    }
}
