//! Cache manifest tracking per-source cache state.
//!
//! The manifest is stored as `manifest.json` in the cache directory. It records
//! the content hash of every source seen by the last successful build and the
//! outputs produced from it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anvil_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Name of the manifest file within the cache directory.
const MANIFEST_FILE: &str = "manifest.json";

/// Top-level cache manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheManifest {
    /// Key of the compiler identity that produced this cache. A different
    /// compiler invalidates everything.
    pub compiler_key: String,

    /// Per-source cache state, keyed by source path.
    pub files: BTreeMap<PathBuf, FileCache>,
}

/// Cached state for a single source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCache {
    /// Content hash of the source when it was last compiled.
    pub content_hash: ContentHash,

    /// Outputs produced from this source.
    #[serde(default)]
    pub outputs: Vec<PathBuf>,

    /// Set when the entry was invalidated and awaits recompilation.
    #[serde(default)]
    pub dirty: bool,
}

impl FileCache {
    /// A clean entry with no recorded outputs.
    pub fn new(content_hash: ContentHash) -> Self {
        Self {
            content_hash,
            outputs: Vec::new(),
            dirty: false,
        }
    }
}

impl CacheManifest {
    /// Creates a new, empty manifest for the given compiler key.
    pub fn new(compiler_key: &str) -> Self {
        Self {
            compiler_key: compiler_key.to_string(),
            files: BTreeMap::new(),
        }
    }

    /// Loads the manifest from the cache directory, returning `None` if the
    /// file doesn't exist or can't be parsed.
    pub fn load(cache_dir: &Path) -> Option<Self> {
        let path = cache_dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Saves the manifest to the cache directory, creating it if needed.
    pub fn save(&self, cache_dir: &Path) -> Result<(), CacheError> {
        std::fs::create_dir_all(cache_dir).map_err(|e| CacheError::Io {
            path: cache_dir.to_path_buf(),
            source: e,
        })?;
        let path = cache_dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        std::fs::write(&path, json).map_err(|e| CacheError::Io { path, source: e })
    }

    /// Returns `true` if this manifest was produced by the given compiler.
    pub fn is_compatible(&self, compiler_key: &str) -> bool {
        self.compiler_key == compiler_key
    }
}
