//! Content hashing for compiler fingerprints and incremental cache validity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A 128-bit XXH3 content hash.
///
/// Used to fingerprint compiler artifacts (so a client only talks to a daemon
/// running the exact same compiler) and to detect changed source files between
/// incremental builds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Computes a content hash from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }

    /// Reads a file fully and hashes its contents.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read(path)?;
        Ok(Self::from_bytes(&data))
    }

    /// Returns the raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Returns the first `n` hex characters of the hash (at most 32).
    pub fn short_hex(&self, n: usize) -> String {
        let mut s = self.to_string();
        s.truncate(n.min(32));
        s
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short_hex(8))
    }
}
