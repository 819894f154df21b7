//! Compiler identity fingerprints.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

/// A stable fingerprint of the compiler artifact a connection must match.
///
/// Two identities are equal when both the artifact digest and the version string
/// match. The artifact path is carried for diagnostics and for starting a daemon,
/// but never participates in equality: the same compiler installed in two
/// locations is the same compiler.
#[derive(Clone, Serialize, Deserialize)]
pub struct CompilerIdentity {
    artifact: PathBuf,
    digest: ContentHash,
    version: String,
}

impl CompilerIdentity {
    /// Builds an identity from already-known parts.
    pub fn new(artifact: impl Into<PathBuf>, digest: ContentHash, version: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            digest,
            version: version.into(),
        }
    }

    /// Fingerprints a compiler artifact on disk.
    pub fn from_artifact(artifact: &Path, version: &str) -> std::io::Result<Self> {
        let digest = ContentHash::from_file(artifact)?;
        Ok(Self::new(artifact, digest, version))
    }

    /// Path of the compiler artifact this identity was computed from.
    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// Content digest of the compiler artifact.
    pub fn digest(&self) -> ContentHash {
        self.digest
    }

    /// Compiler version string.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// A filesystem-safe key, stable across processes, naming this identity.
    ///
    /// The version is folded into a hash so arbitrary version strings never
    /// leak path separators into file names.
    pub fn key(&self) -> String {
        let mut material = Vec::with_capacity(16 + self.version.len());
        material.extend_from_slice(self.digest.as_bytes());
        material.extend_from_slice(self.version.as_bytes());
        format!("anvil-{}", ContentHash::from_bytes(&material).short_hex(20))
    }
}

impl PartialEq for CompilerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest && self.version == other.version
    }
}

impl Eq for CompilerIdentity {}

impl Hash for CompilerIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for CompilerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.version, self.digest.short_hex(12), self.artifact.display())
    }
}

impl fmt::Debug for CompilerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerIdentity")
            .field("version", &self.version)
            .field("digest", &self.digest)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equality_ignores_artifact_path() {
        let digest = ContentHash::from_bytes(b"compiler");
        let a = CompilerIdentity::new("/opt/a/compiler", digest, "1.2.0");
        let b = CompilerIdentity::new("/usr/lib/compiler", digest, "1.2.0");
        assert_eq!(a, b);
        assert_eq!(a.key(), b.key());

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn version_participates_in_equality() {
        let digest = ContentHash::from_bytes(b"compiler");
        let a = CompilerIdentity::new("c", digest, "1.2.0");
        let b = CompilerIdentity::new("c", digest, "1.3.0");
        assert_ne!(a, b);
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn key_is_filesystem_safe() {
        let id = CompilerIdentity::new("c", ContentHash::from_bytes(b"x"), "../../etc 1/2");
        let key = id.key();
        assert!(key.starts_with("anvil-"));
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn from_artifact_hashes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compiler");
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        let id = CompilerIdentity::from_artifact(&path, "0.1.0").unwrap();
        assert_eq!(id.digest(), ContentHash::from_bytes(b"#!/bin/sh\n"));
        assert_eq!(id.artifact(), path.as_path());
        assert_eq!(id.version(), "0.1.0");
    }

    #[test]
    fn serde_roundtrip_preserves_equality() {
        let id = CompilerIdentity::new("c", ContentHash::from_bytes(b"x"), "2.0");
        let json = serde_json::to_string(&id).unwrap();
        let back: CompilerIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
