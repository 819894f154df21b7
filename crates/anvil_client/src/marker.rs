//! The client liveness marker.

use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::ConnectionError;

const MARKER_PREFIX: &str = "anvil-client-session-";
const MARKER_SUFFIX: &str = "-is-running";

/// A file whose existence tells the daemon this client is still alive.
///
/// The file is deleted when the marker is dropped; the daemon reclaims the
/// client's sessions once it has been gone for the reclaim timeout. One marker
/// is shared by every connection the client makes for the same compiler.
#[derive(Debug)]
pub struct LivenessMarker {
    file: NamedTempFile,
}

impl LivenessMarker {
    /// Creates a fresh marker in `dir`, creating the directory if needed.
    pub fn create_in(dir: &Path) -> Result<Self, ConnectionError> {
        let to_err = |e: std::io::Error| ConnectionError::Marker {
            reason: format!("{}: {e}", dir.display()),
        };
        std::fs::create_dir_all(dir).map_err(to_err)?;
        let file = tempfile::Builder::new()
            .prefix(MARKER_PREFIX)
            .suffix(MARKER_SUFFIX)
            .tempfile_in(dir)
            .map_err(to_err)?;
        debug!(path = %file.path().display(), "created liveness marker");
        Ok(Self { file })
    }

    /// Location of the marker file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl Drop for LivenessMarker {
    fn drop(&mut self) {
        debug!(path = %self.file.path().display(), "removing liveness marker");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_lives_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let marker = LivenessMarker::create_in(&dir.path().join("markers")).unwrap();
        let path = marker.path().to_path_buf();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(MARKER_PREFIX));
        assert!(name.ends_with(MARKER_SUFFIX));
        assert!(path.exists());

        drop(marker);
        assert!(!path.exists());
    }

    #[test]
    fn markers_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let a = LivenessMarker::create_in(dir.path()).unwrap();
        let b = LivenessMarker::create_in(dir.path()).unwrap();
        assert_ne!(a.path(), b.path());
    }
}
