//! Frames exchanged between client and daemon.
//!
//! A connection starts with a [`Request::Handshake`]; the daemon accepts it only
//! if the protocol version and the compiler identity both match its own. After
//! that the client opens sessions and issues compiles. A compile is answered by
//! zero or more [`Reply::Message`] frames, in the order the compiler produced
//! them, followed by exactly one [`Reply::Done`].

use std::fmt;
use std::path::{Path, PathBuf};

use anvil_common::CompilerIdentity;
use serde::{Deserialize, Serialize};

use crate::options::CompilationOptions;

/// Bumped whenever a frame shape changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Where the daemon serving `identity` publishes its TCP port.
///
/// The file holds the port number as decimal text.
pub fn port_file(run_dir: &Path, identity: &CompilerIdentity) -> PathBuf {
    run_dir.join(format!("{}.port", identity.key()))
}

/// Opaque token scoping one compile conversation on the daemon.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Client-to-daemon frames.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Request {
    /// First frame on every connection.
    Handshake {
        /// Must equal [`PROTOCOL_VERSION`] on the daemon side.
        protocol_version: u32,
        /// The compiler the client expects the daemon to run.
        identity: CompilerIdentity,
        /// The client's liveness marker; its disappearance lets the daemon
        /// reclaim the client's sessions.
        marker: PathBuf,
    },
    /// Opens a new session.
    OpenSession,
    /// Compiles within a session.
    Compile {
        /// Session opened earlier on this connection.
        session: SessionId,
        /// Compiler arguments.
        arguments: Vec<String>,
        /// How to compile and what to report.
        options: CompilationOptions,
    },
    /// Releases a session once its compile is finished.
    ReleaseSession {
        /// The session to release.
        session: SessionId,
    },
}

/// Daemon-to-client frames.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Reply {
    /// Answer to [`Request::Handshake`].
    Handshake {
        /// Whether the daemon will serve this client.
        accepted: bool,
        /// Why the daemon refused, if it did.
        reason: Option<String>,
    },
    /// Answer to [`Request::OpenSession`].
    Session {
        /// The new session.
        id: SessionId,
    },
    /// A message produced during a compile, as raw stable codes.
    Message {
        /// Report category code.
        category: i32,
        /// Report severity code.
        severity: i32,
        /// Message text.
        text: String,
    },
    /// End of a compile.
    Done {
        /// Process exit code of the compile.
        exit_code: i32,
    },
    /// Answer to [`Request::ReleaseSession`].
    Released,
    /// The request could not be served.
    Error {
        /// Description of the failure.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_display() {
        assert_eq!(SessionId(7).to_string(), "session-7");
    }

    #[test]
    fn port_file_is_keyed_by_identity() {
        let id = CompilerIdentity::new("c", anvil_common::ContentHash::from_bytes(b"c"), "1.0");
        let path = port_file(Path::new("/run/anvil"), &id);
        assert_eq!(path, Path::new("/run/anvil").join(format!("{}.port", id.key())));
    }

    #[test]
    fn session_ids_order() {
        assert!(SessionId(1) < SessionId(2));
    }
}
