//! Connection-level errors.

use anvil_protocol::ProtocolError;

/// Why a daemon connection or one of its requests failed.
///
/// Failures are shared between callers waiting on the same connection attempt,
/// so the type is `Clone` and carries its causes as text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// No daemon could be reached or started.
    #[error("compile daemon unavailable: {reason}")]
    Unavailable {
        /// What went wrong.
        reason: String,
    },

    /// The daemon refused the handshake.
    #[error("compile daemon rejected the connection: {reason}")]
    HandshakeRejected {
        /// The daemon's stated reason.
        reason: String,
    },

    /// A session could not be opened.
    #[error("failed to open a compile session: {reason}")]
    Session {
        /// What went wrong.
        reason: String,
    },

    /// The connection broke or the daemon sent something unexpected.
    #[error("compile daemon connection failed: {reason}")]
    Transport {
        /// What went wrong.
        reason: String,
    },

    /// The liveness marker could not be created.
    #[error("failed to create liveness marker: {reason}")]
    Marker {
        /// What went wrong.
        reason: String,
    },
}

impl From<ProtocolError> for ConnectionError {
    fn from(err: ProtocolError) -> Self {
        ConnectionError::Transport {
            reason: err.to_string(),
        }
    }
}
