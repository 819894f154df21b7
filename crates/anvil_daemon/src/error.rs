//! Daemon error types.

use anvil_protocol::ProtocolError;

/// Errors that stop the daemon or one of its connections.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// A filesystem or socket operation failed.
    #[error("{context}: {source}")]
    Io {
        /// What the daemon was doing.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A client connection failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The daemon thread panicked.
    #[error("daemon thread panicked")]
    Panicked,
}

impl DaemonError {
    pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| DaemonError::Io { context, source }
    }
}
