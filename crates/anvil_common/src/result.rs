//! Common result and error types.

/// The standard result type for operations that can only fail because of a bug
/// or an unusable environment.
///
/// Compiler diagnostics are never reported through `Err`: they flow through a
/// message sink and an [`ExitStatus`](crate::ExitStatus).
pub type AnvilResult<T> = Result<T, InternalError>;

/// An internal error in the orchestration layer or an entry point it drives.
///
/// When one reaches the orchestrator it is reported to the user as an exception
/// message and mapped to [`ExitStatus::InternalError`](crate::ExitStatus::InternalError).
#[derive(Debug, Clone, thiserror::Error)]
#[error("internal error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<std::io::Error> for InternalError {
    fn from(err: std::io::Error) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}
