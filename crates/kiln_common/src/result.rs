//! Common result and error types for the Kiln compiler.

/// The standard result type for fallible internal operations.
///
/// `Err` indicates an unrecoverable internal error (a bug in Kiln or an
/// inconsistent transform output), not a user-facing problem. User errors are
/// reported as [`Diagnostic`](kiln_diagnostics)s carried by the compile error.
pub type KilnResult<T> = Result<T, InternalError>;

/// An internal compiler error indicating a bug in Kiln, not a user input problem.
///
/// These errors should never occur during normal operation. If one does occur,
/// a transform or generator produced output that a later stage cannot consume.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("internal compiler error: {message}")]
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
