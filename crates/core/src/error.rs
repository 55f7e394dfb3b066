//! Error taxonomy surfaced to callers of the engine.

/// Error type for registry and service operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned to the caller of a job or execution operation.
///
/// Failures inside a running execution (spawn errors, non-zero exits,
/// container errors) are never returned through this type; they are recorded
/// on the execution itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Job or execution does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Job name already registered
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Operation not valid in the current state
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Backend does not support the operation
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Malformed resource name or argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Anything not classified above
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
