//! Error types for the security admin collaborators.

use thiserror::Error;

/// Errors that a metadata source or mutation backend can return.
#[derive(Debug, Error)]
pub enum SecurityAdminError {
    /// The requested object does not exist in the backend.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Kind of object that was looked up (e.g. "securable", "database role").
        kind: &'static str,
        /// Name or URN that was looked up.
        name: String,
    },

    /// The backend rejected the request arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend cannot be reached or is not ready.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SecurityAdminError {
    /// Creates a `NotFound` error.
    #[must_use]
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Creates an `InvalidArgument` error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
