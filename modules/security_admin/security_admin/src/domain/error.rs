//! Domain error types for the security admin module.

use security_admin_sdk::{SecurableType, SecurityAdminError};
use thiserror::Error;

use super::commit::CommitLog;

/// Domain-level errors for the security admin module.
#[derive(Error, Debug)]
pub enum DomainError {
    /// An expected role or object is missing.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// An object of the wrong securable kind was supplied.
    #[error("type mismatch for {name}: expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: SecurableType,
        actual: SecurableType,
    },

    /// The request is inconsistent with the current model.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A cursor was advanced after its collection changed.
    #[error("collection was modified during iteration")]
    CollectionModified,

    /// A collaborator call did not finish within the configured bound.
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    /// A collaborator call failed.
    #[error(transparent)]
    Source(#[from] SecurityAdminError),

    /// A commit stopped partway; the log lists what was and was not applied.
    #[error(
        "commit failed after {} of {} operations",
        .log.applied().len(),
        .log.total()
    )]
    PartialCommit {
        log: Box<CommitLog>,
        #[source]
        source: Box<DomainError>,
    },
}

impl DomainError {
    #[must_use]
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Returns the operation log if this is a `PartialCommit` error.
    #[must_use]
    pub fn commit_log(&self) -> Option<&CommitLog> {
        match self {
            Self::PartialCommit { log, .. } => Some(log),
            _ => None,
        }
    }
}
