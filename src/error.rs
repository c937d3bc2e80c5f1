//! Error types for doclock.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.
//! Every lock protocol failure has its own variant so callers can match on the
//! condition instead of parsing messages.

use crate::exit_codes;
use crate::lock::format_duration;
use chrono::Duration;
use thiserror::Error;

/// Main error type for doclock operations.
#[derive(Error, Debug)]
pub enum DocLockError {
    /// Acquire attempted against an active lease held by someone else.
    #[error("entity with id '{id}' is locked by '{actor}' for {}.", format_duration(.lease))]
    Locked {
        id: String,
        actor: String,
        lease: Duration,
    },

    /// Acquire attempted against a document carrying exception info.
    #[error("entity with id '{id}' has an exception attached.")]
    LockErrorState { id: String },

    /// Commit or error-state attempted after the lease window elapsed or was superseded.
    #[error(
        "entity of type {entity_type} was locked for {} instead of {}.",
        format_duration(.elapsed),
        format_duration(.lease)
    )]
    LockExpired {
        entity_type: &'static str,
        elapsed: Duration,
        lease: Duration,
    },

    /// A release operation was called on a scope that was already released.
    #[error("lock on entity with id '{id}' has already been released.")]
    LockAlreadyReleased { id: String },

    /// Commit supplied an entity whose id differs from the locked one.
    #[error("cannot unlock entity '{actual}' with the lock taken on entity '{expected}'.")]
    UnlockDifferentEntity { expected: String, actual: String },

    /// `wait` exhausted its deadline without acquiring.
    #[error("No valid entity has been released for update. (id '{id}', waited {})", format_duration(.waited))]
    Timeout { id: String, waited: Duration },

    /// The document store failed to read or write.
    #[error("Store operation failed: {0}")]
    StoreError(String),

    /// A stored document does not decode as the repository's entity type.
    #[error("failed to decode entity '{id}' of type {entity_type}: {reason}")]
    Undecodable {
        id: String,
        entity_type: &'static str,
        reason: String,
    },

    /// User provided invalid arguments, config, or data.
    #[error("{0}")]
    UserError(String),
}

impl DocLockError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            DocLockError::Locked { .. } | DocLockError::LockErrorState { .. } => {
                exit_codes::LOCK_FAILURE
            }
            DocLockError::LockExpired { .. } => exit_codes::LEASE_EXPIRED,
            DocLockError::Timeout { .. } => exit_codes::TIMEOUT,
            DocLockError::StoreError(_) | DocLockError::Undecodable { .. } => {
                exit_codes::STORE_FAILURE
            }
            DocLockError::LockAlreadyReleased { .. }
            | DocLockError::UnlockDifferentEntity { .. }
            | DocLockError::UserError(_) => exit_codes::USER_ERROR,
        }
    }

    /// Whether retrying the same acquire later can succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DocLockError::Locked { .. } | DocLockError::Timeout { .. }
        )
    }
}

impl From<serde_json::Error> for DocLockError {
    fn from(e: serde_json::Error) -> Self {
        DocLockError::StoreError(format!("document encoding failed: {}", e))
    }
}

/// Result type alias for doclock operations.
pub type Result<T> = std::result::Result<T, DocLockError>;
