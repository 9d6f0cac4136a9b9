//! Error types for guest operations.
//!
//! Three layers of failure exist: the remote backend ([`BackendError`]), the
//! local snapshot file ([`CacheError`]) and the outcome reported to callers
//! ([`GuestError`]). Backend and cache failures never escape an action
//! boundary unconverted.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failures reported by a [`GuestBackend`](crate::ports::GuestBackend).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Network, authentication or connection failure.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected the input (duplicate email, constraint violation).
    #[error("backend rejected input: {0}")]
    Validation(String),

    /// The targeted guest does not exist remotely.
    #[error("guest not found")]
    NotFound,

    /// The conditional check-in write lost to another station.
    #[error("guest was already checked in at {scanned_at}")]
    ConflictLost {
        /// When the winning station checked the guest in
        scanned_at: DateTime<Utc>,
    },
}

/// Failures of the durable snapshot.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the snapshot failed.
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The stored snapshot could not be parsed.
    #[error("snapshot is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Outcome taxonomy surfaced to the caller of a guest operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuestError {
    /// The code does not resolve to any guest.
    #[error("invalid code or guest not found")]
    NotFound,

    /// The guest was checked in before.
    #[error("guest already scanned")]
    AlreadyCheckedIn,

    /// Malformed input or a backend constraint violation.
    #[error("validation error: {0}")]
    Validation(String),

    /// The remote backend could not be reached.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Another station won the check-in race.
    #[error("another station checked this guest in first")]
    ConflictLost,
}

impl From<BackendError> for GuestError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::Unavailable(reason) => Self::BackendUnavailable(reason),
            BackendError::Validation(reason) => Self::Validation(reason),
            BackendError::NotFound => Self::NotFound,
            BackendError::ConflictLost { .. } => Self::ConflictLost,
        }
    }
}
