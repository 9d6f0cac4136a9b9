//! Collaborator traits injected through the environment.
//!
//! The backend is the only component that talks to the network besides the
//! change feed. All three traits are dyn-compatible so the environment can
//! hold them as `Arc<dyn ...>`.

use crate::error::{BackendError, CacheError};
use crate::types::{GuestChange, GuestId, GuestRecord, NewGuest};
use chrono::{DateTime, Utc};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by backend operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BackendError>> + Send + 'a>>;

/// Boxed future returned by snapshot operations.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Lazy, unbounded sequence of remote changes. Dropping it releases the
/// subscription.
pub type ChangeStream = Pin<Box<dyn Stream<Item = Result<GuestChange, BackendError>> + Send>>;

/// Remote authority over the `guests` collection.
pub trait GuestBackend: Send + Sync {
    /// All guests, most recently registered first.
    ///
    /// # Errors
    ///
    /// [`BackendError::Unavailable`] on network or authentication failure.
    fn fetch_all(&self) -> BackendFuture<'_, Vec<GuestRecord>>;

    /// Store a new guest; the backend assigns `id` and `registered_at`.
    ///
    /// # Errors
    ///
    /// [`BackendError::Validation`] for rejected input (duplicate email),
    /// [`BackendError::Unavailable`] otherwise.
    fn insert(&self, guest: NewGuest) -> BackendFuture<'_, GuestRecord>;

    /// Conditionally check a guest in: only applies while the stored record
    /// is still unscanned.
    ///
    /// # Errors
    ///
    /// - [`BackendError::NotFound`]: no such guest
    /// - [`BackendError::ConflictLost`]: the guest was already checked in
    /// - [`BackendError::Unavailable`]: the write could not be attempted
    fn mark_checked_in(
        &self,
        id: GuestId,
        scanned_at: DateTime<Utc>,
    ) -> BackendFuture<'_, GuestRecord>;

    /// The guest whose id equals `code`, or the single guest whose short code
    /// is `code`.
    ///
    /// Only a full [`SHORT_CODE_LEN`](crate::types::SHORT_CODE_LEN)-character
    /// code is treated as a short code. Returns `None` when nothing matches or
    /// the short code is ambiguous.
    ///
    /// # Errors
    ///
    /// [`BackendError::Unavailable`] on network failure.
    fn find_by_id_or_prefix(&self, code: String) -> BackendFuture<'_, Option<GuestRecord>>;
}

/// Push channel of remote mutations.
pub trait ChangeFeed: Send + Sync {
    /// Open a new subscription.
    ///
    /// # Errors
    ///
    /// [`BackendError::Unavailable`] when the channel cannot be opened.
    fn subscribe(&self) -> BackendFuture<'_, ChangeStream>;
}

/// Best-effort local mirror of the guest collection.
///
/// One fixed slot, overwritten on every save. Never used for coordination.
pub trait SnapshotCache: Send + Sync {
    /// The last saved collection, or empty when nothing was saved yet.
    ///
    /// # Errors
    ///
    /// [`CacheError::Corrupt`] when the stored snapshot cannot be parsed.
    fn load(&self) -> CacheFuture<'_, Vec<GuestRecord>>;

    /// Replace the stored collection.
    ///
    /// # Errors
    ///
    /// [`CacheError::Io`] when the snapshot cannot be written.
    fn save(&self, guests: Vec<GuestRecord>) -> CacheFuture<'_, ()>;
}
