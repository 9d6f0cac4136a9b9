//! Station facade over the guest store.
//!
//! One `CheckInService` per scanner station. It owns the store, turns each
//! call into an action and waits for the matching terminal action, so
//! callers get plain values back and never see a backend error payload.

use crate::actions::GuestAction;
use crate::error::GuestError;
use crate::listener::{ChangeListener, GuestStore, ListenerHandle};
use crate::ports::ChangeFeed;
use crate::reducer::{GuestEnvironment, GuestReducer};
use crate::state::GuestState;
use crate::types::{GuestChange, GuestId, GuestRecord, ScanResult, SnapshotSource};
use checkin_core::environment::IdGenerator;
use checkin_runtime::{Store, StoreError, DEFAULT_BROADCAST_CAPACITY};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Tuning for a [`CheckInService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// How long a call waits for its outcome
    pub request_timeout: Duration,
    /// Buffered effect-produced actions per observer
    pub broadcast_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

/// Outcome of [`CheckInService::fetch_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    /// Where the collection came from
    pub source: SnapshotSource,
    /// The collection after the fetch
    pub guests: Vec<GuestRecord>,
    /// Why the backend was not used, when the station is degraded
    pub degraded_reason: Option<String>,
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Check-in station.
pub struct CheckInService {
    store: GuestStore,
    config: ServiceConfig,
    scan_gate: Mutex<()>,
    next_id: AtomicU64,
}

impl CheckInService {
    /// Service starting from an empty collection.
    #[must_use]
    pub fn new(env: GuestEnvironment, config: ServiceConfig) -> Self {
        Self::with_state(GuestState::default(), env, config)
    }

    /// Service starting from `state`.
    #[must_use]
    pub fn with_state(state: GuestState, env: GuestEnvironment, config: ServiceConfig) -> Self {
        let capacity = config.broadcast_capacity;
        let store = Store::with_broadcast_capacity(state, GuestReducer::new(), env, capacity);
        Self {
            store,
            config,
            scan_gate: Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Replace the collection from the backend, falling back to the snapshot.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_all(&self) -> FetchReport {
        let request_id = self.next_id();
        let outcome = self
            .store
            .send_and_wait_for(
                GuestAction::FetchGuests { request_id },
                |action| action.completed_fetch() == Some(request_id),
                self.config.request_timeout,
            )
            .await;

        let (source, degraded_reason) = match outcome {
            Ok(GuestAction::FetchCompleted {
                source,
                degraded_reason,
                ..
            }) => (source, degraded_reason),
            Ok(_) => (SnapshotSource::Cache, None),
            Err(e) => {
                tracing::warn!(error = %e, "Fetch did not complete");
                (SnapshotSource::Cache, Some(e.to_string()))
            },
        };

        FetchReport {
            source,
            guests: self.snapshot().await,
            degraded_reason,
        }
    }

    /// Register a guest.
    ///
    /// # Errors
    ///
    /// - [`GuestError::Validation`]: malformed input or a duplicate email
    /// - [`GuestError::BackendUnavailable`]: the backend could not be reached
    ///   or did not answer in time
    #[tracing::instrument(skip(self, email))]
    pub async fn register(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<GuestRecord, GuestError> {
        let request_id = self.next_id();
        let action = GuestAction::RegisterGuest {
            request_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
        };

        let outcome = self
            .store
            .send_and_wait_for(
                action,
                |action| action.completed_registration() == Some(request_id),
                self.config.request_timeout,
            )
            .await;

        match outcome {
            Ok(GuestAction::RegistrationCompleted { outcome, .. }) => outcome,
            Ok(_) => Err(GuestError::BackendUnavailable(
                "unexpected registration outcome".to_string(),
            )),
            Err(e) => Err(GuestError::BackendUnavailable(e.to_string())),
        }
    }

    /// Check in whoever `code` names.
    ///
    /// Scans on one station are processed one at a time.
    #[tracing::instrument(skip(self))]
    pub async fn check_in(&self, code: &str) -> ScanResult {
        let _gate = self.scan_gate.lock().await;
        let scan_id = self.next_id();

        let outcome = self
            .store
            .send_and_wait_for(
                GuestAction::CheckIn {
                    scan_id,
                    code: code.to_string(),
                },
                |action| action.completed_scan() == Some(scan_id),
                self.config.request_timeout,
            )
            .await;

        match outcome {
            Ok(GuestAction::ScanCompleted { result, .. }) => result,
            Ok(_) => ScanResult::retry(),
            Err(e) => {
                tracing::warn!(scan_id, error = %e, "Scan did not complete");
                ScanResult::retry()
            },
        }
    }

    /// Fold a remote change.
    pub async fn apply_remote_change(&self, change: GuestChange) {
        if let Err(e) = self.store.send(GuestAction::ApplyRemoteChange { change }).await {
            tracing::warn!(error = %e, "Dropped remote change");
        }
    }

    /// Current ordered collection.
    pub async fn snapshot(&self) -> Vec<GuestRecord> {
        self.store.state(GuestState::snapshot).await
    }

    /// Whether the last backend call succeeded.
    pub async fn is_online(&self) -> bool {
        self.store.state(|s| s.online).await
    }

    /// Check-ins applied without a backend.
    pub async fn unsynced_check_ins(&self) -> Vec<GuestId> {
        self.store.state(|s| s.unsynced_check_ins.clone()).await
    }

    /// Registrations created without a backend.
    pub async fn unsynced_registrations(&self) -> Vec<GuestId> {
        self.store.state(|s| s.unsynced_registrations.clone()).await
    }

    /// Outcome of the most recent scan.
    pub async fn last_scan(&self) -> Option<ScanResult> {
        self.store.state(|s| s.last_scan.clone()).await
    }

    /// Most recent failure message.
    pub async fn last_error(&self) -> Option<String> {
        self.store.state(|s| s.last_error.clone()).await
    }

    /// Forget the most recent scan outcome.
    pub async fn clear_scan_result(&self) {
        if let Err(e) = self.store.send(GuestAction::ClearScanResult).await {
            tracing::warn!(error = %e, "Could not clear scan result");
        }
    }

    /// Start folding changes from `feed` into this station.
    #[must_use]
    pub fn listen(&self, feed: Arc<dyn ChangeFeed>, retry_delay: Duration) -> ListenerHandle {
        ChangeListener::new("guests", feed, self.store.clone())
            .with_retry_delay(retry_delay)
            .spawn()
    }

    /// Stop accepting calls and wait for in-flight effects.
    ///
    /// # Errors
    ///
    /// [`StoreError::ShutdownTimeout`] when effects are still running after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.store.shutdown(timeout).await
    }
}
