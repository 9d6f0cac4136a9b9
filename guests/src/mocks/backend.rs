//! Mock guest backend.

use crate::error::BackendError;
use crate::ports::{BackendFuture, ChangeFeed, ChangeStream, GuestBackend};
use crate::types::{GuestChange, GuestId, GuestRecord, NewGuest};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

#[derive(Debug)]
struct BackendState {
    guests: Vec<GuestRecord>,
    available: bool,
    lookups: usize,
}

/// Mock guest backend.
///
/// Shared by every clone, so several stations can race against one
/// instance. The check-in write is conditional, like the real table, and
/// every mutation is published to change-feed subscribers.
#[derive(Debug, Clone)]
pub struct InMemoryGuestBackend {
    state: Arc<Mutex<BackendState>>,
    changes: Arc<Mutex<broadcast::Sender<GuestChange>>>,
}

impl InMemoryGuestBackend {
    /// Create an empty, available backend.
    #[must_use]
    pub fn new() -> Self {
        Self::with_guests(Vec::new())
    }

    /// Create a backend holding `guests`.
    #[must_use]
    pub fn with_guests(guests: Vec<GuestRecord>) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            state: Arc::new(Mutex::new(BackendState {
                guests,
                available: true,
                lookups: 0,
            })),
            changes: Arc::new(Mutex::new(changes)),
        }
    }

    /// Simulate an outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.available = available;
        }
    }

    /// Stored guests, in storage order.
    #[must_use]
    pub fn guests(&self) -> Vec<GuestRecord> {
        self.state.lock().map(|state| state.guests.clone()).unwrap_or_default()
    }

    /// Number of `find_by_id_or_prefix` calls served.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.state.lock().map(|state| state.lookups).unwrap_or_default()
    }

    /// Number of open change-feed subscriptions.
    #[must_use]
    pub fn subscribers(&self) -> usize {
        self.changes.lock().map(|changes| changes.receiver_count()).unwrap_or_default()
    }

    /// Remove a guest as an administrator would, notifying subscribers.
    pub fn delete(&self, id: &GuestId) {
        let removed = self.state.lock().ok().and_then(|mut state| {
            let index = state.guests.iter().position(|guest| &guest.id == id)?;
            Some(state.guests.remove(index))
        });

        if let Some(record) = removed {
            self.publish(GuestChange::Delete(record));
        }
    }

    /// Deliver a change to subscribers without touching storage.
    pub fn publish(&self, change: GuestChange) {
        if let Ok(changes) = self.changes.lock() {
            let _ = changes.send(change);
        }
    }

    /// End every open subscription, as a dropped connection would.
    pub fn drop_subscriptions(&self) {
        if let Ok(mut changes) = self.changes.lock() {
            *changes = broadcast::channel(256).0;
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BackendState>, BackendError> {
        let state = self
            .state
            .lock()
            .map_err(|_| BackendError::Unavailable("backend state poisoned".to_string()))?;

        if state.available {
            Ok(state)
        } else {
            Err(BackendError::Unavailable("connection refused".to_string()))
        }
    }
}

impl Default for InMemoryGuestBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GuestBackend for InMemoryGuestBackend {
    fn fetch_all(&self) -> BackendFuture<'_, Vec<GuestRecord>> {
        Box::pin(async move {
            let mut guests = self.lock()?.guests.clone();
            guests.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
            Ok(guests)
        })
    }

    fn insert(&self, guest: NewGuest) -> BackendFuture<'_, GuestRecord> {
        Box::pin(async move {
            let record = {
                let mut state = self.lock()?;
                if state.guests.iter().any(|existing| existing.email == guest.email) {
                    return Err(BackendError::Validation(format!(
                        "duplicate key value violates unique constraint: email {}",
                        guest.email
                    )));
                }

                let id = GuestId::new(uuid::Uuid::new_v4().to_string());
                let record = GuestRecord::register(id, guest, Utc::now());
                state.guests.push(record.clone());
                record
            };

            self.publish(GuestChange::Insert(record.clone()));
            Ok(record)
        })
    }

    fn mark_checked_in(
        &self,
        id: GuestId,
        scanned_at: DateTime<Utc>,
    ) -> BackendFuture<'_, GuestRecord> {
        Box::pin(async move {
            let record = {
                let mut state = self.lock()?;
                let record = state
                    .guests
                    .iter_mut()
                    .find(|guest| guest.id == id)
                    .ok_or(BackendError::NotFound)?;

                if let Some(winner) = record.scanned_at {
                    return Err(BackendError::ConflictLost { scanned_at: winner });
                }

                record.check_in(scanned_at);
                record.clone()
            };

            self.publish(GuestChange::Update(record.clone()));
            Ok(record)
        })
    }

    fn find_by_id_or_prefix(&self, code: String) -> BackendFuture<'_, Option<GuestRecord>> {
        Box::pin(async move {
            let mut state = self.lock()?;
            state.lookups += 1;

            if let Some(exact) = state.guests.iter().find(|guest| guest.id.as_str() == code) {
                return Ok(Some(exact.clone()));
            }

            let mut matches = state.guests.iter().filter(|guest| guest.id.has_short_code(&code));
            Ok(match (matches.next(), matches.next()) {
                (Some(only), None) => Some(only.clone()),
                _ => None,
            })
        })
    }
}

impl ChangeFeed for InMemoryGuestBackend {
    fn subscribe(&self) -> BackendFuture<'_, ChangeStream> {
        Box::pin(async move {
            drop(self.lock()?);
            let mut receiver = self
                .changes
                .lock()
                .map_err(|_| BackendError::Unavailable("change channel poisoned".to_string()))?
                .subscribe();

            let stream: ChangeStream = Box::pin(async_stream::stream! {
                loop {
                    match receiver.recv().await {
                        Ok(change) => yield Ok(change),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            let reason = format!("missed {missed} changes");
                            yield Err(BackendError::Unavailable(reason));
                        },
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
            Ok(stream)
        })
    }
}
