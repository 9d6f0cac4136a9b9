//! In-memory guest collection owned by one store.

use crate::types::{GuestChange, GuestId, GuestRecord, ScanResult};
use std::collections::HashSet;

/// State of one check-in station.
///
/// `guests` is the authoritative collection for the running process, most
/// recently registered first. The durable snapshot only mirrors it.
#[derive(Clone, Debug)]
pub struct GuestState {
    /// Ordered guest collection
    pub guests: Vec<GuestRecord>,
    /// Guests with a check-in write in flight
    pub pending_check_ins: HashSet<GuestId>,
    /// Check-ins applied without a backend, not yet durable remotely
    pub unsynced_check_ins: Vec<GuestId>,
    /// Registrations created without a backend, not yet durable remotely
    pub unsynced_registrations: Vec<GuestId>,
    /// Whether the last backend call succeeded
    pub online: bool,
    /// Outcome of the most recent scan
    pub last_scan: Option<ScanResult>,
    /// Most recent failure, cleared by the next successful backend call
    pub last_error: Option<String>,
}

impl Default for GuestState {
    fn default() -> Self {
        Self {
            guests: Vec::new(),
            pending_check_ins: HashSet::new(),
            unsynced_check_ins: Vec::new(),
            unsynced_registrations: Vec::new(),
            online: true,
            last_scan: None,
            last_error: None,
        }
    }
}

impl GuestState {
    /// State seeded with a collection, e.g. a cold-start snapshot.
    #[must_use]
    pub fn with_guests(guests: Vec<GuestRecord>) -> Self {
        Self {
            guests,
            ..Self::default()
        }
    }

    /// Look a guest up by exact id.
    #[must_use]
    pub fn find(&self, id: &GuestId) -> Option<&GuestRecord> {
        self.guests.iter().find(|guest| &guest.id == id)
    }

    /// Mutable lookup by exact id.
    pub fn find_mut(&mut self, id: &GuestId) -> Option<&mut GuestRecord> {
        self.guests.iter_mut().find(|guest| &guest.id == id)
    }

    /// Whether a check-in write for `id` is in flight.
    #[must_use]
    pub fn is_pending(&self, id: &GuestId) -> bool {
        self.pending_check_ins.contains(id)
    }

    /// Replace the record with the same id, or prepend it.
    pub fn upsert_front(&mut self, record: GuestRecord) {
        match self.find_mut(&record.id) {
            Some(existing) => *existing = record,
            None => self.guests.insert(0, record),
        }
    }

    /// Append the record unless its id is already present.
    pub fn append_if_absent(&mut self, record: GuestRecord) {
        if self.find(&record.id).is_none() {
            self.guests.push(record);
        }
    }

    /// Remove the record with `id`. Returns whether one was removed.
    pub fn remove(&mut self, id: &GuestId) -> bool {
        let before = self.guests.len();
        self.guests.retain(|guest| &guest.id != id);
        self.guests.len() != before
    }

    /// Fold a remote change into the collection.
    ///
    /// Inserts prepend unless the id is present; updates replace a present
    /// record and never insert; deletes remove a present record. Every fold
    /// is idempotent. Returns whether the collection changed.
    pub fn apply_change(&mut self, change: &GuestChange) -> bool {
        match change {
            GuestChange::Insert(record) => {
                if self.find(&record.id).is_some() {
                    return false;
                }
                self.guests.insert(0, record.clone());
                true
            },
            GuestChange::Update(record) => match self.find_mut(&record.id) {
                Some(existing) if existing != record => {
                    *existing = record.clone();
                    true
                },
                _ => false,
            },
            GuestChange::Delete(record) => self.remove(&record.id),
        }
    }

    /// Copy of the ordered collection, for the durable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Vec<GuestRecord> {
        self.guests.clone()
    }
}
