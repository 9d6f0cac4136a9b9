//! Mock snapshot cache.

use crate::error::CacheError;
use crate::ports::{CacheFuture, SnapshotCache};
use crate::types::GuestRecord;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Slot {
    json: Option<String>,
    saves: usize,
}

/// Mock snapshot cache.
///
/// Keeps the serialized snapshot in memory so tests can inspect it or
/// replace it with garbage.
#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshotCache {
    slot: Arc<Mutex<Slot>>,
}

impl InMemorySnapshotCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache already holding `guests`.
    #[must_use]
    pub fn with_guests(guests: &[GuestRecord]) -> Self {
        let cache = Self::new();
        if let (Ok(json), Ok(mut slot)) = (serde_json::to_string(guests), cache.slot.lock()) {
            slot.json = Some(json);
        }
        cache
    }

    /// Overwrite the snapshot with unparsable bytes.
    pub fn corrupt(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.json = Some("{\"guests\": [".to_string());
        }
    }

    /// The stored collection, if one parses.
    #[must_use]
    pub fn stored(&self) -> Option<Vec<GuestRecord>> {
        let slot = self.slot.lock().ok()?;
        serde_json::from_str(slot.json.as_deref()?).ok()
    }

    /// Number of completed saves.
    #[must_use]
    pub fn saves(&self) -> usize {
        self.slot.lock().map(|slot| slot.saves).unwrap_or_default()
    }
}

impl SnapshotCache for InMemorySnapshotCache {
    fn load(&self) -> CacheFuture<'_, Vec<GuestRecord>> {
        Box::pin(async move {
            let json = self
                .slot
                .lock()
                .map_err(|_| CacheError::Io(std::io::Error::other("snapshot slot poisoned")))?
                .json
                .clone();

            match json {
                Some(json) => Ok(serde_json::from_str(&json)?),
                None => Ok(Vec::new()),
            }
        })
    }

    fn save(&self, guests: Vec<GuestRecord>) -> CacheFuture<'_, ()> {
        Box::pin(async move {
            let json = serde_json::to_string(&guests)?;
            let mut slot = self
                .slot
                .lock()
                .map_err(|_| CacheError::Io(std::io::Error::other("snapshot slot poisoned")))?;
            slot.json = Some(json);
            slot.saves += 1;
            Ok(())
        })
    }
}
