//! File-backed durable snapshot.
//!
//! The whole collection is stored as one JSON array in
//! `<dir>/event_guests_backup.json`. Writes go to a temporary sibling first
//! and are renamed into place, so a crash mid-write never leaves a truncated
//! snapshot behind.

use crate::error::CacheError;
use crate::ports::{CacheFuture, SnapshotCache};
use crate::types::GuestRecord;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Fixed snapshot key.
pub const SNAPSHOT_KEY: &str = "event_guests_backup";

/// Snapshot stored in a single JSON file.
#[derive(Debug)]
pub struct FileSnapshotCache {
    path: PathBuf,
    write_lock: Mutex<()>,
    writes: AtomicU64,
}

impl FileSnapshotCache {
    /// Snapshot file inside `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{SNAPSHOT_KEY}.json")),
            write_lock: Mutex::new(()),
            writes: AtomicU64::new(0),
        }
    }

    /// Location of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_atomic(&self, contents: Vec<u8>) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let counter = self.writes.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .path
            .with_extension(format!("json.tmp.{}.{counter}", std::process::id()));

        tokio::fs::write(&tmp, &contents).await?;
        if let Err(error) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(error.into());
        }
        Ok(())
    }
}

impl SnapshotCache for FileSnapshotCache {
    fn load(&self) -> CacheFuture<'_, Vec<GuestRecord>> {
        Box::pin(async move {
            let bytes = match tokio::fs::read(&self.path).await {
                Ok(bytes) => bytes,
                Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(error) => return Err(error.into()),
            };

            Ok(serde_json::from_slice(&bytes)?)
        })
    }

    fn save(&self, guests: Vec<GuestRecord>) -> CacheFuture<'_, ()> {
        Box::pin(async move {
            let contents = serde_json::to_vec(&guests)?;
            self.write_atomic(contents).await?;
            tracing::trace!(
                count = guests.len(),
                path = %self.path.display(),
                "Saved guest snapshot"
            );
            Ok(())
        })
    }
}
