//! # Checkin Guests
//!
//! Guest records and the check-in state machine for event entrance stations.
//!
//! A station holds the guest collection in memory, mirrors it to a durable
//! snapshot and, when a backend is configured, writes every check-in through
//! a conditional update so that two stations scanning the same guest never
//! both report success. Remote changes are folded in by a background
//! listener.
//!
//! ## Example
//!
//! ```ignore
//! use checkin_guests::{
//!     CheckInService, FileSnapshotCache, GuestEnvironment, RandomIdGenerator, ServiceConfig,
//! };
//!
//! let env = GuestEnvironment::new(
//!     Arc::new(SystemClock),
//!     Arc::new(RandomIdGenerator),
//!     Arc::new(FileSnapshotCache::new(".checkin")),
//! )
//! .with_backend(backend);
//!
//! let station = CheckInService::new(env, ServiceConfig::default());
//! station.fetch_all().await;
//!
//! let result = station.check_in("a1b2c3d4").await;
//! println!("{}: {}", result.status, result.message);
//! ```

pub mod actions;
pub mod cache;
pub mod error;
pub mod listener;
pub mod ports;
pub mod reducer;
pub mod resolve;
pub mod service;
pub mod state;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use actions::GuestAction;
pub use cache::FileSnapshotCache;
pub use error::{BackendError, CacheError, GuestError};
pub use listener::{ChangeListener, GuestStore, ListenerHandle};
pub use ports::{ChangeFeed, ChangeStream, GuestBackend, SnapshotCache};
pub use reducer::{GuestEnvironment, GuestReducer};
pub use service::{CheckInService, FetchReport, RandomIdGenerator, ServiceConfig};
pub use state::GuestState;
pub use types::{
    GuestChange, GuestId, GuestRecord, NewGuest, ScanResult, ScanStatus, SnapshotSource,
    SHORT_CODE_LEN,
};
