//! In-memory collaborators for tests and local demos.

mod backend;
mod cache;

pub use backend::InMemoryGuestBackend;
pub use cache::InMemorySnapshotCache;
