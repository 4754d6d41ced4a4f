pub mod persist;
pub mod store;

use crate::models::Snapshot;
use std::sync::Arc;
use std::time::Duration;
pub use persist::SnapshotFile;
pub use store::SnapshotStore;

/// What a reader sees when asking the cache for the current snapshot.
/// `Unavailable` means nothing was ever published; a published snapshot
/// with no entries is still `Ready`.
#[derive(Debug, Clone)]
pub enum CacheView {
    Unavailable,
    Ready {
        snapshot: Arc<Snapshot>,
        age: Duration,
    },
}
