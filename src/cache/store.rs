use super::CacheView;
use crate::clock::Clock;
use crate::models::Snapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Holds the one published snapshot. Publishing swaps a single `Arc`, so a
/// reader either gets the old snapshot or the new one, never a blend, and
/// keeps whatever it already cloned.
#[derive(Clone)]
pub struct SnapshotStore {
    inner: Arc<watch::Sender<Option<Arc<Snapshot>>>>,
    clock: Arc<dyn Clock>,
}

impl SnapshotStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(tx),
            clock,
        }
    }

    /// Latest snapshot and how old it is. Never waits on a refresh.
    pub fn current(&self) -> CacheView {
        match self.latest() {
            None => CacheView::Unavailable,
            Some(snapshot) => {
                let age = (self.clock.now() - snapshot.generated_at)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                CacheView::Ready { snapshot, age }
            }
        }
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.inner.borrow().clone()
    }

    /// Replaces the published snapshot in one step and hands back the
    /// shared copy.
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        self.inner.send_replace(Some(Arc::clone(&snapshot)));
        snapshot
    }
}
