use crate::cache::CacheView;
use crate::errors::QueryError;
use crate::models::Snapshot;
use crate::scheduler::{RefreshScheduler, SchedulerStatus, Trigger};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// A snapshot handed to a reader, with its age at the time of the read.
#[derive(Debug, Clone)]
pub struct TopCoins {
    pub snapshot: Arc<Snapshot>,
    pub age: Duration,
}

#[derive(Debug, Clone)]
pub struct RefreshStatus {
    pub status: SchedulerStatus,
    pub next_refresh_at: DateTime<Utc>,
    pub snapshot_age: Option<Duration>,
}

/// Single read entry point over the cache and the scheduler.
#[derive(Clone)]
pub struct QueryFacade {
    scheduler: Arc<RefreshScheduler>,
}

impl QueryFacade {
    pub fn new(scheduler: Arc<RefreshScheduler>) -> Self {
        Self { scheduler }
    }

    /// Without `force_refresh`, any published snapshot is returned as is,
    /// however old. With it, the caller waits for a full refresh cycle,
    /// which takes several seconds. If nothing was ever published the first
    /// call waits for a cycle either way.
    pub async fn get_top_coins(&self, force_refresh: bool) -> Result<TopCoins, QueryError> {
        if !force_refresh {
            if let CacheView::Ready { snapshot, age } = self.scheduler.store().current() {
                return Ok(TopCoins { snapshot, age });
            }
        }

        let trigger = if force_refresh {
            Trigger::Forced
        } else {
            Trigger::Demand
        };

        let failure = self.scheduler.refresh(trigger).await.err();
        if let Some(e) = &failure {
            tracing::warn!(?trigger, error = %e, "refresh requested by reader failed");
        }

        // A failed refresh still leaves the previous snapshot in place
        match self.scheduler.store().current() {
            CacheView::Ready { snapshot, age } => Ok(TopCoins { snapshot, age }),
            CacheView::Unavailable => Err(QueryError::Unavailable(
                failure
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "refresh completed without publishing".into()),
            )),
        }
    }

    pub async fn refresh_status(&self) -> RefreshStatus {
        let snapshot_age = match self.scheduler.store().current() {
            CacheView::Ready { age, .. } => Some(age),
            CacheView::Unavailable => None,
        };
        RefreshStatus {
            status: self.scheduler.status().await,
            next_refresh_at: self.scheduler.next_refresh_at(),
            snapshot_age,
        }
    }
}
