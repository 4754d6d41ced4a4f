use crate::aggregation::AggregationEngine;
use crate::cache::{CacheView, SnapshotFile, SnapshotStore};
use crate::clock::Clock;
use crate::config::Config;
use crate::errors::RefreshError;
use crate::exchanges::{MarketSource, fetch_histories};
use crate::models::{Instrument, Snapshot};
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};

type Outcome = Result<Arc<Snapshot>, RefreshError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// First timer tick after process start; always runs.
    Startup,
    /// Periodic tick; skipped while the published snapshot is still fresh.
    Timer,
    /// Reader explicitly asked for new data.
    Forced,
    /// Reader found no snapshot at all.
    Demand,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerStatus {
    Idle,
    Refreshing,
    Failed(RefreshError),
}

enum State {
    Idle,
    /// Waiters clone the receiver and read the cycle's outcome from it.
    Refreshing(watch::Receiver<Option<Outcome>>),
    Failed(RefreshError),
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub jitter: Duration,
    pub min_refresh_age: Duration,
    pub window_hours: u32,
    pub fetch_concurrency: usize,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.refresh_interval,
            jitter: config.refresh_jitter,
            min_refresh_age: config.min_refresh_age,
            window_hours: config.window_hours(),
            fetch_concurrency: config.fetch_concurrency,
        }
    }
}

/// Owns the refresh pipeline. Timer ticks and reader requests both go
/// through `refresh`, and at most one cycle runs at a time.
pub struct RefreshScheduler {
    source: Arc<dyn MarketSource>,
    engine: AggregationEngine,
    store: SnapshotStore,
    snapshot_file: Option<SnapshotFile>,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    state: Mutex<State>,
    /// Unix millis of the next timer tick, 0 until the timer starts.
    next_tick_ms: AtomicI64,
}

impl RefreshScheduler {
    pub fn new(
        source: Arc<dyn MarketSource>,
        engine: AggregationEngine,
        store: SnapshotStore,
        clock: Arc<dyn Clock>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            source,
            engine,
            store,
            snapshot_file: None,
            clock,
            settings,
            state: Mutex::new(State::Idle),
            next_tick_ms: AtomicI64::new(0),
        }
    }

    pub fn with_snapshot_file(mut self, file: SnapshotFile) -> Self {
        self.snapshot_file = Some(file);
        self
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub async fn status(&self) -> SchedulerStatus {
        match &*self.state.lock().await {
            State::Idle => SchedulerStatus::Idle,
            State::Refreshing(_) => SchedulerStatus::Refreshing,
            State::Failed(e) => SchedulerStatus::Failed(e.clone()),
        }
    }

    /// When the timer will fire next. Before the timer starts this is one
    /// interval from now.
    pub fn next_refresh_at(&self) -> DateTime<Utc> {
        match self.next_tick_ms.load(Ordering::SeqCst) {
            0 => self.clock.now() + to_delta(self.settings.interval),
            ms => DateTime::from_timestamp_millis(ms)
                .unwrap_or_else(|| self.clock.now() + to_delta(self.settings.interval)),
        }
    }

    /// Publishes the snapshot left on disk by a previous run, if any.
    pub async fn restore(&self) {
        let Some(file) = &self.snapshot_file else {
            return;
        };
        match file.load().await {
            Ok(Some(stored)) => {
                let stored_entries = stored.entries.len();
                let snapshot = self.engine.rescreen(stored);
                if snapshot.entries.len() < stored_entries {
                    tracing::warn!(
                        path = %file.path().display(),
                        dropped = stored_entries - snapshot.entries.len(),
                        "cached snapshot had entries outside the current policy"
                    );
                }
                tracing::info!(
                    path = %file.path().display(),
                    entries = snapshot.entries.len(),
                    generated_at = %snapshot.generated_at,
                    "restored cached snapshot"
                );
                self.store.publish(snapshot);
            }
            Ok(None) => tracing::debug!(path = %file.path().display(), "no cached snapshot on disk"),
            Err(e) => tracing::warn!(path = %file.path().display(), error = %e, "ignoring unreadable cached snapshot"),
        }
    }

    /// Runs a refresh cycle, or joins the one already running, and returns
    /// its result.
    pub async fn refresh(self: &Arc<Self>, trigger: Trigger) -> Outcome {
        let mut in_flight = {
            let mut state = self.state.lock().await;

            // A closed channel means the cycle task died; start over
            let running = match &*state {
                State::Refreshing(rx) if rx.has_changed().is_ok() => Some(rx.clone()),
                _ => None,
            };

            match running {
                Some(rx) => {
                    tracing::debug!(?trigger, "refresh already in flight, joining it");
                    metrics::counter!("refresh_coalesced_total").increment(1);
                    rx
                }
                None => {
                    if trigger == Trigger::Timer {
                        if let Some(snapshot) = self.fresh_snapshot() {
                            tracing::debug!(generated_at = %snapshot.generated_at, "snapshot still fresh, skipping tick");
                            return Ok(snapshot);
                        }
                    }

                    let (tx, rx) = watch::channel(None);
                    *state = State::Refreshing(rx.clone());

                    let this = Arc::clone(self);
                    tokio::spawn(async move { this.finish_cycle(trigger, tx).await });
                    rx
                }
            }
        };

        match in_flight.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Err(RefreshError::Aborted)),
            Err(_) => Err(RefreshError::Aborted),
        }
    }

    /// Timer loop. Fires once straight away, even over a restored snapshot,
    /// then every interval plus jitter. The next tick is fixed before the
    /// cycle runs, so a failed cycle keeps the same cadence as a successful
    /// one.
    pub async fn run(self: Arc<Self>) {
        let mut trigger = Trigger::Startup;
        loop {
            let delay = self.next_delay();
            let deadline = tokio::time::Instant::now() + delay;
            let next_tick = self.clock.now() + to_delta(delay);
            self.next_tick_ms
                .store(next_tick.timestamp_millis(), Ordering::SeqCst);

            if let Err(e) = self.refresh(trigger).await {
                tracing::debug!(error = %e, next_tick = %next_tick, "timer refresh failed");
            }
            trigger = Trigger::Timer;

            tokio::time::sleep_until(deadline).await;
        }
    }

    fn next_delay(&self) -> Duration {
        let jitter_ms = self.settings.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.settings.interval + Duration::from_millis(extra)
    }

    fn fresh_snapshot(&self) -> Option<Arc<Snapshot>> {
        match self.store.current() {
            CacheView::Ready { snapshot, age } if age < self.settings.min_refresh_age => Some(snapshot),
            _ => None,
        }
    }

    async fn finish_cycle(self: Arc<Self>, trigger: Trigger, tx: watch::Sender<Option<Outcome>>) {
        let started = tokio::time::Instant::now();
        let outcome = self.run_cycle().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        {
            let mut state = self.state.lock().await;
            *state = match &outcome {
                Ok(_) => State::Idle,
                Err(e) => State::Failed(e.clone()),
            };
        }

        match &outcome {
            Ok(snapshot) => {
                metrics::counter!("refresh_cycles_total", "outcome" => "ok").increment(1);
                tracing::info!(
                    ?trigger,
                    entries = snapshot.entries.len(),
                    elapsed_ms,
                    next_refresh_at = %snapshot.next_refresh_at,
                    "snapshot published"
                );
            }
            Err(e) => {
                metrics::counter!("refresh_cycles_total", "outcome" => "error").increment(1);
                tracing::error!(?trigger, elapsed_ms, error = %e, "refresh failed, keeping previous snapshot");
            }
        }

        tx.send_replace(Some(outcome));
    }

    /// list → pre-screen → fetch histories → aggregate → publish.
    async fn run_cycle(&self) -> Outcome {
        let name = self.source.name();

        let instruments = self
            .source
            .list_instruments()
            .await
            .map_err(|e| RefreshError::Listing(e.to_string()))?;
        if instruments.is_empty() {
            return Err(RefreshError::NoInstruments);
        }

        let listed = instruments.len();
        let candidates: Vec<Instrument> = instruments
            .into_iter()
            .filter(|i| self.engine.is_liquid(i))
            .collect();
        tracing::info!(listed, candidates = candidates.len(), "[{name}] fetching funding history");

        let coins = candidates.iter().map(|i| i.coin.clone()).collect();
        let batch = fetch_histories(
            Arc::clone(&self.source),
            coins,
            self.settings.window_hours,
            self.settings.fetch_concurrency,
        )
        .await;

        if !candidates.is_empty() && batch.histories.is_empty() {
            return Err(RefreshError::AllHistoriesFailed {
                attempted: batch.attempted(),
            });
        }
        if !batch.skipped.is_empty() {
            tracing::warn!(skipped = batch.skipped.len(), "[{name}] some instruments dropped from this cycle");
        }

        let snapshot = self.engine.aggregate(
            &candidates,
            &batch.histories,
            self.clock.now(),
            self.next_refresh_at(),
        );
        let snapshot = self.store.publish(snapshot);

        if let Some(file) = &self.snapshot_file {
            if let Err(e) = file.save(&snapshot).await {
                tracing::warn!(path = %file.path().display(), error = %e, "failed to persist snapshot");
            }
        }

        Ok(snapshot)
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::zero())
}
