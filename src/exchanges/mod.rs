use crate::errors::ExchangeError;
use crate::models::{Instrument, RateSample};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use std::collections::HashMap;
use std::sync::Arc;

pub mod hyperliquid;

#[async_trait]
pub trait MarketSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every listed perpetual with its open interest and 24h volume in USD.
    async fn list_instruments(&self) -> Result<Vec<Instrument>, ExchangeError>;

    /// Funding samples for `coin` over the last `window_hours`, oldest first.
    async fn fetch_history(
        &self,
        coin: &str,
        window_hours: u32,
    ) -> Result<Vec<RateSample>, ExchangeError>;
}

/// Joined result of one round of history fetches. Every requested coin
/// lands in exactly one of the two collections.
#[derive(Debug, Default)]
pub struct HistoryBatch {
    pub histories: HashMap<String, Vec<RateSample>>,
    pub skipped: Vec<(String, ExchangeError)>,
}

impl HistoryBatch {
    pub fn attempted(&self) -> usize {
        self.histories.len() + self.skipped.len()
    }
}

/// Fetches the history of every coin with at most `concurrency` requests
/// in flight, and only returns once every fetch has finished or failed.
pub async fn fetch_histories(
    source: Arc<dyn MarketSource>,
    coins: Vec<String>,
    window_hours: u32,
    concurrency: usize,
) -> HistoryBatch {
    let name = source.name();

    let results: Vec<(String, Result<Vec<RateSample>, ExchangeError>)> = stream::iter(coins)
        .map(|coin| {
            let source = Arc::clone(&source);
            async move {
                let result = source.fetch_history(&coin, window_hours).await;
                (coin, result)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut batch = HistoryBatch::default();
    for (coin, result) in results {
        match result {
            Ok(samples) => {
                tracing::debug!(coin = %coin, samples = samples.len(), "[{name}] history fetched");
                batch.histories.insert(coin, samples);
            }
            Err(e) => {
                tracing::warn!(coin = %coin, error = %e, "[{name}] skipping instrument, history fetch failed");
                metrics::counter!("history_fetch_skipped_total").increment(1);
                batch.skipped.push((coin, e));
            }
        }
    }
    batch
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted in-memory exchange used by the scheduler and pipeline tests.
    #[derive(Default)]
    pub struct FakeSource {
        pub instruments: Mutex<Vec<Instrument>>,
        pub histories: Mutex<HashMap<String, Vec<RateSample>>>,
        pub failing_coins: Mutex<HashSet<String>>,
        pub fail_listing: Mutex<bool>,
        pub delay: Mutex<Duration>,
        pub list_calls: AtomicUsize,
        pub history_calls: AtomicUsize,
        pub in_flight: AtomicUsize,
        pub peak_in_flight: AtomicUsize,
    }

    impl FakeSource {
        pub fn with_market(market: Vec<(Instrument, Vec<RateSample>)>) -> Self {
            let source = Self::default();
            for (instrument, samples) in market {
                source
                    .histories
                    .lock()
                    .unwrap()
                    .insert(instrument.coin.clone(), samples);
                source.instruments.lock().unwrap().push(instrument);
            }
            source
        }

        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock().unwrap() = delay;
        }

        pub fn fail_listing(&self, fail: bool) {
            *self.fail_listing.lock().unwrap() = fail;
        }

        pub fn fail_history(&self, coin: &str) {
            self.failing_coins.lock().unwrap().insert(coin.to_string());
        }

        pub fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MarketSource for FakeSource {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn list_instruments(&self) -> Result<Vec<Instrument>, ExchangeError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().unwrap();
            tokio::time::sleep(delay).await;
            if *self.fail_listing.lock().unwrap() {
                return Err(ExchangeError::UnexpectedData("listing unavailable".into()));
            }
            Ok(self.instruments.lock().unwrap().clone())
        }

        async fn fetch_history(
            &self,
            coin: &str,
            _window_hours: u32,
        ) -> Result<Vec<RateSample>, ExchangeError> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing_coins.lock().unwrap().contains(coin) {
                return Err(ExchangeError::UnexpectedData(format!("{coin} unavailable")));
            }
            Ok(self
                .histories
                .lock()
                .unwrap()
                .get(coin)
                .cloned()
                .unwrap_or_default())
        }
    }
}
