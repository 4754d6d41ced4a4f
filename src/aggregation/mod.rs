use crate::config::{Config, MAX_ENTRIES};
use crate::models::{Instrument, InstrumentAggregate, RateSample, Snapshot};
use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct AggregationPolicy {
    pub min_open_interest_usd: f64,
    pub min_daily_volume_usd: f64,
    /// Funding settlements per year; annualized % = mean × this × 100.
    pub periods_per_year: f64,
    /// Most samples that may feed one mean (lookback hours).
    pub window_len: usize,
    pub top_n: usize,
}

impl AggregationPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_open_interest_usd: config.min_open_interest_usd,
            min_daily_volume_usd: config.min_daily_volume_usd,
            periods_per_year: config.periods_per_year(),
            window_len: config.window_hours() as usize,
            top_n: config.top_n,
        }
    }
}

pub struct AggregationEngine {
    policy: AggregationPolicy,
}

impl AggregationEngine {
    pub fn new(policy: AggregationPolicy) -> Self {
        Self { policy }
    }

    /// Both floors must be cleared, strictly.
    pub fn is_liquid(&self, instrument: &Instrument) -> bool {
        instrument.open_interest_usd > self.policy.min_open_interest_usd
            && instrument.daily_volume_usd > self.policy.min_daily_volume_usd
    }

    /// Reduces one instrument's history to its aggregate. `None` when there
    /// is nothing to average.
    pub fn summarize(
        &self,
        instrument: &Instrument,
        samples: &[RateSample],
    ) -> Option<InstrumentAggregate> {
        let window = &samples[samples.len().saturating_sub(self.policy.window_len)..];
        let current = window.last()?;

        let sum: f64 = window.iter().map(|s| s.rate).sum();
        let mean_rate = sum / window.len() as f64;
        let periods_per_year = self.policy.periods_per_year;

        Some(InstrumentAggregate {
            coin: instrument.coin.clone(),
            mean_rate,
            mean_rate_pct: mean_rate * 100.0,
            annualized_pct: mean_rate * periods_per_year * 100.0,
            current_rate: current.rate,
            current_rate_annualized_pct: current.rate * periods_per_year * 100.0,
            window_funding_pct: sum * 100.0,
            open_interest_usd: instrument.open_interest_usd,
            daily_volume_usd: instrument.daily_volume_usd,
            mark_price: instrument.mark_price,
            sample_count: window.len(),
        })
    }

    /// Averages, filters, ranks and truncates into a snapshot. Instruments
    /// without history are left out; an empty result is still a snapshot.
    pub fn aggregate(
        &self,
        instruments: &[Instrument],
        histories: &HashMap<String, Vec<RateSample>>,
        generated_at: DateTime<Utc>,
        next_refresh_at: DateTime<Utc>,
    ) -> Snapshot {
        let mut entries: Vec<InstrumentAggregate> = instruments
            .iter()
            .filter_map(|instrument| {
                let samples = histories.get(&instrument.coin)?;
                self.summarize(instrument, samples)
                    .filter(|_| self.is_liquid(instrument))
            })
            .collect();

        self.rank(&mut entries);

        Snapshot {
            entries,
            generated_at,
            next_refresh_at,
        }
    }

    /// Re-applies the current policy to a snapshot that did not come from
    /// `aggregate`, such as one read back from disk. Entries that fail the
    /// floors or carry an impossible sample count are dropped, the rest are
    /// re-ranked and truncated.
    pub fn rescreen(&self, snapshot: Snapshot) -> Snapshot {
        let mut entries: Vec<InstrumentAggregate> = snapshot
            .entries
            .into_iter()
            .filter(|e| {
                e.open_interest_usd > self.policy.min_open_interest_usd
                    && e.daily_volume_usd > self.policy.min_daily_volume_usd
                    && (1..=self.policy.window_len).contains(&e.sample_count)
                    && e.annualized_pct.is_finite()
            })
            .collect();
        self.rank(&mut entries);

        Snapshot {
            entries,
            ..snapshot
        }
    }

    fn rank(&self, entries: &mut Vec<InstrumentAggregate>) {
        // Highest annualized first, then coin name so equal rates have a stable order
        entries.sort_by(|a, b| {
            OrderedFloat(b.annualized_pct)
                .cmp(&OrderedFloat(a.annualized_pct))
                .then_with(|| a.coin.cmp(&b.coin))
        });
        entries.truncate(self.policy.top_n.min(MAX_ENTRIES));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn policy() -> AggregationPolicy {
        AggregationPolicy {
            min_open_interest_usd: 10_000_000.0,
            min_daily_volume_usd: 10_000_000.0,
            periods_per_year: 1095.0,
            window_len: 168,
            top_n: 10,
        }
    }

    fn instrument(coin: &str, oi: f64, volume: f64) -> Instrument {
        Instrument {
            coin: coin.to_string(),
            open_interest_usd: oi,
            daily_volume_usd: volume,
            mark_price: 1.0,
        }
    }

    fn flat(rate: f64, n: usize) -> Vec<RateSample> {
        (0..n)
            .map(|i| RateSample {
                time_ms: i as i64 * 3_600_000,
                rate,
            })
            .collect()
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap()
    }

    #[test]
    fn ranks_liquid_instruments_by_annualized_rate() {
        let engine = AggregationEngine::new(policy());
        let instruments = vec![
            instrument("A", 20_000_000.0, 15_000_000.0),
            instrument("B", 5_000_000.0, 200_000_000.0),
            instrument("C", 50_000_000.0, 50_000_000.0),
        ];
        let histories = HashMap::from([
            ("A".to_string(), flat(0.001, 168)),
            ("B".to_string(), flat(0.002, 168)),
            ("C".to_string(), flat(0.0005, 168)),
        ]);

        let snapshot = engine.aggregate(&instruments, &histories, ts(), ts());

        let coins: Vec<&str> = snapshot.entries.iter().map(|e| e.coin.as_str()).collect();
        assert_eq!(coins, vec!["A", "C"]);
        assert!((snapshot.entries[0].annualized_pct - 109.5).abs() < 1e-9);
        assert!((snapshot.entries[1].annualized_pct - 54.75).abs() < 1e-9);
    }

    #[test]
    fn both_floors_must_be_cleared() {
        let engine = AggregationEngine::new(policy());

        assert!(engine.is_liquid(&instrument("OK", 10_000_001.0, 10_000_001.0)));
        assert!(!engine.is_liquid(&instrument("LOW_OI", 1.0, 900_000_000.0)));
        assert!(!engine.is_liquid(&instrument("LOW_VOL", 900_000_000.0, 1.0)));
        assert!(!engine.is_liquid(&instrument("AT_FLOOR", 10_000_000.0, 10_000_000.0)));
    }

    #[test]
    fn current_rate_is_the_newest_sample() {
        let engine = AggregationEngine::new(policy());
        let samples = vec![
            RateSample { time_ms: 1, rate: 0.0001 },
            RateSample { time_ms: 2, rate: 0.0002 },
            RateSample { time_ms: 3, rate: -0.0003 },
        ];

        let aggregate = engine
            .summarize(&instrument("X", 1.0, 1.0), &samples)
            .unwrap();

        assert_eq!(aggregate.current_rate, -0.0003);
        assert_eq!(aggregate.sample_count, 3);
        assert!((aggregate.window_funding_pct - 0.0).abs() < 1e-12);
    }

    #[test]
    fn only_the_newest_window_feeds_the_mean() {
        let engine = AggregationEngine::new(AggregationPolicy {
            window_len: 2,
            ..policy()
        });
        let samples = vec![
            RateSample { time_ms: 1, rate: 1.0 },
            RateSample { time_ms: 2, rate: 0.002 },
            RateSample { time_ms: 3, rate: 0.004 },
        ];

        let aggregate = engine
            .summarize(&instrument("X", 1.0, 1.0), &samples)
            .unwrap();

        assert_eq!(aggregate.sample_count, 2);
        assert!((aggregate.mean_rate - 0.003).abs() < 1e-12);
    }

    #[test]
    fn empty_histories_are_excluded_and_empty_result_is_valid() {
        let engine = AggregationEngine::new(policy());
        let instruments = vec![
            instrument("EMPTY", 90_000_000.0, 90_000_000.0),
            instrument("MISSING", 90_000_000.0, 90_000_000.0),
        ];
        let histories = HashMap::from([("EMPTY".to_string(), Vec::new())]);

        assert!(engine.summarize(&instruments[0], &[]).is_none());

        let snapshot = engine.aggregate(&instruments, &histories, ts(), ts());
        assert!(snapshot.entries.is_empty());
        assert_eq!(snapshot.generated_at, ts());
    }

    #[test]
    fn equal_rates_fall_back_to_coin_order() {
        let engine = AggregationEngine::new(policy());
        let instruments = vec![
            instrument("ZEC", 90_000_000.0, 90_000_000.0),
            instrument("ARB", 90_000_000.0, 90_000_000.0),
            instrument("MKR", 90_000_000.0, 90_000_000.0),
        ];
        let histories: HashMap<String, Vec<RateSample>> = instruments
            .iter()
            .map(|i| (i.coin.clone(), flat(0.0001, 24)))
            .collect();

        let snapshot = engine.aggregate(&instruments, &histories, ts(), ts());

        let coins: Vec<&str> = snapshot.entries.iter().map(|e| e.coin.as_str()).collect();
        assert_eq!(coins, vec!["ARB", "MKR", "ZEC"]);
    }

    #[test]
    fn rescreen_restores_snapshot_invariants() {
        let engine = AggregationEngine::new(policy());
        let mut entries: Vec<InstrumentAggregate> = (0..15)
            .map(|i| {
                let liquid = instrument(&format!("C{i:02}"), 90_000_000.0, 90_000_000.0);
                engine
                    .summarize(&liquid, &flat(0.0001 * (i + 1) as f64, 24))
                    .unwrap()
            })
            .collect();
        entries[14].open_interest_usd = 1.0;
        entries[13].sample_count = 0;
        entries[12].sample_count = 500;
        let stored = Snapshot {
            entries,
            generated_at: ts(),
            next_refresh_at: ts(),
        };

        let snapshot = engine.rescreen(stored);

        let coins: Vec<&str> = snapshot.entries.iter().map(|e| e.coin.as_str()).collect();
        assert_eq!(coins.len(), MAX_ENTRIES);
        assert_eq!(coins.first(), Some(&"C11"));
        assert_eq!(coins.last(), Some(&"C02"));
        assert_eq!(snapshot.generated_at, ts());
    }

    fn market() -> impl Strategy<Value = Vec<(f64, f64, Vec<f64>)>> {
        prop::collection::vec(
            (
                0.0..50_000_000.0f64,
                0.0..50_000_000.0f64,
                prop::collection::vec(-0.01..0.01f64, 0..200),
            ),
            0..40,
        )
    }

    proptest! {
        #[test]
        fn snapshot_invariants_hold(market in market()) {
            let engine = AggregationEngine::new(policy());
            let mut instruments = Vec::new();
            let mut histories = HashMap::new();
            for (i, (oi, volume, rates)) in market.into_iter().enumerate() {
                let coin = format!("C{i:02}");
                instruments.push(instrument(&coin, oi, volume));
                let samples: Vec<RateSample> = rates
                    .into_iter()
                    .enumerate()
                    .map(|(t, rate)| RateSample { time_ms: t as i64, rate })
                    .collect();
                histories.insert(coin, samples);
            }

            let snapshot = engine.aggregate(&instruments, &histories, ts(), ts());

            prop_assert!(snapshot.entries.len() <= MAX_ENTRIES);
            for pair in snapshot.entries.windows(2) {
                prop_assert!(
                    pair[0].annualized_pct > pair[1].annualized_pct
                        || (pair[0].annualized_pct == pair[1].annualized_pct && pair[0].coin < pair[1].coin)
                );
            }
            for entry in &snapshot.entries {
                prop_assert!(entry.open_interest_usd > 10_000_000.0);
                prop_assert!(entry.daily_volume_usd > 10_000_000.0);
                prop_assert!(entry.sample_count >= 1 && entry.sample_count <= 168);
                prop_assert_eq!(entry.annualized_pct, entry.mean_rate * 1095.0 * 100.0);
                prop_assert!(!histories[&entry.coin].is_empty());
            }
        }
    }
}
