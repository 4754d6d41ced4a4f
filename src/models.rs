use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One perpetual market as listed by the exchange, normalized to USD.
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub coin: String,
    pub open_interest_usd: f64,
    pub daily_volume_usd: f64,
    pub mark_price: f64,
}

/// A single settled funding rate. Sequences are kept oldest first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
    pub time_ms: i64,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentAggregate {
    pub coin: String,
    pub mean_rate: f64,
    /// Mean per-period rate as a percentage.
    pub mean_rate_pct: f64,
    pub annualized_pct: f64,
    /// Rate of the most recent sample in the window.
    pub current_rate: f64,
    pub current_rate_annualized_pct: f64,
    /// Sum of every sampled rate, as a percentage.
    pub window_funding_pct: f64,
    pub open_interest_usd: f64,
    pub daily_volume_usd: f64,
    pub mark_price: f64,
    pub sample_count: usize,
}

/// The ranked result of one refresh cycle. Built once, then shared
/// read-only behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entries: Vec<InstrumentAggregate>,
    pub generated_at: DateTime<Utc>,
    pub next_refresh_at: DateTime<Utc>,
}
