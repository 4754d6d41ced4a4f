use crate::models::InstrumentAggregate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Query string for GET /api/hyperliquid/top-coins
#[derive(Debug, Default, Deserialize)]
pub struct TopCoinsParams {
    #[serde(default)]
    pub force_refresh: bool,
}

/// Response for GET /api/hyperliquid/status
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: &'static str,
    pub next_refresh_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_age_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// One ranked coin as exposed to API clients.
#[derive(Debug, Serialize)]
pub struct CoinEntry {
    pub coin: String,
    pub annualized_funding_rate_pct: f64,
    pub avg_funding_rate: f64,
    pub avg_funding_rate_pct: f64,
    pub current_funding_rate: f64,
    pub current_funding_rate_annualized_pct: f64,
    pub total_window_funding_pct: f64,
    pub open_interest_usd: f64,
    pub daily_volume_usd: f64,
    pub mark_price: f64,
    pub funding_data_points: usize,
}

impl From<&InstrumentAggregate> for CoinEntry {
    fn from(a: &InstrumentAggregate) -> Self {
        Self {
            coin: a.coin.clone(),
            annualized_funding_rate_pct: a.annualized_pct,
            avg_funding_rate: a.mean_rate,
            avg_funding_rate_pct: a.mean_rate_pct,
            current_funding_rate: a.current_rate,
            current_funding_rate_annualized_pct: a.current_rate_annualized_pct,
            total_window_funding_pct: a.window_funding_pct,
            open_interest_usd: a.open_interest_usd,
            daily_volume_usd: a.daily_volume_usd,
            mark_price: a.mark_price,
            funding_data_points: a.sample_count,
        }
    }
}

/// Response for GET /api/hyperliquid/top-coins
#[derive(Debug, Serialize)]
pub struct TopCoinsResponse {
    pub success: bool,
    pub coins: Vec<CoinEntry>,
    pub last_updated: DateTime<Utc>,
    pub next_update: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
