use crate::errors::ConfigError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_INFO_URL: &str = "https://api.hyperliquid.xyz/info";

/// Hard ceiling on the number of ranked entries a snapshot may hold.
pub const MAX_ENTRIES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_port: u16,
    pub info_url: String,

    // ── Ranking policy ─────────────────────────────────────────────
    pub min_open_interest_usd: f64,
    pub min_daily_volume_usd: f64,
    pub lookback_days: u32,
    /// Periods per day used to annualize the mean rate. The default of 3
    /// is a convention carried over from 8-hour venues, not the
    /// exchange's settlement cadence; one year holds this × 365 periods.
    pub funding_periods_per_day: u32,
    pub top_n: usize,

    // ── Refresh cadence ────────────────────────────────────────────
    pub refresh_interval: Duration,
    pub refresh_jitter: Duration,
    pub min_refresh_age: Duration,

    // ── Transport ──────────────────────────────────────────────────
    pub fetch_concurrency: usize,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,

    pub cache_path: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset or blank keys fall back
    /// to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected `text` or `json`".into(),
                });
            }
        };

        let config = Self {
            api_port: parse(&get, "API_PORT", 8001)?,
            info_url: get("HYPERLIQUID_INFO_URL").unwrap_or_else(|| DEFAULT_INFO_URL.to_string()),
            min_open_interest_usd: parse(&get, "MIN_OPEN_INTEREST_USD", 10_000_000.0)?,
            min_daily_volume_usd: parse(&get, "MIN_DAILY_VOLUME_USD", 10_000_000.0)?,
            lookback_days: positive(&get, "LOOKBACK_DAYS", 7)?,
            funding_periods_per_day: positive(&get, "FUNDING_PERIODS_PER_DAY", 3)?,
            top_n: positive::<usize>(&get, "TOP_N", MAX_ENTRIES)?.min(MAX_ENTRIES),
            refresh_interval: Duration::from_secs(positive(&get, "REFRESH_INTERVAL_SECS", 3600)?),
            refresh_jitter: Duration::from_secs(parse(&get, "REFRESH_JITTER_SECS", 30)?),
            min_refresh_age: Duration::from_secs(parse(&get, "MIN_REFRESH_AGE_SECS", 60)?),
            fetch_concurrency: positive(&get, "FETCH_CONCURRENCY", 8)?,
            request_timeout: Duration::from_millis(positive(&get, "REQUEST_TIMEOUT_MS", 10_000)?),
            max_attempts: positive(&get, "MAX_ATTEMPTS", 3)?,
            backoff_base: Duration::from_millis(parse(&get, "BACKOFF_BASE_MS", 250)?),
            cache_path: get("CACHE_PATH").map(PathBuf::from),
            log_format,
        };

        if !config.min_open_interest_usd.is_finite() || !config.min_daily_volume_usd.is_finite() {
            return Err(ConfigError::Invalid {
                key: "MIN_OPEN_INTEREST_USD/MIN_DAILY_VOLUME_USD",
                value: format!(
                    "{}/{}",
                    config.min_open_interest_usd, config.min_daily_volume_usd
                ),
                reason: "liquidity floors must be finite".into(),
            });
        }

        Ok(config)
    }

    /// Hourly samples held by the lookback window (7 days → 168).
    pub fn window_hours(&self) -> u32 {
        self.lookback_days * 24
    }

    pub fn periods_per_year(&self) -> f64 {
        f64::from(self.funding_periods_per_day) * 365.0
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

fn positive<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let value = parse(get, key, default)?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}
