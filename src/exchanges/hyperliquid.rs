use super::MarketSource;
use crate::clock::Clock;
use crate::config::Config;
use crate::errors::ExchangeError;
use crate::models::{Instrument, RateSample};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const HOUR_MS: i64 = 60 * 60 * 1000;

/// First element of the `metaAndAssetCtxs` reply.
#[derive(Debug, Deserialize)]
struct Meta {
    universe: Vec<UniverseAsset>,
}

#[derive(Debug, Deserialize)]
struct UniverseAsset {
    name: String,

    #[serde(rename = "isDelisted", default)]
    is_delisted: bool,
}

/// Per-asset market context, index-aligned with `Meta::universe`.
/// Hyperliquid sends every number as a decimal string.
#[derive(Debug, Deserialize)]
struct AssetCtx {
    #[serde(rename = "openInterest")]
    open_interest: String,

    #[serde(rename = "dayNtlVlm")]
    day_ntl_vlm: String,

    #[serde(rename = "markPx")]
    mark_px: String,
}

/// One row of the `fundingHistory` reply.
#[derive(Debug, Deserialize)]
struct FundingEntry {
    #[serde(rename = "fundingRate")]
    funding_rate: String,

    time: i64,
}

pub struct Hyperliquid {
    client: reqwest::Client,
    info_url: String,
    max_attempts: u32,
    backoff_base: Duration,
    clock: Arc<dyn Clock>,
}

impl Hyperliquid {
    pub fn new(
        info_url: impl Into<String>,
        request_timeout: Duration,
        max_attempts: u32,
        backoff_base: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ExchangeError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            info_url: info_url.into(),
            max_attempts: max_attempts.max(1),
            backoff_base,
            clock,
        })
    }

    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Result<Self, ExchangeError> {
        Self::new(
            config.info_url.clone(),
            config.request_timeout,
            config.max_attempts,
            config.backoff_base,
            clock,
        )
    }

    /// POSTs `body` to the info endpoint, retrying transient failures with
    /// exponential backoff. Malformed replies and 4xx are returned at once.
    async fn post_info<T: DeserializeOwned>(
        &self,
        body: &serde_json::Value,
    ) -> Result<T, ExchangeError> {
        let mut attempt = 1;
        loop {
            match self.post_once(body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = backoff_delay(self.backoff_base, attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "[{}] request failed, retrying",
                        self.name()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_once<T: DeserializeOwned>(
        &self,
        body: &serde_json::Value,
    ) -> Result<T, ExchangeError> {
        let response = self.client.post(&self.info_url).json(body).send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ExchangeError::Status { status, body: text });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

/// Wait before retrying after failed attempt `attempt` (1-based): the base
/// doubles each time.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

fn parse_decimal(coin: &str, field: &str, raw: &str) -> Result<f64, ExchangeError> {
    let value = raw.parse::<f64>().map_err(|e| {
        ExchangeError::UnexpectedData(format!("{coin}: invalid {field} {raw:?}: {e}"))
    })?;
    if !value.is_finite() {
        return Err(ExchangeError::UnexpectedData(format!(
            "{coin}: non-finite {field} {raw:?}"
        )));
    }
    Ok(value)
}

fn to_instrument(asset: &UniverseAsset, ctx: &AssetCtx) -> Result<Instrument, ExchangeError> {
    let coin = asset.name.as_str();
    let open_interest = parse_decimal(coin, "openInterest", &ctx.open_interest)?;
    let mark_price = parse_decimal(coin, "markPx", &ctx.mark_px)?;

    Ok(Instrument {
        coin: asset.name.clone(),
        // openInterest is quoted in coins, volume is already notional
        open_interest_usd: open_interest * mark_price,
        daily_volume_usd: parse_decimal(coin, "dayNtlVlm", &ctx.day_ntl_vlm)?,
        mark_price,
    })
}

#[async_trait]
impl MarketSource for Hyperliquid {
    fn name(&self) -> &'static str {
        "hyperliquid"
    }

    /// Pulls `metaAndAssetCtxs` and joins the universe with its contexts
    /// by position. Delisted assets and contexts that fail validation are
    /// dropped individually; a reply that does not match the schema at all
    /// fails the whole call.
    async fn list_instruments(&self) -> Result<Vec<Instrument>, ExchangeError> {
        let (meta, contexts): (Meta, Vec<AssetCtx>) =
            self.post_info(&json!({ "type": "metaAndAssetCtxs" })).await?;

        if meta.universe.len() != contexts.len() {
            tracing::warn!(
                universe = meta.universe.len(),
                contexts = contexts.len(),
                "[{}] universe and context lengths differ",
                self.name()
            );
        }

        let mut instruments = Vec::with_capacity(contexts.len());
        for (asset, ctx) in meta.universe.iter().zip(contexts.iter()) {
            if asset.is_delisted {
                continue;
            }
            match to_instrument(asset, ctx) {
                Ok(instrument) => instruments.push(instrument),
                Err(e) => tracing::warn!(coin = %asset.name, error = %e, "[{}] dropping malformed context", self.name()),
            }
        }

        tracing::debug!(count = instruments.len(), "[{}] instruments listed", self.name());
        Ok(instruments)
    }

    async fn fetch_history(
        &self,
        coin: &str,
        window_hours: u32,
    ) -> Result<Vec<RateSample>, ExchangeError> {
        let end_time = self.clock.now().timestamp_millis();
        let start_time = end_time - i64::from(window_hours) * HOUR_MS;

        let entries: Vec<FundingEntry> = self
            .post_info(&json!({
                "type": "fundingHistory",
                "coin": coin,
                "startTime": start_time,
                "endTime": end_time,
            }))
            .await?;

        let mut samples = entries
            .iter()
            .map(|entry| {
                Ok(RateSample {
                    time_ms: entry.time,
                    rate: parse_decimal(coin, "fundingRate", &entry.funding_rate)?,
                })
            })
            .collect::<Result<Vec<_>, ExchangeError>>()?;

        samples.sort_by_key(|s| s.time_ms);
        Ok(samples)
    }
}
