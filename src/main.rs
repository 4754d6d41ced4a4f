mod aggregation;
mod api;
mod cache;
mod clock;
mod config;
mod errors;
mod exchanges;
mod models;
mod query;
mod scheduler;

use aggregation::{AggregationEngine, AggregationPolicy};
use api::ApiServer;
use cache::{SnapshotFile, SnapshotStore};
use clock::{Clock, SystemClock};
use config::{Config, LogFormat};
use exchanges::hyperliquid::Hyperliquid;
use exchanges::MarketSource;
use query::QueryFacade;
use scheduler::{RefreshScheduler, SchedulerSettings};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!(
        "Funding radar starting — top {} coins over {}d, refresh every {}s on port {}",
        config.top_n,
        config.lookback_days,
        config.refresh_interval.as_secs(),
        config.api_port
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // ── 1. Exchange client, engine and cache ───────────────────────
    let source: Arc<dyn MarketSource> = Arc::new(Hyperliquid::from_config(&config, clock.clone())?);
    let engine = AggregationEngine::new(AggregationPolicy::from_config(&config));
    let store = SnapshotStore::new(clock.clone());

    let mut scheduler = RefreshScheduler::new(
        source,
        engine,
        store,
        clock,
        SchedulerSettings::from_config(&config),
    );
    if let Some(path) = &config.cache_path {
        scheduler = scheduler.with_snapshot_file(SnapshotFile::new(path));
    }
    let scheduler = Arc::new(scheduler);

    // ── 2. Serve the last run's snapshot until the first cycle lands ─
    scheduler.restore().await;

    // ── 3. Spawn the refresh timer (fires immediately) ─────────────
    tokio::spawn(Arc::clone(&scheduler).run());

    // ── 4. Serve the API until Ctrl+C ──────────────────────────────
    let server = ApiServer::new(QueryFacade::new(scheduler));
    tokio::select! {
        result = server.run(config.api_port) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down..."),
    }

    Ok(())
}
