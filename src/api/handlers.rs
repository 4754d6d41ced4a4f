use super::models::{CoinEntry, StatusResponse, TopCoinsParams, TopCoinsResponse};
use crate::query::QueryFacade;
use crate::scheduler::SchedulerStatus;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};

/// GET /health — simple liveness check
pub async fn health() -> &'static str {
    "OK"
}

/// GET /api/hyperliquid/top-coins — ranked coins by annualized funding.
/// `?force_refresh=true` waits for a fresh cycle before answering.
pub async fn get_top_coins(
    State(facade): State<QueryFacade>,
    Query(params): Query<TopCoinsParams>,
) -> (StatusCode, Json<TopCoinsResponse>) {
    match facade.get_top_coins(params.force_refresh).await {
        Ok(top) => {
            let snapshot = &top.snapshot;
            let body = TopCoinsResponse {
                success: true,
                coins: snapshot.entries.iter().map(CoinEntry::from).collect(),
                last_updated: snapshot.generated_at,
                next_update: snapshot.next_refresh_at,
                age_secs: Some(top.age.as_secs()),
                error: None,
            };
            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            let now = chrono::Utc::now();
            let body = TopCoinsResponse {
                success: false,
                coins: Vec::new(),
                last_updated: now,
                next_update: now,
                age_secs: None,
                error: Some(e.to_string()),
            };
            (StatusCode::SERVICE_UNAVAILABLE, Json(body))
        }
    }
}

/// GET /api/hyperliquid/status — refresher state and cache age
pub async fn get_status(State(facade): State<QueryFacade>) -> Json<StatusResponse> {
    let status = facade.refresh_status().await;
    let (state, last_error) = match status.status {
        SchedulerStatus::Idle => ("idle", None),
        SchedulerStatus::Refreshing => ("refreshing", None),
        SchedulerStatus::Failed(e) => ("failed", Some(e.to_string())),
    };

    Json(StatusResponse {
        state,
        next_refresh_at: status.next_refresh_at,
        snapshot_age_secs: status.snapshot_age.map(|age| age.as_secs()),
        last_error,
    })
}
