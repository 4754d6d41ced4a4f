use super::handlers;
use crate::query::QueryFacade;
use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the API router with all routes and shared state.
pub fn build(facade: QueryFacade) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/hyperliquid/top-coins", get(handlers::get_top_coins))
        .route("/api/hyperliquid/status", get(handlers::get_status))
        .with_state(facade)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
