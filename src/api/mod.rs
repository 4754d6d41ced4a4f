pub mod handlers;
pub mod models;
pub mod router;

use crate::query::QueryFacade;
use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use std::net::SocketAddr;

pub struct ApiServer {
    facade: QueryFacade,
}

impl ApiServer {
    pub fn new(facade: QueryFacade) -> Self {
        Self { facade }
    }

    /// Binds to the configured port and serves until the listener fails.
    /// Request metrics are exported on /metrics.
    pub async fn run(self, port: u16) -> anyhow::Result<()> {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        let app = router::build(self.facade)
            .route(
                "/metrics",
                get(move || std::future::ready(metric_handle.render())),
            )
            .layer(prometheus_layer);
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        tracing::info!("API server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
