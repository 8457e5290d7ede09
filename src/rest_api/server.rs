//! Axum HTTP server for the metrics APIs

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{http::StatusCode, routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::metrics;
use crate::provider::MetricsProvider;

use super::custom_metrics;
use super::external_metrics;

/// Health endpoint handler
async fn health() -> &'static str {
    "ok"
}

/// Metrics endpoint handler
async fn metrics_handler() -> std::result::Result<String, StatusCode> {
    metrics::encode_registry().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Routes of the adapter, bound to `provider`
pub fn router(provider: Arc<MetricsProvider>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route(
            "/apis/custom.metrics.k8s.io/v1beta1",
            get(custom_metrics::list_resources),
        )
        .route(
            "/apis/custom.metrics.k8s.io/v1beta1/namespaces/:namespace/metrics/:metric",
            get(custom_metrics::get_namespace_metric),
        )
        .route(
            "/apis/custom.metrics.k8s.io/v1beta1/namespaces/:namespace/:resource/:name/:metric",
            get(custom_metrics::get_namespaced_metric),
        )
        .route(
            "/apis/custom.metrics.k8s.io/v1beta1/:resource/:name/:metric",
            get(custom_metrics::get_root_metric),
        )
        .route(
            "/apis/external.metrics.k8s.io/v1beta1",
            get(external_metrics::list_resources),
        )
        .route(
            "/apis/external.metrics.k8s.io/v1beta1/namespaces/:namespace/:metric",
            get(external_metrics::get_external_metric),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(provider)
}

/// Run the REST API server on `addr`
pub async fn run_server(provider: Arc<MetricsProvider>, addr: SocketAddr) -> Result<()> {
    let app = router(provider);

    info!("REST API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::ConfigError(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::InternalError(format!("Server error: {}", e)))?;

    Ok(())
}
