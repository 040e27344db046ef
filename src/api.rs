// Health and metrics endpoints for container probes and Prometheus scrapes.

use axum::{http::header, response::IntoResponse, routing::get, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::metrics;

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "clan-helper" }))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
}

/// Serve on an already bound listener until `cancel` fires.
pub async fn serve(listener: TcpListener, cancel: CancellationToken) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Health server listening");
    }
    axum::serve(listener, router())
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
}
