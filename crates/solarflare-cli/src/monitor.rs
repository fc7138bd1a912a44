use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use serde_json::json;
use solarflare_core::CollectionMetrics;
use solarflare_db::FlareRepository;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared state for the monitoring endpoints.
pub struct MonitorState {
    pub metrics: CollectionMetrics,
    pub flares: FlareRepository,
}

pub fn router(state: Arc<MonitorState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind the monitoring address.
pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics address {addr}"))
}

/// Serve the monitoring endpoints until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: Arc<MonitorState>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(state).layer(TraceLayer::new_for_http());
    tracing::info!(addr = %listener.local_addr()?, "Serving /metrics and /health");
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    Ok(())
}

async fn metrics(State(state): State<Arc<MonitorState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.metrics.render(),
    )
}

async fn health(State(state): State<Arc<MonitorState>>) -> impl IntoResponse {
    let database = match state.flares.health_check().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            "error"
        }
    };

    let (status, label) = if database == "ok" {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status,
        axum::Json(json!({ "status": label, "database": database })),
    )
}
