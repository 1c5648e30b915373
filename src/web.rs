//! Axum-based HTTP server exposing the metrics
//!
//! `/metrics` always serves the current values. `/` serves the same body and,
//! in on-request mode, runs an acquisition cycle first.

use crate::config::AcquisitionMode;
use crate::error::{PowermeterError, Result};
use crate::exporter::Exporter;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Content type of the Prometheus text exposition format
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Clone)]
pub struct AppState {
    pub exporter: Arc<Exporter>,
    pub mode: AcquisitionMode,
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    exposition(&state)
}

pub async fn root(State(state): State<AppState>) -> Response {
    if state.mode == AcquisitionMode::OnRequest {
        // A failed cycle still serves the last known values
        if let Err(e) = state.exporter.run_cycle().await {
            debug!("Serving stale values after failed cycle: {}", e);
        }
    }
    exposition(&state)
}

fn exposition(state: &AppState) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        state.exporter.metrics().render(),
    )
        .into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/metrics", get(metrics))
        .route("/api/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until `shutdown` resolves
pub async fn serve<F>(state: AppState, host: &str, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let ip: IpAddr = host
        .parse()
        .map_err(|e| PowermeterError::web(format!("Invalid bind address {}: {}", host, e)))?;
    let addr = SocketAddr::new(ip, port);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| PowermeterError::web(format!("Failed to bind {}: {}", addr, e)))?;
    info!("Serving metrics on http://{}/metrics", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| PowermeterError::web(e.to_string()))
}
