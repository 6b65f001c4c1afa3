//! HTTP surfaces
//!
//! - [`instance_router`] - the liveness endpoint of a monitored instance
//! - [`admin_router`] - Prometheus metrics and process liveness for the
//!   coordinator and worker processes

use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::metrics;

// ============================================================================
// Responses
// ============================================================================

/// Body of a monitored instance's `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceHealth {
    pub message: String,
}

impl InstanceHealth {
    pub fn healthy() -> Self {
        Self {
            message: "Healthy!".to_string(),
        }
    }
}

/// Body of the admin `GET /health/live`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

// ============================================================================
// Routers
// ============================================================================

/// Router served by every monitored instance
pub fn instance_router() -> Router {
    Router::new()
        .route("/health", get(instance_health_handler))
        .layer(TraceLayer::new_for_http())
}

async fn instance_health_handler() -> Json<InstanceHealth> {
    Json(InstanceHealth::healthy())
}

#[derive(Clone)]
struct AdminState {
    start_time: Instant,
}

/// Metrics and liveness router for coordinator and worker processes
pub fn admin_router() -> Router {
    let state = AdminState {
        start_time: Instant::now(),
    };

    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health/live", get(live_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn live_handler(State(state): State<AdminState>) -> Json<LiveResponse> {
    Json(LiveResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Serving
// ============================================================================

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },

    /// Server error
    #[error("Server error: {0}")]
    Serve(String),
}

/// Serve a router until `shutdown` resolves
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind {
            addr,
            reason: e.to_string(),
        })?;

    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))?;

    tracing::info!(%addr, "HTTP server stopped");
    Ok(())
}
