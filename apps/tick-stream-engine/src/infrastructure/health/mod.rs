//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, streaming status reporting, and Prometheus
//! metrics. Used by container orchestrators, load balancers, and monitoring
//! systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (checks stream coverage)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::broadcast::SharedBroadcaster;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::streaming::SharedStreamSupervisor;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Engine version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Stream task status.
    pub streams: StreamStatus,
    /// Connected sink status.
    pub sinks: SinkStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational.
    Healthy,
    /// Some systems degraded but functional.
    Degraded,
    /// Critical systems unavailable.
    Unhealthy,
}

/// Stream task statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StreamStatus {
    /// Symbols with at least one subscriber.
    pub subscribed_symbols: usize,
    /// Live per-symbol poll tasks.
    pub active_streams: usize,
}

/// Connected sink statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SinkStatus {
    /// Total connected sinks.
    pub connected: usize,
    /// Total sink-symbol subscription pairs.
    pub subscriptions: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    broadcaster: SharedBroadcaster,
    supervisor: SharedStreamSupervisor,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        broadcaster: SharedBroadcaster,
        supervisor: SharedStreamSupervisor,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            broadcaster,
            supervisor,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);

    // Ready unless subscribed symbols have no serving tasks at all
    let is_ready = response.status != HealthStatus::Unhealthy;

    if is_ready {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let broadcast_stats = state.broadcaster.stats();
    let active_streams = state.supervisor.stream_count();

    let status = determine_health_status(broadcast_stats.active_symbols, active_streams);

    HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        streams: StreamStatus {
            subscribed_symbols: broadcast_stats.active_symbols,
            active_streams,
        },
        sinks: SinkStatus {
            connected: broadcast_stats.connected_sinks,
            subscriptions: broadcast_stats.total_subscriptions,
        },
    }
}

/// Judge health from stream coverage of subscribed symbols.
///
/// Every subscribed symbol should be served by exactly one live poll task.
/// A mismatch in either direction is expected briefly while a subscription
/// change is being applied; subscribed symbols with no serving tasks at all
/// means the supervisor is serving no one.
fn determine_health_status(subscribed_symbols: usize, active_streams: usize) -> HealthStatus {
    if active_streams == subscribed_symbols {
        HealthStatus::Healthy
    } else if active_streams == 0 && subscribed_symbols > 0 {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Degraded
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn determine_status_idle_engine_is_healthy() {
        assert_eq!(determine_health_status(0, 0), HealthStatus::Healthy);
    }

    #[test]
    fn determine_status_full_coverage_is_healthy() {
        assert_eq!(determine_health_status(3, 3), HealthStatus::Healthy);
    }

    #[test]
    fn determine_status_partial_coverage_is_degraded() {
        assert_eq!(determine_health_status(3, 2), HealthStatus::Degraded);
    }

    #[test]
    fn determine_status_leaked_streams_are_degraded() {
        assert_eq!(determine_health_status(2, 3), HealthStatus::Degraded);
    }

    #[test]
    fn determine_status_no_coverage_is_unhealthy() {
        assert_eq!(determine_health_status(3, 0), HealthStatus::Unhealthy);
    }
}
