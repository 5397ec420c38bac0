//! WebSocket Sink Server
//!
//! HTTP server that upgrades sink connections to WebSocket and speaks
//! the JSON sink protocol.
//!
//! # Endpoints
//!
//! - `GET /` - Returns a JSON status summary
//! - `GET /ws` - WebSocket upgrade for the sink protocol
//!
//! # Connection Lifecycle
//!
//! Each accepted socket registers one sink with the broadcaster. An
//! outbound pump drains the sink's channel onto the wire while the
//! socket loop dispatches inbound frames. A malformed or unsupported
//! frame tears down that one connection; the engine and the other
//! sinks are unaffected.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::messages::{ClientMessage, ProtocolError, ServerMessage};
use crate::application::services::SubscriptionService;
use crate::domain::subscription::SinkId;
use crate::infrastructure::metrics::record_protocol_error;

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the sink server.
pub struct WsServerState {
    version: String,
    started_at: Instant,
    service: Arc<SubscriptionService>,
}

impl WsServerState {
    /// Create new sink server state.
    #[must_use]
    pub fn new(version: String, service: Arc<SubscriptionService>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            service,
        }
    }
}

// =============================================================================
// Server
// =============================================================================

/// WebSocket server for sink connections.
pub struct WsServer {
    port: u16,
    state: Arc<WsServerState>,
    cancel: CancellationToken,
}

impl WsServer {
    /// Create a new sink server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<WsServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the sink server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `WsServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), WsServerError> {
        let app = Self::router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WsServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Sink server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| WsServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Sink server stopped");
        Ok(())
    }

    /// Build the router; separated out so tests can serve it directly.
    #[must_use]
    pub fn router(state: Arc<WsServerState>) -> Router {
        Router::new()
            .route("/", get(status_handler))
            .route("/ws", get(ws_handler))
            .with_state(state)
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

/// Status summary returned by `GET /`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Number of connected sinks.
    pub connected_sinks: usize,
    /// Number of symbols currently being streamed.
    pub active_streams: usize,
}

async fn status_handler(State(state): State<Arc<WsServerState>>) -> impl IntoResponse {
    Json(build_status_response(&state))
}

fn build_status_response(state: &WsServerState) -> StatusResponse {
    StatusResponse {
        service: "tick-stream-engine".to_string(),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        connected_sinks: state.service.broadcaster().sink_count(),
        active_streams: state.service.supervisor().stream_count(),
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

// =============================================================================
// Socket Loop
// =============================================================================

/// Handle one established sink connection until it ends.
async fn handle_socket(socket: WebSocket, state: Arc<WsServerState>) {
    let mut handle = state.service.connect();
    let sink_id = handle.id();

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Outbound pump: drain the sink's channel onto the wire. Message
    // order on the wire is exactly channel order.
    let pump = tokio::spawn(async move {
        while let Some(message) = handle.recv().await {
            let text = match message.encode() {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(sink_id = %sink_id, error = %e, "Failed to encode outbound message");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound dispatch until close, transport error, or protocol error
    while let Some(frame) = ws_rx.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(sink_id = %sink_id, error = %e, "WebSocket receive error");
                break;
            }
        };

        match frame {
            Message::Text(text) => match ClientMessage::decode(text.as_str()) {
                Ok(message) => dispatch_client_message(&state, sink_id, message),
                Err(e) => {
                    record_protocol_error();
                    tracing::warn!(sink_id = %sink_id, error = %e, "Protocol error, closing sink");
                    break;
                }
            },
            Message::Binary(_) => {
                let e = ProtocolError::UnsupportedFrame("binary".to_string());
                record_protocol_error();
                tracing::warn!(sink_id = %sink_id, error = %e, "Protocol error, closing sink");
                break;
            }
            Message::Close(_) => {
                tracing::debug!(sink_id = %sink_id, "Sink sent close frame");
                break;
            }
            // Transport pings are answered by the ws layer itself
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    // Teardown: drop registration first so broadcasts stop targeting
    // this sink, then stop the pump.
    state.service.disconnect(sink_id);
    pump.abort();
    tracing::info!(sink_id = %sink_id, "Sink connection closed");
}

/// Apply one decoded client message.
///
/// Replies ride the sink's own channel so they interleave with ticks
/// in a single ordered stream.
fn dispatch_client_message(state: &WsServerState, sink_id: SinkId, message: ClientMessage) {
    match message {
        ClientMessage::Subscribe { symbols } => {
            let resolved = state.service.subscribe(sink_id, &symbols);
            let ack = ServerMessage::Subscribed {
                symbols: resolved.iter().map(ToString::to_string).collect(),
            };
            let _ = state.service.broadcaster().send_to(sink_id, ack);
        }
        ClientMessage::Ping => {
            let _ = state.service.broadcaster().send_to(sink_id, ServerMessage::Pong);
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Sink server errors.
#[derive(Debug, thiserror::Error)]
pub enum WsServerError {
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
