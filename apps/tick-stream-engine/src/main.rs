//! Tick Stream Engine Binary
//!
//! Starts the live tick streaming engine.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin tick-stream-engine
//! ```
//!
//! # Environment Variables
//!
//! All variables are optional; the engine runs with defaults.
//!
//! - `TICK_ENGINE_HOME_VENUE`: NSE | BSE | MCX (default: NSE)
//! - `TICK_ENGINE_WS_PORT`: WebSocket sink server port (default: 8000)
//! - `TICK_ENGINE_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `TICK_ENGINE_HEARTBEAT_INTERVAL_SECS`: Heartbeat broadcast interval (default: 20)
//! - `TICK_ENGINE_THROTTLE_INTERVAL_MS`: Pause between successful polls (default: 500)
//! - `TICK_ENGINE_BACKOFF_INITIAL_SECS`: First retry delay after a failed poll (default: 5)
//! - `TICK_ENGINE_BACKOFF_MAX_SECS`: Retry delay cap (default: 60)
//! - `TICK_ENGINE_BACKOFF_MULTIPLIER`: Retry delay growth factor (default: 2.0)
//! - `TICK_ENGINE_SINK_BUFFER_CAPACITY`: Per-sink channel capacity (default: 256)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: tick-stream-engine)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use tick_stream_engine::infrastructure::broadcast::{BroadcastConfig, Broadcaster};
use tick_stream_engine::infrastructure::source::SimulatedQuoteSource;
use tick_stream_engine::infrastructure::streaming::{PollConfig, StreamSupervisor};
use tick_stream_engine::infrastructure::telemetry;
use tick_stream_engine::infrastructure::ws::WsServerState;
use tick_stream_engine::{
    EngineConfig, HealthServer, HealthServerState, SubscriptionService, SymbolNormalizer, WsServer,
    init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Tick Stream Engine");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = EngineConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Initialize the quote source and the broadcaster
    let source = Arc::new(SimulatedQuoteSource::new());
    let broadcast_config = BroadcastConfig::from(config.broadcast.clone());
    let broadcaster = Arc::new(Broadcaster::new(broadcast_config));

    // Initialize the stream supervisor
    let poll_config = PollConfig::from_streaming_settings(&config.streaming);
    let supervisor = Arc::new(StreamSupervisor::new(
        source,
        Arc::clone(&broadcaster),
        poll_config,
        shutdown_token.clone(),
    ));

    // Initialize the subscription service
    let normalizer = SymbolNormalizer::new(config.home_venue);
    let service = Arc::new(SubscriptionService::new(
        normalizer,
        Arc::clone(&broadcaster),
        Arc::clone(&supervisor),
    ));

    // Initialize the WebSocket sink server
    let ws_state = Arc::new(WsServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&service),
    ));
    let ws_server = WsServer::new(config.server.ws_port, ws_state, shutdown_token.clone());

    // Initialize the health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&broadcaster),
        Arc::clone(&supervisor),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    // Spawn the heartbeat broadcast loop
    let heartbeat_broadcaster = Arc::clone(&broadcaster);
    let heartbeat_interval = config.server.heartbeat_interval;
    let heartbeat_cancel = shutdown_token.clone();
    tokio::spawn(async move {
        heartbeat_broadcaster
            .run_heartbeat(heartbeat_interval, heartbeat_cancel)
            .await;
    });

    // Spawn the WebSocket sink server
    tokio::spawn(async move {
        if let Err(e) = ws_server.run().await {
            tracing::error!(error = %e, "Sink server error");
        }
    });

    // Spawn the health server
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Tick engine ready");

    await_shutdown(shutdown_token).await;

    // Drain the per-symbol poll tasks before exiting
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, supervisor.shutdown())
        .await
        .is_err()
    {
        tracing::warn!("Stream tasks did not drain within the shutdown timeout");
    }

    tracing::info!("Tick engine stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &EngineConfig) {
    tracing::info!(
        home_venue = config.home_venue.as_str(),
        ws_port = config.server.ws_port,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        throttle = ?config.streaming.throttle_interval,
        backoff_initial = ?config.streaming.backoff_initial,
        backoff_max = ?config.streaming.backoff_max,
        sink_buffer_capacity = config.broadcast.sink_buffer_capacity,
        heartbeat = ?config.server.heartbeat_interval,
        "Streaming settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
