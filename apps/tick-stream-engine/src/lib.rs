#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Tick Stream Engine - Live Price Fan-out
//!
//! A WebSocket service that polls an upstream quote source once per
//! subscribed symbol and multiplexes live ticks to multiple downstream
//! sinks, each with its own dynamic subscription set.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core streaming logic and data types
//!   - `symbol`: Canonical instrument identity and normalization
//!   - `streaming`: Market data types (bars, ticks)
//!   - `subscription`: Sink subscription tracking and reference counting
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Interface for the upstream quote source
//!   - `services`: Subscription management
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `source`: Simulated quote source adapter
//!   - `streaming`: Per-symbol stream supervision and poll pacing
//!   - `broadcast`: Per-sink channels and subscription-indexed fan-out
//!   - `ws`: WebSocket sink server and wire messages
//!   - `config`: Configuration loading and validation
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! Poll task (NIFTY) ──┐
//!                     │    ┌─────────────┐     ┌───────────────┐
//! Poll task (SENSEX) ─┼───►│ Broadcaster │────►│   WebSocket   │──► Sink 1
//!                     │    │  (fan-out)  │     │    Server     │──► Sink 2
//! Poll task (GOLD) ───┘    └─────────────┘     └───────────────┘──► Sink N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::streaming::{Bar, Tick};
pub use domain::subscription::{
    SinkId, SubscriptionChanges, SubscriptionRegistry, SubscriptionStats,
};
pub use domain::symbol::{Symbol, SymbolNormalizer, Venue};

// Application ports and services
pub use application::ports::{FetchError, QuoteSource, SharedQuoteSource};
pub use application::services::SubscriptionService;

// Infrastructure config
pub use infrastructure::config::{
    BroadcastSettings, ConfigError, EngineConfig, ServerSettings, StreamingSettings,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Broadcaster (for integration tests)
pub use infrastructure::broadcast::{
    BroadcastConfig, BroadcastStats, Broadcaster, SharedBroadcaster, SinkHandle,
};

// Stream supervision (for integration tests)
pub use infrastructure::streaming::{
    BackoffPolicy, PollConfig, SharedStreamSupervisor, StreamSupervisor,
};

// WebSocket server and wire messages (for integration tests)
pub use infrastructure::ws::{
    ClientMessage, ProtocolError, ServerMessage, WsServer, WsServerError, WsServerState,
};

// Simulated source
pub use infrastructure::source::SimulatedQuoteSource;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
