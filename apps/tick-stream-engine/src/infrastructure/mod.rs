//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Per-sink broadcast channels and subscription-indexed fan-out.
pub mod broadcast;

/// Configuration loading and validation.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Simulated quote source adapter.
pub mod source;

/// Per-symbol stream supervision and poll pacing.
pub mod streaming;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// WebSocket sink server and wire messages.
pub mod ws;
