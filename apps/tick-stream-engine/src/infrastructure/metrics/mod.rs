//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ticks**: Counts of tick deliveries to subscribed sinks
//! - **Sinks**: Connected sink counts, dropped deliveries, protocol errors
//! - **Streams**: Active per-symbol poll task counts
//! - **Upstream**: Quote fetch durations and failures
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if called more than once or if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Tick counters
    describe_counter!(
        "tick_engine_ticks_broadcast_total",
        "Total tick deliveries to subscribed sinks"
    );

    // Sink counters
    describe_counter!(
        "tick_engine_sink_connections_total",
        "Total sink connections accepted"
    );
    describe_counter!(
        "tick_engine_deliveries_dropped_total",
        "Total messages dropped at a sink channel by reason"
    );
    describe_counter!(
        "tick_engine_protocol_errors_total",
        "Total malformed inbound frames from sinks"
    );

    // Upstream counters
    describe_counter!(
        "tick_engine_fetch_errors_total",
        "Total failed quote fetches by reason"
    );

    // Gauges
    describe_gauge!(
        "tick_engine_connected_sinks",
        "Number of currently connected sinks"
    );
    describe_gauge!(
        "tick_engine_active_streams",
        "Number of live per-symbol poll tasks"
    );

    // Latency histograms
    describe_histogram!(
        "tick_engine_fetch_duration_seconds",
        "Time for one blocking quote fetch"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record ticks delivered to subscribed sinks.
pub fn record_ticks_broadcast(delivered: usize) {
    counter!("tick_engine_ticks_broadcast_total").increment(delivered as u64);
}

/// Record a newly accepted sink connection.
pub fn record_sink_connected() {
    counter!("tick_engine_sink_connections_total").increment(1);
}

/// Record a message dropped at a sink channel.
pub fn record_delivery_dropped(reason: &str) {
    counter!(
        "tick_engine_deliveries_dropped_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record a malformed inbound frame from a sink.
pub fn record_protocol_error() {
    counter!("tick_engine_protocol_errors_total").increment(1);
}

/// Record a failed quote fetch.
pub fn record_fetch_error(reason: &str) {
    counter!(
        "tick_engine_fetch_errors_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Update the connected sink count.
pub fn set_connected_sinks(count: f64) {
    gauge!("tick_engine_connected_sinks").set(count);
}

/// Update the live poll task count.
pub fn set_active_streams(count: f64) {
    gauge!("tick_engine_active_streams").set(count);
}

/// Record the duration of one blocking quote fetch.
pub fn record_fetch_duration(duration: Duration) {
    histogram!("tick_engine_fetch_duration_seconds").record(duration.as_secs_f64());
}
