//! Stream Supervisor
//!
//! Owns one polling task per actively streamed symbol. Each task fetches
//! the latest bar from the upstream source, fans the resulting tick out
//! through the broadcaster, and paces itself with the poll policy.
//!
//! # Lifecycle
//!
//! Tasks are keyed by canonical symbol. Starting an already-streamed
//! symbol is a no-op; stopping cancels the task's token, which the loop
//! observes before the next fetch and during every sleep, so a stopped
//! task exits within one throttle interval. An in-flight blocking fetch
//! cannot be interrupted; its result is discarded instead.
//!
//! The upstream source is a blocking client, so every fetch runs on the
//! blocking thread pool via `spawn_blocking`.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::policy::{BackoffPolicy, PollConfig};
use crate::application::ports::SharedQuoteSource;
use crate::domain::streaming::Tick;
use crate::domain::subscription::SubscriptionChanges;
use crate::domain::symbol::Symbol;
use crate::infrastructure::broadcast::SharedBroadcaster;
use crate::infrastructure::metrics::{
    record_fetch_duration, record_fetch_error, record_ticks_broadcast, set_active_streams,
};

// =============================================================================
// Stream Task
// =============================================================================

/// A running per-symbol poll task.
struct StreamTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    started_at: Instant,
}

// =============================================================================
// Stream Supervisor
// =============================================================================

/// Supervises the per-symbol polling tasks.
///
/// All mutations take the task-table lock, so concurrent starts of the
/// same symbol collapse to a single task.
pub struct StreamSupervisor {
    source: SharedQuoteSource,
    broadcaster: SharedBroadcaster,
    config: PollConfig,
    shutdown: CancellationToken,
    tasks: Mutex<HashMap<Symbol, StreamTask>>,
}

impl StreamSupervisor {
    /// Create a new supervisor.
    ///
    /// Poll tasks receive child tokens of `shutdown`, so cancelling it
    /// stops every stream without touching the task table.
    #[must_use]
    pub fn new(
        source: SharedQuoteSource,
        broadcaster: SharedBroadcaster,
        config: PollConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            broadcaster,
            config,
            shutdown,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    // =========================================================================
    // Stream Lifecycle
    // =========================================================================

    /// Start polling a symbol.
    ///
    /// Returns `true` if a new task was spawned, `false` if the symbol
    /// was already being streamed.
    pub fn start_stream(&self, symbol: Symbol) -> bool {
        let mut tasks = self.tasks.lock();

        let started = match tasks.entry(symbol.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().handle.is_finished() {
                    // Stale entry left by an aborted runtime or panicked loop
                    entry.insert(self.spawn_poll_task(symbol.clone()));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(self.spawn_poll_task(symbol.clone()));
                true
            }
        };

        if started {
            #[allow(clippy::cast_precision_loss)]
            set_active_streams(tasks.len() as f64);
            tracing::info!(symbol = %symbol, "Stream started");
        } else {
            tracing::debug!(symbol = %symbol, "Stream already running");
        }

        started
    }

    /// Stop polling a symbol.
    ///
    /// Returns `true` if a running task was cancelled. The task exits
    /// within one throttle interval; an in-flight fetch is discarded.
    pub fn stop_stream(&self, symbol: &Symbol) -> bool {
        let mut tasks = self.tasks.lock();

        let Some(task) = tasks.remove(symbol) else {
            tracing::debug!(symbol = %symbol, "Stop requested for idle symbol");
            return false;
        };

        task.cancel.cancel();
        #[allow(clippy::cast_precision_loss)]
        set_active_streams(tasks.len() as f64);
        tracing::info!(
            symbol = %symbol,
            uptime_secs = task.started_at.elapsed().as_secs(),
            "Stream stopped"
        );

        true
    }

    /// Apply a batch of subscription changes to the running streams.
    pub fn apply_changes(&self, changes: &SubscriptionChanges) {
        for symbol in &changes.start {
            let _ = self.start_stream(symbol.clone());
        }
        for symbol in &changes.stop {
            let _ = self.stop_stream(symbol);
        }
    }

    /// Stop every stream and wait for the poll tasks to exit.
    pub async fn shutdown(&self) {
        let drained: Vec<(Symbol, StreamTask)> = {
            let mut tasks = self.tasks.lock();
            tasks.drain().collect()
        };

        for (_, task) in &drained {
            task.cancel.cancel();
        }
        for (symbol, task) in drained {
            if let Err(e) = task.handle.await {
                tracing::warn!(symbol = %symbol, error = %e, "Poll task ended abnormally");
            }
        }

        set_active_streams(0.0);
        tracing::info!("Stream supervisor shut down");
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Check whether a symbol is currently being streamed.
    #[must_use]
    pub fn is_streaming(&self, symbol: &Symbol) -> bool {
        self.tasks.lock().contains_key(symbol)
    }

    /// Get the number of running streams.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Get the symbols currently being streamed.
    #[must_use]
    pub fn active_streams(&self) -> Vec<Symbol> {
        self.tasks.lock().keys().cloned().collect()
    }

    // =========================================================================
    // Poll Loop
    // =========================================================================

    fn spawn_poll_task(&self, symbol: Symbol) -> StreamTask {
        let cancel = self.shutdown.child_token();
        let handle = tokio::spawn(Self::poll_loop(
            symbol,
            Arc::clone(&self.source),
            Arc::clone(&self.broadcaster),
            self.config.clone(),
            cancel.clone(),
        ));

        StreamTask {
            cancel,
            handle,
            started_at: Instant::now(),
        }
    }

    /// Poll one symbol until cancelled.
    ///
    /// Successful fetches are broadcast and followed by the throttle
    /// pause; failures are logged and followed by the backoff delay.
    /// Failures never end the loop.
    async fn poll_loop(
        symbol: Symbol,
        source: SharedQuoteSource,
        broadcaster: SharedBroadcaster,
        config: PollConfig,
        cancel: CancellationToken,
    ) {
        let mut backoff = BackoffPolicy::new(config.clone());
        tracing::debug!(symbol = %symbol, source = source.name(), "Poll loop running");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let fetch_source = Arc::clone(&source);
            let fetch_symbol = symbol.clone();
            let fetch = tokio::task::spawn_blocking(move || {
                fetch_source.fetch_latest(fetch_symbol.venue(), fetch_symbol.ticker())
            });

            let fetch_started = Instant::now();
            let result = tokio::select! {
                () = cancel.cancelled() => {
                    // The blocking call cannot be interrupted; its result
                    // is dropped when the detached task finishes.
                    break;
                }
                result = fetch => result,
            };
            record_fetch_duration(fetch_started.elapsed());

            let delay = match result {
                Ok(Ok(bar)) if bar.is_well_formed() => {
                    let tick = Tick::from_bar(symbol.clone(), &bar);
                    let delivered = broadcaster.broadcast_to_symbol(&tick);
                    record_ticks_broadcast(delivered);
                    tracing::trace!(symbol = %symbol, delivered, "Tick broadcast");
                    backoff.reset();
                    config.throttle_interval
                }
                Ok(Ok(_)) => {
                    record_fetch_error("malformed");
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        symbol = %symbol,
                        failures = backoff.failure_count(),
                        "Discarding malformed bar"
                    );
                    delay
                }
                Ok(Err(e)) => {
                    record_fetch_error("upstream");
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        symbol = %symbol,
                        error = %e,
                        failures = backoff.failure_count(),
                        delay_ms = delay.as_millis(),
                        "Fetch failed, backing off"
                    );
                    delay
                }
                Err(e) => {
                    record_fetch_error("join");
                    let delay = backoff.next_delay();
                    tracing::error!(symbol = %symbol, error = %e, "Fetch task failed, backing off");
                    delay
                }
            };

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        tracing::debug!(symbol = %symbol, "Poll loop stopped");
    }
}

/// Shared supervisor reference.
pub type SharedStreamSupervisor = Arc<StreamSupervisor>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::{FetchError, QuoteSource};
    use crate::domain::streaming::Bar;
    use crate::domain::symbol::Venue;
    use crate::infrastructure::broadcast::Broadcaster;
    use crate::infrastructure::ws::messages::ServerMessage;

    fn well_formed_bar() -> Bar {
        Bar {
            open: Decimal::from(22_050),
            high: Decimal::from(22_180),
            low: Decimal::from(22_010),
            close: Decimal::from(22_100),
            volume: 250_000,
            timestamp: Utc::now(),
        }
    }

    struct CountingSource {
        fetches: AtomicUsize,
        result: fn() -> Result<Bar, FetchError>,
    }

    impl CountingSource {
        fn healthy() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                result: || Ok(well_formed_bar()),
            }
        }

        fn failing() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                result: || Err(FetchError::Unavailable("connection refused".to_string())),
            }
        }

        fn malformed() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                result: || {
                    Ok(Bar {
                        high: Decimal::from(10),
                        low: Decimal::from(20),
                        ..well_formed_bar()
                    })
                },
            }
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl QuoteSource for CountingSource {
        fn fetch_latest(&self, _venue: Venue, _ticker: &str) -> Result<Bar, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn fast_config() -> PollConfig {
        PollConfig {
            throttle_interval: Duration::from_millis(20),
            backoff_initial: Duration::from_millis(200),
            backoff_max: Duration::from_millis(400),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    fn make_supervisor(
        source: Arc<CountingSource>,
        config: PollConfig,
    ) -> (StreamSupervisor, SharedBroadcaster) {
        let broadcaster = Arc::new(Broadcaster::with_defaults());
        let supervisor = StreamSupervisor::new(
            source,
            Arc::clone(&broadcaster),
            config,
            CancellationToken::new(),
        );
        (supervisor, broadcaster)
    }

    fn nifty() -> Symbol {
        Symbol::new(Venue::Nse, "NIFTY")
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let source = Arc::new(CountingSource::healthy());
        let (supervisor, _broadcaster) = make_supervisor(Arc::clone(&source), fast_config());

        assert!(supervisor.start_stream(nifty()));
        assert!(!supervisor.start_stream(nifty()));
        assert!(!supervisor.start_stream(nifty()));
        assert_eq!(supervisor.stream_count(), 1);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn ticks_flow_to_subscribed_sink() {
        let source = Arc::new(CountingSource::healthy());
        let (supervisor, broadcaster) = make_supervisor(Arc::clone(&source), fast_config());

        let mut sink = broadcaster.connect();
        let _ = broadcaster.replace_subscriptions(sink.id(), [nifty()].into_iter().collect());

        assert!(supervisor.start_stream(nifty()));

        let received = tokio::time::timeout(Duration::from_secs(1), sink.recv())
            .await
            .expect("timeout waiting for tick")
            .expect("sink channel closed");

        let ServerMessage::LiveTick {
            symbol, last_price, ..
        } = received
        else {
            panic!("expected live_tick, got {received:?}");
        };
        assert_eq!(symbol, "NSE:NIFTY");
        assert_eq!(last_price, Decimal::from(22_100));

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn stop_halts_polling_within_one_interval() {
        let source = Arc::new(CountingSource::healthy());
        let (supervisor, _broadcaster) = make_supervisor(Arc::clone(&source), fast_config());

        assert!(supervisor.start_stream(nifty()));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(supervisor.stop_stream(&nifty()));
        assert!(!supervisor.is_streaming(&nifty()));

        // Allow one in-flight fetch to drain, then the count must hold still
        tokio::time::sleep(Duration::from_millis(60)).await;
        let settled = source.fetch_count();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(source.fetch_count(), settled, "polling continued after stop");
    }

    #[tokio::test]
    async fn stop_of_idle_symbol_is_a_noop() {
        let source = Arc::new(CountingSource::healthy());
        let (supervisor, _broadcaster) = make_supervisor(source, fast_config());

        assert!(!supervisor.stop_stream(&nifty()));
    }

    #[tokio::test]
    async fn failures_are_spaced_by_backoff_not_throttle() {
        let failing = Arc::new(CountingSource::failing());
        let (supervisor, _b) = make_supervisor(Arc::clone(&failing), fast_config());

        assert!(supervisor.start_stream(nifty()));
        tokio::time::sleep(Duration::from_millis(300)).await;
        supervisor.shutdown().await;

        // With a 200ms initial backoff only the first retry fits in the
        // window; a healthy loop at the 20ms throttle would fetch dozens
        // of times.
        let failed_fetches = failing.fetch_count();
        assert!(
            (1..=3).contains(&failed_fetches),
            "expected backoff spacing, saw {failed_fetches} fetches"
        );
    }

    #[tokio::test]
    async fn healthy_polling_follows_throttle() {
        let source = Arc::new(CountingSource::healthy());
        let (supervisor, _b) = make_supervisor(Arc::clone(&source), fast_config());

        assert!(supervisor.start_stream(nifty()));
        tokio::time::sleep(Duration::from_millis(300)).await;
        supervisor.shutdown().await;

        assert!(
            source.fetch_count() >= 4,
            "expected repeated throttled fetches, saw {}",
            source.fetch_count()
        );
    }

    #[tokio::test]
    async fn malformed_bars_are_not_broadcast() {
        let source = Arc::new(CountingSource::malformed());
        let (supervisor, broadcaster) = make_supervisor(Arc::clone(&source), fast_config());

        let mut sink = broadcaster.connect();
        let _ = broadcaster.replace_subscriptions(sink.id(), [nifty()].into_iter().collect());

        assert!(supervisor.start_stream(nifty()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        supervisor.shutdown().await;

        assert!(source.fetch_count() >= 1, "source was never polled");
        let nothing = tokio::time::timeout(Duration::from_millis(50), sink.recv()).await;
        assert!(nothing.is_err(), "malformed bar reached a sink");
    }

    #[tokio::test]
    async fn apply_changes_starts_and_stops_streams() {
        let source = Arc::new(CountingSource::healthy());
        let (supervisor, _b) = make_supervisor(source, fast_config());

        supervisor.apply_changes(&SubscriptionChanges {
            start: vec![nifty(), Symbol::new(Venue::Nse, "BANKNIFTY")],
            stop: vec![],
        });
        assert_eq!(supervisor.stream_count(), 2);

        supervisor.apply_changes(&SubscriptionChanges {
            start: vec![],
            stop: vec![nifty()],
        });
        assert_eq!(supervisor.stream_count(), 1);
        assert!(supervisor.is_streaming(&Symbol::new(Venue::Nse, "BANKNIFTY")));

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_every_stream() {
        let source = Arc::new(CountingSource::healthy());
        let (supervisor, _b) = make_supervisor(Arc::clone(&source), fast_config());

        assert!(supervisor.start_stream(nifty()));
        assert!(supervisor.start_stream(Symbol::new(Venue::Nse, "BANKNIFTY")));

        supervisor.shutdown().await;
        assert_eq!(supervisor.stream_count(), 0);

        let settled = source.fetch_count();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.fetch_count(), settled, "polling continued after shutdown");
    }

    #[tokio::test]
    async fn root_token_cancels_all_streams() {
        let source = Arc::new(CountingSource::healthy());
        let broadcaster = Arc::new(Broadcaster::with_defaults());
        let root = CancellationToken::new();
        let supervisor = StreamSupervisor::new(
            Arc::clone(&source) as SharedQuoteSource,
            broadcaster,
            fast_config(),
            root.clone(),
        );

        assert!(supervisor.start_stream(nifty()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        root.cancel();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let settled = source.fetch_count();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(source.fetch_count(), settled, "polling survived root cancellation");
    }
}
