//! Broadcast Fan-Out
//!
//! Implements symbol-filtered message distribution to connected sinks.
//!
//! # Architecture
//!
//! The `Broadcaster` owns the subscription registry and one bounded
//! mpsc channel per sink. A tick for a symbol is delivered only to the
//! sinks subscribed to that symbol; acknowledgments and heartbeats ride
//! the same per-sink channel, so each sink observes its messages in
//! send order.
//!
//! Delivery uses `try_send` so one slow or dead sink can never stall
//! the poll loops or the other sinks. A full or closed channel drops
//! that one message for that one sink and the fan-out moves on.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use super::ws::messages::ServerMessage;
use crate::domain::streaming::Tick;
use crate::domain::subscription::{SinkId, SubscriptionChanges, SubscriptionRegistry};
use crate::domain::symbol::Symbol;
use crate::infrastructure::config::BroadcastSettings;
use crate::infrastructure::metrics::{
    record_delivery_dropped, record_sink_connected, set_connected_sinks,
};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for broadcast delivery.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Capacity of each sink's outbound message buffer.
    pub sink_buffer_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            sink_buffer_capacity: 256,
        }
    }
}

impl From<BroadcastSettings> for BroadcastConfig {
    fn from(settings: BroadcastSettings) -> Self {
        Self {
            sink_buffer_capacity: settings.sink_buffer_capacity,
        }
    }
}

// =============================================================================
// Sink Handle
// =============================================================================

/// Receiving half of a sink's connection to the broadcaster.
///
/// Handed out by [`Broadcaster::connect`]; the transport layer drains it
/// and writes each message to the wire. Dropping the handle closes the
/// channel, after which deliveries to this sink are silently discarded
/// until [`Broadcaster::disconnect`] removes the registration.
#[derive(Debug)]
pub struct SinkHandle {
    id: SinkId,
    rx: mpsc::Receiver<ServerMessage>,
}

impl SinkHandle {
    /// The ID assigned to this sink.
    #[must_use]
    pub const fn id(&self) -> SinkId {
        self.id
    }

    /// Receive the next outbound message for this sink.
    ///
    /// Returns `None` once the sink has been disconnected and the
    /// buffer is drained.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.rx.recv().await
    }
}

// =============================================================================
// Broadcaster
// =============================================================================

/// Central fan-out point for all outbound sink traffic.
///
/// Owns the subscription registry; every mutation of sink membership or
/// subscriptions goes through here so registration and routing can never
/// disagree.
///
/// # Example
///
/// ```rust
/// use tick_stream_engine::infrastructure::broadcast::{BroadcastConfig, Broadcaster};
///
/// let broadcaster = Broadcaster::new(BroadcastConfig::default());
///
/// // Register a sink and hand its receiver to the transport
/// let handle = broadcaster.connect();
///
/// // In the poll loops, fan ticks out:
/// // broadcaster.broadcast_to_symbol(&tick);
/// # let _ = handle;
/// ```
#[derive(Debug)]
pub struct Broadcaster {
    config: BroadcastConfig,
    next_sink_id: AtomicU64,
    state: RwLock<BroadcasterState>,
}

#[derive(Debug, Default)]
struct BroadcasterState {
    senders: HashMap<SinkId, mpsc::Sender<ServerMessage>>,
    subscriptions: SubscriptionRegistry,
}

impl Broadcaster {
    /// Create a new broadcaster with the given configuration.
    #[must_use]
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            config,
            next_sink_id: AtomicU64::new(1),
            state: RwLock::new(BroadcasterState::default()),
        }
    }

    /// Create a new broadcaster with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BroadcastConfig::default())
    }

    // =========================================================================
    // Sink Lifecycle
    // =========================================================================

    /// Register a new sink and return its receiving handle.
    #[must_use]
    pub fn connect(&self) -> SinkHandle {
        let id = SinkId::new(self.next_sink_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.config.sink_buffer_capacity);

        let connected = {
            let mut state = self.state.write();
            state.senders.insert(id, tx);
            state.subscriptions.register_sink(id);
            state.senders.len()
        };

        record_sink_connected();
        #[allow(clippy::cast_precision_loss)]
        set_connected_sinks(connected as f64);
        tracing::info!(sink_id = %id, connected, "Sink connected");

        SinkHandle { id, rx }
    }

    /// Remove a sink, dropping its channel and subscriptions in one step.
    ///
    /// Returns the symbols that lost their last subscriber; the caller is
    /// responsible for stopping those streams.
    pub fn disconnect(&self, sink: SinkId) -> SubscriptionChanges {
        let (changes, connected) = {
            let mut state = self.state.write();
            state.senders.remove(&sink);
            let changes = state.subscriptions.remove_sink(sink);
            (changes, state.senders.len())
        };

        #[allow(clippy::cast_precision_loss)]
        set_connected_sinks(connected as f64);
        tracing::info!(sink_id = %sink, connected, "Sink disconnected");

        changes
    }

    /// Replace a sink's subscription set.
    ///
    /// Returns the implied stream starts and stops. A sink that has
    /// already disconnected yields no changes.
    pub fn replace_subscriptions(
        &self,
        sink: SinkId,
        symbols: HashSet<Symbol>,
    ) -> SubscriptionChanges {
        let mut state = self.state.write();
        if !state.senders.contains_key(&sink) {
            return SubscriptionChanges::default();
        }
        state.subscriptions.replace(sink, symbols)
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Send a message to one sink.
    ///
    /// Returns `false` when the sink is unknown or its buffer rejected
    /// the message; the failure is logged and otherwise ignored.
    pub fn send_to(&self, sink: SinkId, message: ServerMessage) -> bool {
        let Some(sender) = self.state.read().senders.get(&sink).cloned() else {
            tracing::debug!(sink_id = %sink, "Send to unknown sink ignored");
            return false;
        };

        Self::deliver(sink, &sender, message)
    }

    /// Fan a tick out to every sink subscribed to its symbol.
    ///
    /// Returns the number of sinks the tick was delivered to. Failed
    /// deliveries are dropped per sink and never affect the others.
    pub fn broadcast_to_symbol(&self, tick: &Tick) -> usize {
        let targets: Vec<(SinkId, mpsc::Sender<ServerMessage>)> = {
            let state = self.state.read();
            state
                .subscriptions
                .subscribers_of(&tick.symbol)
                .into_iter()
                .filter_map(|id| state.senders.get(&id).map(|tx| (id, tx.clone())))
                .collect()
        };

        let message = ServerMessage::live_tick(tick);
        let mut delivered = 0;
        for (id, sender) in targets {
            if Self::deliver(id, &sender, message.clone()) {
                delivered += 1;
            }
        }

        delivered
    }

    /// Send a message to every connected sink regardless of subscriptions.
    pub fn broadcast(&self, message: ServerMessage) -> usize {
        let targets: Vec<(SinkId, mpsc::Sender<ServerMessage>)> = {
            let state = self.state.read();
            state
                .senders
                .iter()
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (id, sender) in targets {
            if Self::deliver(id, &sender, message.clone()) {
                delivered += 1;
            }
        }

        delivered
    }

    /// Attempt one non-blocking delivery, swallowing failures.
    fn deliver(sink: SinkId, sender: &mpsc::Sender<ServerMessage>, message: ServerMessage) -> bool {
        match sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                record_delivery_dropped("buffer_full");
                tracing::debug!(sink_id = %sink, "Sink buffer full, message dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                record_delivery_dropped("closed");
                tracing::debug!(sink_id = %sink, "Sink channel closed, message dropped");
                false
            }
        }
    }

    // =========================================================================
    // Heartbeat
    // =========================================================================

    /// Periodically send a heartbeat frame to every connected sink.
    ///
    /// Runs until cancelled.
    pub async fn run_heartbeat(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Heartbeat loop cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let sent = self.broadcast(ServerMessage::Heartbeat {
                        timestamp: Utc::now(),
                    });
                    tracing::trace!(sinks = sent, "Heartbeat sent");
                }
            }
        }
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Get the number of connected sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.state.read().senders.len()
    }

    /// Get the symbols that currently have at least one subscriber.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.state.read().subscriptions.active_symbols()
    }

    /// Get statistics about sinks and subscriptions.
    #[must_use]
    pub fn stats(&self) -> BroadcastStats {
        let state = self.state.read();
        let subs = state.subscriptions.stats();
        BroadcastStats {
            connected_sinks: state.senders.len(),
            active_symbols: subs.symbols,
            total_subscriptions: subs.subscriptions,
        }
    }
}

/// Shared broadcaster reference.
pub type SharedBroadcaster = Arc<Broadcaster>;

/// Statistics about the broadcast layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastStats {
    /// Number of connected sinks.
    pub connected_sinks: usize,
    /// Number of symbols with at least one subscriber.
    pub active_symbols: usize,
    /// Total sink-symbol subscription pairs.
    pub total_subscriptions: usize,
}

// =============================================================================
// Tests
// =============================================================================
