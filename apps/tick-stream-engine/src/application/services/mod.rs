//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `SubscriptionService`: Manages sink subscriptions and stream routing

use std::collections::HashSet;

use crate::domain::subscription::SinkId;
use crate::domain::symbol::{Symbol, SymbolNormalizer};
use crate::infrastructure::broadcast::{SharedBroadcaster, SinkHandle};
use crate::infrastructure::streaming::SharedStreamSupervisor;

// =============================================================================
// Subscription Service
// =============================================================================

/// Coordinates sink subscriptions with upstream stream lifecycle.
///
/// Every inbound subscribe and every disconnect flows through here: raw
/// symbol names are normalized, the broadcaster's registry is updated,
/// and the implied stream starts and stops are applied to the
/// supervisor. The resolved symbol list is returned so the transport
/// can acknowledge with canonical names.
pub struct SubscriptionService {
    normalizer: SymbolNormalizer,
    broadcaster: SharedBroadcaster,
    supervisor: SharedStreamSupervisor,
}

impl SubscriptionService {
    /// Create a new subscription service.
    #[must_use]
    pub const fn new(
        normalizer: SymbolNormalizer,
        broadcaster: SharedBroadcaster,
        supervisor: SharedStreamSupervisor,
    ) -> Self {
        Self {
            normalizer,
            broadcaster,
            supervisor,
        }
    }

    /// Register a new sink and return its receiving handle.
    #[must_use]
    pub fn connect(&self) -> SinkHandle {
        self.broadcaster.connect()
    }

    /// Replace a sink's subscriptions with the given raw symbol names.
    ///
    /// Names are normalized to canonical form and deduplicated keeping
    /// first-seen order; the returned list is the acknowledgment payload.
    /// Streams for newly wanted symbols are started and streams whose
    /// last subscriber left are stopped.
    pub fn subscribe(&self, sink: SinkId, raw_symbols: &[String]) -> Vec<Symbol> {
        let mut resolved = Vec::with_capacity(raw_symbols.len());
        let mut seen = HashSet::new();
        for raw in raw_symbols {
            let symbol = self.normalizer.normalize(raw);
            if seen.insert(symbol.clone()) {
                resolved.push(symbol);
            }
        }

        let changes = self.broadcaster.replace_subscriptions(sink, seen);
        self.supervisor.apply_changes(&changes);

        tracing::debug!(
            sink_id = %sink,
            requested = raw_symbols.len(),
            resolved = resolved.len(),
            started = changes.start.len(),
            stopped = changes.stop.len(),
            "Subscriptions replaced"
        );

        resolved
    }

    /// Remove a sink and stop any streams it was the last subscriber of.
    pub fn disconnect(&self, sink: SinkId) {
        let changes = self.broadcaster.disconnect(sink);
        self.supervisor.apply_changes(&changes);
    }

    /// Access the broadcaster for direct sink delivery.
    #[must_use]
    pub const fn broadcaster(&self) -> &SharedBroadcaster {
        &self.broadcaster
    }

    /// Access the stream supervisor for introspection.
    #[must_use]
    pub const fn supervisor(&self) -> &SharedStreamSupervisor {
        &self.supervisor
    }
}

// =============================================================================
// Tests
// =============================================================================
