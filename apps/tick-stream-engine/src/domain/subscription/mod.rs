//! Subscription Tracking Types
//!
//! Domain types for tracking which sink is interested in which symbols.
//!
//! # Design
//!
//! The registry maintains two views of the same relation:
//! - per sink: the set of symbols that sink is subscribed to
//! - per symbol: the set of sinks interested in it
//!
//! The per-symbol set doubles as the subscriber reference count. Mutations
//! report which symbols gained their first subscriber or lost their last
//! one, so the caller can start and stop the matching upstream streams.
//! A sink's subscribe always replaces its previous set, never merges.
//!
//! The registry itself is a plain data structure with no interior locking;
//! the broadcaster owns it behind its own exclusion primitive.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::domain::symbol::Symbol;

// =============================================================================
// Sink Identity
// =============================================================================

/// Unique identifier for a connected sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(u64);

impl SinkId {
    /// Create a sink ID from its numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The numeric value of this ID.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink-{}", self.0)
    }
}

// =============================================================================
// Subscription Changes
// =============================================================================

/// Stream lifecycle changes implied by a registry mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    /// Symbols that gained their first subscriber and need a stream started.
    pub start: Vec<Symbol>,
    /// Symbols that lost their last subscriber and need their stream stopped.
    pub stop: Vec<Symbol>,
}

impl SubscriptionChanges {
    /// Check if there are any changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start.is_empty() && self.stop.is_empty()
    }
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Tracks sink subscriptions and per-symbol subscriber counts.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    /// Map from sink to its subscribed symbols.
    sink_symbols: HashMap<SinkId, HashSet<Symbol>>,
    /// Inverse index: map from symbol to the sinks interested in it.
    symbol_sinks: HashMap<Symbol, HashSet<SinkId>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink with an empty subscription set.
    pub fn register_sink(&mut self, sink: SinkId) {
        self.sink_symbols.entry(sink).or_default();
    }

    /// Replace a sink's subscription set.
    ///
    /// The new set fully replaces the previous one. Returns the symbols
    /// whose subscriber count went 0→1 (start their streams) and 1→0
    /// (stop their streams).
    pub fn replace(&mut self, sink: SinkId, symbols: HashSet<Symbol>) -> SubscriptionChanges {
        let previous = self
            .sink_symbols
            .insert(sink, symbols.clone())
            .unwrap_or_default();

        let mut changes = SubscriptionChanges::default();

        for symbol in symbols.difference(&previous) {
            let interested = self.symbol_sinks.entry(symbol.clone()).or_default();
            interested.insert(sink);
            if interested.len() == 1 {
                changes.start.push(symbol.clone());
            }
        }

        for symbol in previous.difference(&symbols) {
            if Self::drop_interest(&mut self.symbol_sinks, symbol, sink) {
                changes.stop.push(symbol.clone());
            }
        }

        changes
    }

    /// Remove a sink and its entire subscription set.
    ///
    /// Returns the symbols that thereby lost their last subscriber.
    pub fn remove_sink(&mut self, sink: SinkId) -> SubscriptionChanges {
        let Some(symbols) = self.sink_symbols.remove(&sink) else {
            return SubscriptionChanges::default();
        };

        let mut changes = SubscriptionChanges::default();

        for symbol in &symbols {
            if Self::drop_interest(&mut self.symbol_sinks, symbol, sink) {
                changes.stop.push(symbol.clone());
            }
        }

        changes
    }

    /// Remove one sink's interest in one symbol from the inverse index.
    ///
    /// Returns `true` when the symbol lost its last subscriber.
    fn drop_interest(
        symbol_sinks: &mut HashMap<Symbol, HashSet<SinkId>>,
        symbol: &Symbol,
        sink: SinkId,
    ) -> bool {
        let Some(interested) = symbol_sinks.get_mut(symbol) else {
            return false;
        };

        interested.remove(&sink);
        if interested.is_empty() {
            symbol_sinks.remove(symbol);
            return true;
        }

        false
    }

    /// Check whether a sink is currently registered.
    #[must_use]
    pub fn contains_sink(&self, sink: SinkId) -> bool {
        self.sink_symbols.contains_key(&sink)
    }

    /// Get the sinks interested in a symbol.
    #[must_use]
    pub fn subscribers_of(&self, symbol: &Symbol) -> Vec<SinkId> {
        self.symbol_sinks
            .get(symbol)
            .map(|sinks| sinks.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Get the number of sinks interested in a symbol.
    #[must_use]
    pub fn subscriber_count(&self, symbol: &Symbol) -> usize {
        self.symbol_sinks.get(symbol).map_or(0, HashSet::len)
    }

    /// Get the symbols a sink is subscribed to.
    #[must_use]
    pub fn symbols_of(&self, sink: SinkId) -> Vec<Symbol> {
        self.sink_symbols
            .get(&sink)
            .map(|symbols| symbols.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Get all symbols with at least one subscriber.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.symbol_sinks.keys().cloned().collect()
    }

    /// Get the number of registered sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sink_symbols.len()
    }

    /// Get the number of symbols with at least one subscriber.
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.symbol_sinks.len()
    }

    /// Get aggregate statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            sinks: self.sink_symbols.len(),
            symbols: self.symbol_sinks.len(),
            subscriptions: self.sink_symbols.values().map(HashSet::len).sum(),
        }
    }
}

/// Aggregate subscription statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Number of registered sinks.
    pub sinks: usize,
    /// Number of symbols with at least one subscriber.
    pub symbols: usize,
    /// Total sink-symbol subscription pairs.
    pub subscriptions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::symbol::Venue;

    fn sym(ticker: &str) -> Symbol {
        Symbol::new(Venue::Nse, ticker)
    }

    fn set(tickers: &[&str]) -> HashSet<Symbol> {
        tickers.iter().map(|t| sym(t)).collect()
    }

    #[test]
    fn new_registry_is_empty() {
        let registry = SubscriptionRegistry::new();
        let stats = registry.stats();
        assert_eq!(stats.sinks, 0);
        assert_eq!(stats.symbols, 0);
        assert_eq!(stats.subscriptions, 0);
    }

    #[test]
    fn registered_sink_starts_with_no_symbols() {
        let mut registry = SubscriptionRegistry::new();
        registry.register_sink(SinkId::new(1));

        assert!(registry.contains_sink(SinkId::new(1)));
        assert!(registry.symbols_of(SinkId::new(1)).is_empty());
        assert_eq!(registry.sink_count(), 1);
    }

    #[test]
    fn first_subscriber_starts_symbol() {
        let mut registry = SubscriptionRegistry::new();
        registry.register_sink(SinkId::new(1));

        let changes = registry.replace(SinkId::new(1), set(&["NIFTY"]));

        assert_eq!(changes.start, vec![sym("NIFTY")]);
        assert!(changes.stop.is_empty());
        assert_eq!(registry.subscriber_count(&sym("NIFTY")), 1);
    }

    #[test]
    fn second_subscriber_does_not_restart_symbol() {
        let mut registry = SubscriptionRegistry::new();
        registry.register_sink(SinkId::new(1));
        registry.register_sink(SinkId::new(2));

        let _ = registry.replace(SinkId::new(1), set(&["NIFTY"]));
        let changes = registry.replace(SinkId::new(2), set(&["NIFTY"]));

        assert!(changes.is_empty());
        assert_eq!(registry.subscriber_count(&sym("NIFTY")), 2);
    }

    #[test]
    fn replace_is_replacement_not_merge() {
        let mut registry = SubscriptionRegistry::new();
        registry.register_sink(SinkId::new(1));

        let _ = registry.replace(SinkId::new(1), set(&["A", "B"]));
        let mut changes = registry.replace(SinkId::new(1), set(&["B", "C"]));
        changes.start.sort_by_key(ToString::to_string);
        changes.stop.sort_by_key(ToString::to_string);

        assert_eq!(changes.start, vec![sym("C")]);
        assert_eq!(changes.stop, vec![sym("A")]);

        let mut symbols = registry.symbols_of(SinkId::new(1));
        symbols.sort_by_key(ToString::to_string);
        assert_eq!(symbols, vec![sym("B"), sym("C")]);
    }

    #[test]
    fn replace_with_identical_set_reports_no_changes() {
        let mut registry = SubscriptionRegistry::new();
        registry.register_sink(SinkId::new(1));

        let _ = registry.replace(SinkId::new(1), set(&["NIFTY", "BANKNIFTY"]));
        let changes = registry.replace(SinkId::new(1), set(&["NIFTY", "BANKNIFTY"]));

        assert!(changes.is_empty());
    }

    #[test]
    fn replace_with_empty_set_stops_everything() {
        let mut registry = SubscriptionRegistry::new();
        registry.register_sink(SinkId::new(1));

        let _ = registry.replace(SinkId::new(1), set(&["A", "B"]));
        let mut changes = registry.replace(SinkId::new(1), HashSet::new());
        changes.stop.sort_by_key(ToString::to_string);

        assert!(changes.start.is_empty());
        assert_eq!(changes.stop, vec![sym("A"), sym("B")]);
        assert_eq!(registry.symbol_count(), 0);
        assert!(registry.contains_sink(SinkId::new(1)));
    }

    #[test]
    fn shared_symbol_survives_one_sink_leaving() {
        let mut registry = SubscriptionRegistry::new();
        registry.register_sink(SinkId::new(1));
        registry.register_sink(SinkId::new(2));

        let _ = registry.replace(SinkId::new(1), set(&["NIFTY", "BANKNIFTY"]));
        let _ = registry.replace(SinkId::new(2), set(&["NIFTY"]));

        let changes = registry.remove_sink(SinkId::new(1));

        // BANKNIFTY was exclusive to sink 1; NIFTY still has sink 2.
        assert_eq!(changes.stop, vec![sym("BANKNIFTY")]);
        assert_eq!(registry.subscriber_count(&sym("NIFTY")), 1);
        assert!(!registry.contains_sink(SinkId::new(1)));
    }

    #[test]
    fn last_sink_leaving_stops_symbol() {
        let mut registry = SubscriptionRegistry::new();
        registry.register_sink(SinkId::new(1));

        let _ = registry.replace(SinkId::new(1), set(&["BANKNIFTY"]));
        let changes = registry.remove_sink(SinkId::new(1));

        assert_eq!(changes.stop, vec![sym("BANKNIFTY")]);
        assert_eq!(registry.symbol_count(), 0);
    }

    #[test]
    fn remove_unknown_sink_is_noop() {
        let mut registry = SubscriptionRegistry::new();
        let changes = registry.remove_sink(SinkId::new(42));
        assert!(changes.is_empty());
    }

    #[test]
    fn subscribers_of_returns_interested_sinks() {
        let mut registry = SubscriptionRegistry::new();
        registry.register_sink(SinkId::new(1));
        registry.register_sink(SinkId::new(2));
        registry.register_sink(SinkId::new(3));

        let _ = registry.replace(SinkId::new(1), set(&["NIFTY"]));
        let _ = registry.replace(SinkId::new(2), set(&["BANKNIFTY"]));
        let _ = registry.replace(SinkId::new(3), set(&["NIFTY"]));

        let mut subscribers = registry.subscribers_of(&sym("NIFTY"));
        subscribers.sort();
        assert_eq!(subscribers, vec![SinkId::new(1), SinkId::new(3)]);
        assert!(registry.subscribers_of(&sym("CNXFINANCE")).is_empty());
    }

    #[test]
    fn active_symbols_tracks_union_of_interest() {
        let mut registry = SubscriptionRegistry::new();
        registry.register_sink(SinkId::new(1));
        registry.register_sink(SinkId::new(2));

        let _ = registry.replace(SinkId::new(1), set(&["A", "B"]));
        let _ = registry.replace(SinkId::new(2), set(&["B", "C"]));

        let mut active = registry.active_symbols();
        active.sort_by_key(ToString::to_string);
        assert_eq!(active, vec![sym("A"), sym("B"), sym("C")]);
    }

    #[test]
    fn stats_count_sinks_symbols_and_pairs() {
        let mut registry = SubscriptionRegistry::new();
        registry.register_sink(SinkId::new(1));
        registry.register_sink(SinkId::new(2));

        let _ = registry.replace(SinkId::new(1), set(&["A", "B"]));
        let _ = registry.replace(SinkId::new(2), set(&["B"]));

        let stats = registry.stats();
        assert_eq!(stats.sinks, 2);
        assert_eq!(stats.symbols, 2);
        assert_eq!(stats.subscriptions, 3);
    }

    #[test]
    fn sink_id_display() {
        assert_eq!(SinkId::new(7).to_string(), "sink-7");
    }
}
