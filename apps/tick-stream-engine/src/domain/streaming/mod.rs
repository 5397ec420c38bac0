//! Market Data Streaming Types
//!
//! Core domain types for market data: bars fetched from an upstream source
//! and the ticks derived from them. These types are codec-agnostic and
//! represent the canonical internal representation of market data.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::symbol::Symbol;

// =============================================================================
// Bar
// =============================================================================

/// One OHLCV observation as returned by a quote source.
///
/// The timestamp is the provider's own bar time, not the time the engine
/// observed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bar {
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Traded volume.
    pub volume: i64,
    /// Provider bar timestamp.
    pub timestamp: DateTime<Utc>,
}

impl Bar {
    /// Check basic OHLCV coherence: positive prices, the high/low range
    /// bounding open and close, and non-negative volume.
    ///
    /// A bar failing this check is treated as a transient upstream failure,
    /// never forwarded.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        let prices_positive = self.open > Decimal::ZERO
            && self.high > Decimal::ZERO
            && self.low > Decimal::ZERO
            && self.close > Decimal::ZERO;

        let range_ordered = self.low <= self.high
            && self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high;

        prices_positive && range_ordered && self.volume >= 0
    }
}

// =============================================================================
// Tick
// =============================================================================

/// One immutable price observation for a symbol at a point in time.
///
/// Produced by the stream supervisor from a fetched [`Bar`]; consumed by the
/// broadcaster; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    /// Canonical symbol the observation belongs to.
    pub symbol: Symbol,
    /// Last traded price (the bar's close).
    pub last_price: Decimal,
    /// Open price of the observed bar.
    pub open: Decimal,
    /// High price of the observed bar.
    pub high: Decimal,
    /// Low price of the observed bar.
    pub low: Decimal,
    /// Traded volume of the observed bar.
    pub volume: i64,
    /// When the engine observed the bar.
    pub observed_at: DateTime<Utc>,
}

impl Tick {
    /// Build a tick from a fetched bar, stamped with the current time.
    #[must_use]
    pub fn from_bar(symbol: Symbol, bar: &Bar) -> Self {
        Self {
            symbol,
            last_price: bar.close,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            volume: bar.volume,
            observed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::symbol::Venue;

    fn sample_bar() -> Bar {
        Bar {
            open: Decimal::from(22_050),
            high: Decimal::new(221_805, 1),
            low: Decimal::from(22_010),
            close: Decimal::from(22_100),
            volume: 250_000,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn tick_from_bar_uses_close_as_last_price() {
        let bar = sample_bar();
        let symbol = Symbol::new(Venue::Nse, "NIFTY");
        let tick = Tick::from_bar(symbol.clone(), &bar);

        assert_eq!(tick.symbol, symbol);
        assert_eq!(tick.last_price, bar.close);
        assert_eq!(tick.open, bar.open);
        assert_eq!(tick.high, bar.high);
        assert_eq!(tick.low, bar.low);
        assert_eq!(tick.volume, bar.volume);
    }

    #[test]
    fn well_formed_bar_passes() {
        assert!(sample_bar().is_well_formed());
    }

    #[test]
    fn inverted_range_is_malformed() {
        let bar = Bar {
            high: Decimal::from(22_000),
            low: Decimal::from(22_500),
            ..sample_bar()
        };
        assert!(!bar.is_well_formed());
    }

    #[test]
    fn close_outside_range_is_malformed() {
        let bar = Bar {
            close: Decimal::from(22_500),
            ..sample_bar()
        };
        assert!(!bar.is_well_formed());
    }

    #[test]
    fn non_positive_price_is_malformed() {
        let bar = Bar {
            low: Decimal::ZERO,
            ..sample_bar()
        };
        assert!(!bar.is_well_formed());
    }

    #[test]
    fn negative_volume_is_malformed() {
        let bar = Bar {
            volume: -1,
            ..sample_bar()
        };
        assert!(!bar.is_well_formed());
    }
}
