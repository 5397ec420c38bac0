//! Simulated Quote Source
//!
//! In-process stand-in for the upstream market data vendor. Produces a
//! bounded random walk per instrument so the engine can run end to end
//! without vendor credentials or market hours.
//!
//! Steps are generated in paise (two decimal places) and applied in
//! decimal space, so simulated prices never pick up float artifacts.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;

use crate::application::ports::{FetchError, QuoteSource};
use crate::domain::streaming::Bar;
use crate::domain::symbol::{Symbol, Venue};

/// Base price for index-style instruments.
const INDEX_BASE: i64 = 22_150;
/// Base price for everything else.
const DEFAULT_BASE: i64 = 10_000;
/// Walks re-anchor here if a run of down-moves gets too close to zero.
const WALK_FLOOR: i64 = 1_000;

/// Quote source backed by a per-instrument random walk.
///
/// Each instrument's walk continues from its previous close, so repeated
/// fetches for a symbol produce a plausible drifting price series while
/// distinct symbols evolve independently.
pub struct SimulatedQuoteSource {
    walks: Mutex<HashMap<Symbol, Decimal>>,
}

impl Default for SimulatedQuoteSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedQuoteSource {
    /// Create a new simulated source with no walk history.
    #[must_use]
    pub fn new() -> Self {
        Self {
            walks: Mutex::new(HashMap::new()),
        }
    }

    fn base_price(ticker: &str) -> Decimal {
        if ticker.contains("NIFTY") {
            Decimal::from(INDEX_BASE)
        } else {
            Decimal::from(DEFAULT_BASE)
        }
    }

    fn next_bar(&self, symbol: &Symbol) -> Bar {
        let mut walks = self.walks.lock();
        let last_close = walks
            .entry(symbol.clone())
            .or_insert_with(|| Self::base_price(symbol.ticker()));

        let mut rng = rand::rng();
        let open = *last_close + Decimal::new(rng.random_range(-10_000..=10_000), 2);
        let close = open + Decimal::new(rng.random_range(-5_000..=5_000), 2);
        let high = open.max(close) + Decimal::new(rng.random_range(0..=3_000), 2);
        let low = open.min(close) - Decimal::new(rng.random_range(0..=3_000), 2);
        let volume = rng.random_range(100_000..=500_000);

        *last_close = close.max(Decimal::from(WALK_FLOOR));

        Bar {
            open,
            high,
            low,
            close,
            volume,
            timestamp: Utc::now(),
        }
    }
}

impl QuoteSource for SimulatedQuoteSource {
    fn fetch_latest(&self, venue: Venue, ticker: &str) -> Result<Bar, FetchError> {
        Ok(self.next_bar(&Symbol::new(venue, ticker)))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
