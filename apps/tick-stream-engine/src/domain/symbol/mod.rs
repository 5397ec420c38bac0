//! Canonical Symbol Types
//!
//! Instrument identity for the engine: a canonical (venue, ticker) pair
//! plus the normalizer that maps raw user-supplied names onto it.
//!
//! # Design
//!
//! Every symbol used internally passes through [`SymbolNormalizer::normalize`]
//! exactly once at the subscription boundary. Equality and hashing are always
//! on the canonical pair, never on the raw string a client sent.

use std::fmt;

// =============================================================================
// Venue
// =============================================================================

/// Trading venue an instrument is listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Venue {
    /// National Stock Exchange of India.
    #[default]
    Nse,
    /// Bombay Stock Exchange.
    Bse,
    /// Multi Commodity Exchange.
    Mcx,
}

impl Venue {
    /// Parse a venue name, case-insensitively.
    ///
    /// Returns `None` for names outside the known-venue set.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "NSE" => Some(Self::Nse),
            "BSE" => Some(Self::Bse),
            "MCX" => Some(Self::Mcx),
            _ => None,
        }
    }

    /// Parse a venue name, falling back to the default venue.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        Self::parse(s).unwrap_or_default()
    }

    /// Get the venue name as used in canonical symbols.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Nse => "NSE",
            Self::Bse => "BSE",
            Self::Mcx => "MCX",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Symbol
// =============================================================================

/// Canonical instrument identifier: a (venue, ticker) pair.
///
/// Displays as `VENUE:TICKER`, e.g. `NSE:NIFTY`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    venue: Venue,
    ticker: String,
}

impl Symbol {
    /// Create a symbol from a venue and ticker.
    ///
    /// The ticker is trimmed and uppercased.
    #[must_use]
    pub fn new(venue: Venue, ticker: impl Into<String>) -> Self {
        Self {
            venue,
            ticker: ticker.into().trim().to_uppercase(),
        }
    }

    /// The venue this instrument is listed on.
    #[must_use]
    pub const fn venue(&self) -> Venue {
        self.venue
    }

    /// The canonical ticker.
    #[must_use]
    pub fn ticker(&self) -> &str {
        &self.ticker
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.venue, self.ticker)
    }
}

// =============================================================================
// Normalizer
// =============================================================================

/// Maps raw user-supplied instrument names to canonical symbols.
///
/// Normalization is total: any input yields a symbol. Unknown tickers pass
/// through unchanged on the home venue.
///
/// # Example
///
/// ```rust
/// use tick_stream_engine::domain::symbol::{SymbolNormalizer, Venue};
///
/// let normalizer = SymbolNormalizer::new(Venue::Nse);
/// let symbol = normalizer.normalize("finnifty");
/// assert_eq!(symbol.to_string(), "NSE:CNXFINANCE");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SymbolNormalizer {
    home_venue: Venue,
}

impl Default for SymbolNormalizer {
    fn default() -> Self {
        Self::new(Venue::Nse)
    }
}

impl SymbolNormalizer {
    /// Create a normalizer defaulting to the given home venue.
    #[must_use]
    pub const fn new(home_venue: Venue) -> Self {
        Self { home_venue }
    }

    /// The venue assumed when a raw name carries no venue prefix.
    #[must_use]
    pub const fn home_venue(&self) -> Venue {
        self.home_venue
    }

    /// Normalize a raw instrument name into a canonical symbol.
    ///
    /// Uppercases and trims, strips a leading `VENUE:` prefix when the prefix
    /// names a known venue (an unrecognized prefix falls back to the home
    /// venue), and resolves common index aliases for non-prefixed names.
    #[must_use]
    pub fn normalize(&self, raw: &str) -> Symbol {
        let trimmed = raw.trim().to_uppercase();

        if let Some((prefix, rest)) = trimmed.split_once(':') {
            let venue = Venue::parse(prefix).unwrap_or(self.home_venue);
            return Symbol::new(venue, rest);
        }

        Symbol::new(self.home_venue, Self::resolve_alias(&trimmed))
    }

    /// Resolve well-known index aliases to their underlying tickers.
    fn resolve_alias(ticker: &str) -> &str {
        match ticker {
            "FINNIFTY" => "CNXFINANCE",
            "INDIA VIX" => "INDIAVIX",
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    #[test]
    fn venue_parsing() {
        assert_eq!(Venue::parse("NSE"), Some(Venue::Nse));
        assert_eq!(Venue::parse("nse"), Some(Venue::Nse));
        assert_eq!(Venue::parse("Bse"), Some(Venue::Bse));
        assert_eq!(Venue::parse("MCX"), Some(Venue::Mcx));
        assert_eq!(Venue::parse("NYSE"), None);
        assert_eq!(Venue::parse(""), None);
    }

    #[test]
    fn venue_fallback_parsing() {
        assert_eq!(Venue::from_str_case_insensitive("bse"), Venue::Bse);
        assert_eq!(Venue::from_str_case_insensitive("unknown"), Venue::Nse);
    }

    #[test]
    fn symbol_display_is_canonical() {
        let symbol = Symbol::new(Venue::Nse, "nifty");
        assert_eq!(symbol.to_string(), "NSE:NIFTY");
        assert_eq!(symbol.ticker(), "NIFTY");
        assert_eq!(symbol.venue(), Venue::Nse);
    }

    #[test]
    fn symbol_equality_on_canonical_pair() {
        let a = Symbol::new(Venue::Nse, "NIFTY");
        let b = Symbol::new(Venue::Nse, " nifty ");
        let c = Symbol::new(Venue::Bse, "NIFTY");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test_case("NIFTY", "NSE:NIFTY"; "bare ticker gets home venue")]
    #[test_case("nifty", "NSE:NIFTY"; "lowercase is uppercased")]
    #[test_case("  BANKNIFTY ", "NSE:BANKNIFTY"; "surrounding whitespace is trimmed")]
    #[test_case("FINNIFTY", "NSE:CNXFINANCE"; "index alias resolves to underlying")]
    #[test_case("india vix", "NSE:INDIAVIX"; "spaced alias resolves")]
    #[test_case("NSE:NIFTY", "NSE:NIFTY"; "explicit home venue prefix")]
    #[test_case("bse:sensex", "BSE:SENSEX"; "explicit other venue prefix")]
    #[test_case("MCX:CRUDEOIL", "MCX:CRUDEOIL"; "commodity venue prefix")]
    #[test_case("NSE:FINNIFTY", "NSE:FINNIFTY"; "prefixed names skip the alias table")]
    #[test_case("XYZ:FOO", "NSE:FOO"; "unknown venue prefix falls back to home")]
    #[test_case("RELIANCE", "NSE:RELIANCE"; "unknown ticker passes through")]
    fn normalize_cases(raw: &str, expected: &str) {
        let normalizer = SymbolNormalizer::new(Venue::Nse);
        assert_eq!(normalizer.normalize(raw).to_string(), expected);
    }

    #[test]
    fn normalize_respects_configured_home_venue() {
        let normalizer = SymbolNormalizer::new(Venue::Bse);
        assert_eq!(normalizer.normalize("SENSEX").to_string(), "BSE:SENSEX");
        assert_eq!(normalizer.normalize("NSE:NIFTY").to_string(), "NSE:NIFTY");
    }

    proptest! {
        #[test]
        fn normalize_is_total(raw in ".*") {
            let normalizer = SymbolNormalizer::default();
            let symbol = normalizer.normalize(&raw);
            prop_assert_eq!(symbol.ticker(), symbol.ticker().to_uppercase());
        }

        #[test]
        fn normalize_is_stable_on_canonical_form(raw in "[A-Za-z:, ]{0,24}") {
            let normalizer = SymbolNormalizer::default();
            let first = normalizer.normalize(&raw);
            let second = normalizer.normalize(&first.to_string());
            prop_assert_eq!(first, second);
        }
    }
}
