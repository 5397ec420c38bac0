//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`QuoteSource`]: Interface to the upstream market data provider

use std::sync::Arc;
use std::time::Duration;

use crate::domain::streaming::Bar;
use crate::domain::symbol::Venue;

// =============================================================================
// Quote Source Port
// =============================================================================

/// Blocking interface to the upstream quote provider.
///
/// Implementations perform a synchronous network round trip and may block
/// the calling thread for the full round-trip time. Callers in async
/// context must offload calls through [`tokio::task::spawn_blocking`];
/// this trait is the only blocking boundary in the engine.
pub trait QuoteSource: Send + Sync {
    /// Fetch the most recent bar for an instrument.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the upstream is unreachable, times out,
    /// or returns data that does not form a valid bar. All variants are
    /// transient from the caller's perspective.
    fn fetch_latest(&self, venue: Venue, ticker: &str) -> Result<Bar, FetchError>;

    /// Human-readable name of the provider, used in logs.
    fn name(&self) -> &str;
}

/// Shared handle to a quote source.
pub type SharedQuoteSource = Arc<dyn QuoteSource>;

/// Errors that can occur while fetching a quote.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Upstream provider is unreachable or rejected the request.
    #[error("quote source unavailable: {0}")]
    Unavailable(String),

    /// Upstream did not respond within the allotted time.
    #[error("quote fetch timed out after {0:?}")]
    Timeout(Duration),

    /// Upstream responded with data that does not form a valid bar.
    #[error("malformed bar for {symbol}: {reason}")]
    MalformedBar {
        /// Canonical symbol the fetch was for.
        symbol: String,
        /// Short description of what was wrong with the payload.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_display() {
        let err = FetchError::Unavailable("connection refused".to_string());
        assert_eq!(err.to_string(), "quote source unavailable: connection refused");

        let err = FetchError::MalformedBar {
            symbol: "NSE:NIFTY".to_string(),
            reason: "high below low".to_string(),
        };
        assert_eq!(err.to_string(), "malformed bar for NSE:NIFTY: high below low");
    }
}
