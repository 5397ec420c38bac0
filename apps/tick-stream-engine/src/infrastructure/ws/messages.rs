//! Sink WebSocket Message Types
//!
//! Wire format types for the JSON protocol spoken with connected sinks.
//! Every frame is a single JSON object tagged by a `type` field; unknown
//! tags fail decoding and tear the offending connection down.
//!
//! # Message Types
//!
//! ## Inbound (sink to engine)
//! - `Subscribe`: Replace the sink's watched symbol set
//! - `Ping`: Application-level liveness probe
//!
//! ## Outbound (engine to sink)
//! - `Subscribed`: Acknowledgment carrying the resolved symbol list
//! - `Pong`: Reply to a ping
//! - `LiveTick`: One observed tick for a subscribed symbol
//! - `Heartbeat`: Periodic liveness signal to all sinks
//!
//! Prices are decimal strings to avoid float rounding on the wire;
//! timestamps are RFC 3339.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::streaming::Tick;

// =============================================================================
// Inbound Messages
// =============================================================================

/// Messages a sink may send to the engine.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "subscribe", "symbols": ["NIFTY", "NSE:BANKNIFTY"]}
/// {"type": "ping"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Replace the sink's subscription set with the given symbols.
    ///
    /// Symbols may be raw aliases or venue-qualified; the engine
    /// normalizes them and acknowledges with the resolved forms.
    Subscribe {
        /// Raw symbol names as typed by the client.
        symbols: Vec<String>,
    },

    /// Liveness probe; answered with a `pong`.
    Ping,
}

impl ClientMessage {
    /// Decode a text frame into a client message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] when the frame is not valid JSON or not
    /// one of the known message types.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

// =============================================================================
// Outbound Messages
// =============================================================================

/// Messages the engine sends to a sink.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "subscribed", "symbols": ["NSE:NIFTY", "NSE:BANKNIFTY"]}
/// {"type": "pong"}
/// {
///   "type": "live_tick",
///   "symbol": "NSE:NIFTY",
///   "last_price": "22120.50",
///   "open": "22050.00",
///   "high": "22180.50",
///   "low": "22010.00",
///   "volume": 250000,
///   "observed_at": "2024-01-15T09:30:00Z"
/// }
/// {"type": "heartbeat", "timestamp": "2024-01-15T09:30:00Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Acknowledges a subscribe with the resolved canonical symbols.
    Subscribed {
        /// Canonical `VENUE:TICKER` forms, in request order.
        symbols: Vec<String>,
    },

    /// Reply to a `ping`.
    Pong,

    /// One observed tick for a symbol the sink subscribed to.
    LiveTick {
        /// Canonical symbol the tick belongs to.
        symbol: String,
        /// Most recent traded price (the bar close).
        last_price: Decimal,
        /// Opening price of the bar.
        open: Decimal,
        /// Session high.
        high: Decimal,
        /// Session low.
        low: Decimal,
        /// Cumulative traded volume.
        volume: i64,
        /// When the engine observed this tick.
        observed_at: DateTime<Utc>,
    },

    /// Periodic liveness signal sent to every connected sink.
    Heartbeat {
        /// Time the heartbeat was emitted.
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage {
    /// Build a `live_tick` frame from a domain tick.
    #[must_use]
    pub fn live_tick(tick: &Tick) -> Self {
        Self::LiveTick {
            symbol: tick.symbol.to_string(),
            last_price: tick.last_price,
            open: tick.open,
            high: tick.high,
            low: tick.low,
            volume: tick.volume,
            observed_at: tick.observed_at,
        }
    }

    /// Encode this message as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if serialization fails.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Protocol errors; any of these tears the offending sink down.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Sink sent a frame kind the protocol does not use.
    #[error("unsupported frame: {0}")]
    UnsupportedFrame(String),
}

// =============================================================================
// Tests
// =============================================================================
