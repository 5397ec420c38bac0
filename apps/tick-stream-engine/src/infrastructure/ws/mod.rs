//! WebSocket Sink Transport
//!
//! Serves the JSON sink protocol over WebSocket.
//!
//! - `messages`: wire format types for both directions
//! - `server`: axum server handling upgrades and per-sink socket loops

pub mod messages;
pub mod server;

pub use messages::{ClientMessage, ProtocolError, ServerMessage};
pub use server::{WsServer, WsServerError, WsServerState};
