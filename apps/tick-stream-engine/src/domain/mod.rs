//! Domain Layer - Core streaming types and business logic.
//!
//! This layer contains the core domain types for live tick streaming.
//! Types here carry no I/O or transport concerns; the wire format for
//! sink-facing messages lives in the infrastructure layer.

/// Canonical instrument identity and normalization.
pub mod symbol;

/// Market data streaming types (bars, ticks).
pub mod streaming;

/// Subscription tracking and reference counting.
pub mod subscription;
