//! Streaming Infrastructure
//!
//! Per-symbol poll loops and the supervisor that owns them.
//!
//! - `policy`: throttle and failure-backoff pacing rules
//! - `supervisor`: poll task lifecycle keyed by canonical symbol

pub mod policy;
pub mod supervisor;

pub use policy::{BackoffPolicy, PollConfig};
pub use supervisor::{SharedStreamSupervisor, StreamSupervisor};
