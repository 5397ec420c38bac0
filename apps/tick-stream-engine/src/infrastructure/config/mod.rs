//! Configuration Module
//!
//! Configuration loading and validation for the engine service.

mod settings;

pub use settings::{
    BroadcastSettings, ConfigError, EngineConfig, ServerSettings, StreamingSettings,
};
