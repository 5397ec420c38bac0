//! Engine Configuration Settings
//!
//! Configuration types for the tick engine, loaded from environment variables.

use std::time::Duration;

use crate::domain::symbol::Venue;

/// Poll pacing settings for the per-symbol stream loops.
#[derive(Debug, Clone)]
pub struct StreamingSettings {
    /// Pause between consecutive successful fetches.
    pub throttle_interval: Duration,
    /// Initial delay after a failed fetch.
    pub backoff_initial: Duration,
    /// Maximum delay between retries.
    pub backoff_max: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            throttle_interval: Duration::from_millis(500),
            backoff_initial: Duration::from_secs(5),
            backoff_max: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

/// Broadcast channel settings.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    /// Capacity of each sink's outbound message channel.
    pub sink_buffer_capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            sink_buffer_capacity: 256,
        }
    }
}

/// Server port and heartbeat settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// WebSocket sink server port.
    pub ws_port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
    /// Interval between server heartbeat broadcasts.
    pub heartbeat_interval: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ws_port: 8000,
            health_port: 8082,
            heartbeat_interval: Duration::from_secs(20),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Venue assumed for symbols subscribed without a venue prefix.
    pub home_venue: Venue,
    /// Server port and heartbeat settings.
    pub server: ServerSettings,
    /// Poll pacing settings.
    pub streaming: StreamingSettings,
    /// Broadcast channel settings.
    pub broadcast: BroadcastSettings,
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults. Values the
    /// engine cannot run with are rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that fails
    /// [`EngineConfig::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let home_venue = std::env::var("TICK_ENGINE_HOME_VENUE")
            .map(|s| Venue::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let server = ServerSettings {
            ws_port: parse_env_u16("TICK_ENGINE_WS_PORT", ServerSettings::default().ws_port),
            health_port: parse_env_u16(
                "TICK_ENGINE_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
            heartbeat_interval: parse_env_duration_secs(
                "TICK_ENGINE_HEARTBEAT_INTERVAL_SECS",
                ServerSettings::default().heartbeat_interval,
            ),
        };

        let streaming = StreamingSettings {
            throttle_interval: parse_env_duration_millis(
                "TICK_ENGINE_THROTTLE_INTERVAL_MS",
                StreamingSettings::default().throttle_interval,
            ),
            backoff_initial: parse_env_duration_secs(
                "TICK_ENGINE_BACKOFF_INITIAL_SECS",
                StreamingSettings::default().backoff_initial,
            ),
            backoff_max: parse_env_duration_secs(
                "TICK_ENGINE_BACKOFF_MAX_SECS",
                StreamingSettings::default().backoff_max,
            ),
            backoff_multiplier: parse_env_f64(
                "TICK_ENGINE_BACKOFF_MULTIPLIER",
                StreamingSettings::default().backoff_multiplier,
            ),
        };

        let broadcast = BroadcastSettings {
            sink_buffer_capacity: parse_env_usize(
                "TICK_ENGINE_SINK_BUFFER_CAPACITY",
                BroadcastSettings::default().sink_buffer_capacity,
            ),
        };

        let config = Self {
            home_venue,
            server,
            streaming,
            broadcast,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    ///
    /// Intervals and channel capacities must be positive, and the backoff
    /// delay must stay above the throttle interval so failure retries are
    /// always spaced wider than successful polls.
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending environment variable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.streaming.throttle_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                var: "TICK_ENGINE_THROTTLE_INTERVAL_MS",
                reason: "throttle interval must be non-zero".to_string(),
            });
        }

        if self.streaming.backoff_initial <= self.streaming.throttle_interval {
            return Err(ConfigError::InvalidValue {
                var: "TICK_ENGINE_BACKOFF_INITIAL_SECS",
                reason: format!(
                    "backoff delay {:?} must exceed the throttle interval {:?}",
                    self.streaming.backoff_initial, self.streaming.throttle_interval
                ),
            });
        }

        if self.streaming.backoff_max < self.streaming.backoff_initial {
            return Err(ConfigError::InvalidValue {
                var: "TICK_ENGINE_BACKOFF_MAX_SECS",
                reason: format!(
                    "backoff cap {:?} is below the initial delay {:?}",
                    self.streaming.backoff_max, self.streaming.backoff_initial
                ),
            });
        }

        if self.streaming.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                var: "TICK_ENGINE_BACKOFF_MULTIPLIER",
                reason: "backoff multiplier must be at least 1.0".to_string(),
            });
        }

        if self.broadcast.sink_buffer_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                var: "TICK_ENGINE_SINK_BUFFER_CAPACITY",
                reason: "sink buffer capacity must be non-zero".to_string(),
            });
        }

        if self.server.heartbeat_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                var: "TICK_ENGINE_HEARTBEAT_INTERVAL_SECS",
                reason: "heartbeat interval must be non-zero".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable is set to a value the engine cannot run with.
    #[error("invalid value for {var}: {reason}")]
    InvalidValue {
        /// The variable holding the rejected value.
        var: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_settings_defaults() {
        let settings = StreamingSettings::default();
        assert_eq!(settings.throttle_interval, Duration::from_millis(500));
        assert_eq!(settings.backoff_initial, Duration::from_secs(5));
        assert_eq!(settings.backoff_max, Duration::from_secs(60));
        assert!((settings.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn broadcast_settings_defaults() {
        let settings = BroadcastSettings::default();
        assert_eq!(settings.sink_buffer_capacity, 256);
    }

    #[test]
    fn server_settings_defaults() {
        let settings = ServerSettings::default();
        assert_eq!(settings.ws_port, 8000);
        assert_eq!(settings.health_port, 8082);
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(20));
    }

    #[test]
    fn default_config_passes_validation() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.home_venue, Venue::Nse);
    }

    #[test]
    fn validation_rejects_zero_throttle() {
        let mut config = EngineConfig::default();
        config.streaming.throttle_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_backoff_below_throttle() {
        let mut config = EngineConfig::default();
        config.streaming.throttle_interval = Duration::from_secs(10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_shrinking_multiplier() {
        let mut config = EngineConfig::default();
        config.streaming.backoff_multiplier = 0.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("TICK_ENGINE_BACKOFF_MULTIPLIER"));
    }

    #[test]
    fn validation_rejects_zero_sink_buffer() {
        let mut config = EngineConfig::default();
        config.broadcast.sink_buffer_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_zero_heartbeat() {
        let mut config = EngineConfig::default();
        config.server.heartbeat_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
