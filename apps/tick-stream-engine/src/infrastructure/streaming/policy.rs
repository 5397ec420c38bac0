//! Polling Policy
//!
//! Pacing rules for the per-symbol poll loops: a fixed throttle interval
//! between successful fetches and exponential backoff with jitter after
//! failures. Backoff never gives up; the upstream is expected to recover
//! and a stream only ends when its last subscriber leaves.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::StreamingSettings;

/// Configuration for poll pacing and failure backoff.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Pause between consecutive successful fetches.
    pub throttle_interval: Duration,
    /// Initial delay after a failed fetch.
    pub backoff_initial: Duration,
    /// Maximum delay between retries.
    pub backoff_max: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each failure).
    pub backoff_multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            throttle_interval: Duration::from_millis(500),
            backoff_initial: Duration::from_secs(5),
            backoff_max: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl PollConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(
        throttle_interval: Duration,
        backoff_initial: Duration,
        backoff_max: Duration,
        backoff_multiplier: f64,
        jitter_factor: f64,
    ) -> Self {
        Self {
            throttle_interval,
            backoff_initial,
            backoff_max,
            backoff_multiplier,
            jitter_factor,
        }
    }

    /// Create configuration from `StreamingSettings`.
    #[must_use]
    pub const fn from_streaming_settings(settings: &StreamingSettings) -> Self {
        Self {
            throttle_interval: settings.throttle_interval,
            backoff_initial: settings.backoff_initial,
            backoff_max: settings.backoff_max,
            backoff_multiplier: settings.backoff_multiplier,
            jitter_factor: 0.1, // Default jitter
        }
    }
}

/// Backoff policy implementing exponential delay growth with jitter.
///
/// # Example
///
/// ```rust
/// use tick_stream_engine::infrastructure::streaming::policy::{BackoffPolicy, PollConfig};
///
/// let config = PollConfig::default();
/// let mut policy = BackoffPolicy::new(config);
///
/// // Get delay after first failure
/// let delay = policy.next_delay();
/// assert!(delay >= policy.config().throttle_interval);
///
/// // Simulate a successful fetch
/// policy.reset();
/// ```
#[derive(Debug)]
pub struct BackoffPolicy {
    config: PollConfig,
    current_delay: Duration,
    failure_count: u32,
}

impl BackoffPolicy {
    /// Create a new backoff policy.
    #[must_use]
    pub const fn new(config: PollConfig) -> Self {
        let backoff_initial = config.backoff_initial;
        Self {
            config,
            current_delay: backoff_initial,
            failure_count: 0,
        }
    }

    /// Access the underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Get the next delay duration, applying exponential backoff with jitter.
    ///
    /// Retries are unlimited; every call yields a delay.
    #[must_use]
    pub fn next_delay(&mut self) -> Duration {
        self.failure_count = self.failure_count.saturating_add(1);

        // Calculate delay with jitter
        let delay_with_jitter = self.apply_jitter(self.current_delay);

        // Calculate next delay (for subsequent calls)
        #[allow(clippy::cast_precision_loss)]
        let scaled =
            (self.current_delay.as_millis() as f64 * self.config.backoff_multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let max_millis = self.config.backoff_max.as_millis();
        let capped = next_millis.min(max_millis);
        let capped_u64 = u64::try_from(capped).unwrap_or(u64::MAX);
        self.current_delay = Duration::from_millis(capped_u64);

        delay_with_jitter
    }

    /// Reset the policy after a successful fetch.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.backoff_initial;
        self.failure_count = 0;
    }

    /// Get the number of consecutive failures.
    #[must_use]
    pub const fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Apply jitter to a duration. The jittered delay never drops below the
    /// throttle interval, keeping failed polls spaced wider than successful
    /// ones.
    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        #[allow(clippy::cast_precision_loss)]
        let floor_millis = (self.config.throttle_interval.as_millis() as f64).max(1.0);
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(floor_millis);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}
