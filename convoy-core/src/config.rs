//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration for agent invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts per task before it is marked failed.
    /// Per-task `max_retries` overrides this when set.
    pub max_retries: u32,
    /// Initial backoff duration between attempts
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    pub backoff_multiplier: f32,
}

impl RetryConfig {
    /// Backoff to apply before the given retry attempt (1-based).
    ///
    /// Exponential growth from `initial_backoff`, capped at `max_backoff`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30);
        let factor = self.backoff_multiplier.max(1.0).powi(exponent as i32);
        let backoff = self.initial_backoff.mul_f32(factor);
        backoff.min(self.max_backoff)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

/// Master configuration struct for the orchestration core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvoyConfig {
    // Protocol settings
    /// How long a pending handshake stays valid
    pub handshake_ttl: Duration,
    /// Total serialized message size cap in bytes
    pub max_message_size_bytes: usize,
    /// Serialized payload size cap in bytes
    pub max_payload_size_bytes: usize,

    // Execution settings
    pub retry: RetryConfig,
}

impl Default for ConvoyConfig {
    fn default() -> Self {
        Self {
            handshake_ttl: Duration::from_secs(5),
            max_message_size_bytes: 1_000_000,
            max_payload_size_bytes: 900_000,
            retry: RetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let config = ConvoyConfig::default();
        assert_eq!(config.handshake_ttl, Duration::from_secs(5));
        assert_eq!(config.max_message_size_bytes, 1_000_000);
        assert_eq!(config.max_payload_size_bytes, 900_000);
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff_for_attempt(1), Duration::from_millis(100));
        assert_eq!(retry.backoff_for_attempt(2), Duration::from_millis(200));
        assert_eq!(retry.backoff_for_attempt(3), Duration::from_millis(400));
        // Far past the cap
        assert_eq!(retry.backoff_for_attempt(30), Duration::from_secs(10));
    }
}
