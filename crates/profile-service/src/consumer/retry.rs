use crate::config::ConsumerConfig;
use std::time::Duration;

/// Bounded exponential backoff for applying one fact.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total tries, the first one included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based).
    ///
    /// `initial * multiplier^(attempt - 1)`, capped at `max_backoff`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_backoff.as_secs_f64());

        Duration::try_from_secs_f64(capped).unwrap_or(self.max_backoff)
    }

    /// Whether another try is allowed after `attempt` failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl From<&ConsumerConfig> for RetryPolicy {
    fn from(config: &ConsumerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: config.initial_backoff,
            multiplier: config.backoff_multiplier,
            max_backoff: config.max_backoff,
        }
    }
}
