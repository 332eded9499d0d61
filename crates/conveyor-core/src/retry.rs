//! Retry decisions for failed jobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConveyorError;

/// Decides whether and when a failed job runs again.
pub trait RetryPolicy: Send + Sync {
    /// `attempts` counts the attempt that just failed.
    fn should_retry(&self, attempts: u32, max_tries: u32, error: &ConveyorError) -> bool;

    /// Delay before the next attempt.
    fn delay(&self, attempts: u32) -> Duration;
}

/// Bounded backoff retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Backoff strategy.
    #[serde(default)]
    pub backoff: BackoffStrategy,

    /// Delay unit in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff in seconds.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Error kinds to retry on (empty = all errors).
    #[serde(default)]
    pub retry_on: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffStrategy::Exponential,
            base_delay_ms: default_base_delay_ms(),
            max_backoff_secs: default_max_backoff_secs(),
            retry_on: Vec::new(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_backoff_secs() -> u64 {
    300
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    /// Calculate backoff duration for a given attempt.
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay();
        let backoff = match self.backoff {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Linear => base.saturating_mul(attempt.max(1)),
            BackoffStrategy::Exponential => {
                let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
        };
        backoff.min(self.max_backoff())
    }

    fn retries_on(&self, error: &ConveyorError) -> bool {
        self.retry_on.is_empty() || self.retry_on.iter().any(|kind| kind == error.kind())
    }
}

impl RetryPolicy for RetryConfig {
    fn should_retry(&self, attempts: u32, max_tries: u32, error: &ConveyorError) -> bool {
        attempts < max_tries && self.retries_on(error)
    }

    fn delay(&self, attempts: u32) -> Duration {
        self.calculate_backoff(attempts)
    }
}

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay each time.
    Fixed,
    /// Delay increases linearly.
    Linear,
    /// Delay doubles each time.
    #[default]
    Exponential,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let config = RetryConfig::default();
        assert_eq!(config.delay(1), Duration::from_secs(1));
        assert_eq!(config.delay(2), Duration::from_secs(2));
        assert_eq!(config.delay(3), Duration::from_secs(4));
        assert_eq!(config.delay(4), Duration::from_secs(8));
    }

    #[test]
    fn test_max_backoff_cap() {
        let config = RetryConfig {
            max_backoff_secs: 10,
            ..Default::default()
        };
        assert_eq!(config.delay(10), Duration::from_secs(10));
        assert_eq!(config.delay(200), Duration::from_secs(10));
    }

    #[test]
    fn test_linear_and_fixed() {
        let linear = RetryConfig {
            backoff: BackoffStrategy::Linear,
            base_delay_ms: 500,
            ..Default::default()
        };
        assert_eq!(linear.delay(3), Duration::from_millis(1500));

        let fixed = RetryConfig {
            backoff: BackoffStrategy::Fixed,
            ..Default::default()
        };
        assert_eq!(fixed.delay(7), Duration::from_secs(1));
    }

    #[test]
    fn test_should_retry_until_budget_spent() {
        let config = RetryConfig::default();
        let error = ConveyorError::handler("flaky");
        assert!(config.should_retry(1, 3, &error));
        assert!(config.should_retry(2, 3, &error));
        assert!(!config.should_retry(3, 3, &error));
        assert!(!config.should_retry(1, 0, &error));
    }

    #[test]
    fn test_retry_on_filter() {
        let config = RetryConfig {
            retry_on: vec!["job_timeout".to_string()],
            ..Default::default()
        };
        assert!(config.should_retry(1, 3, &ConveyorError::JobTimeout(Duration::from_secs(1))));
        assert!(!config.should_retry(1, 3, &ConveyorError::handler("bad input")));
    }
}
