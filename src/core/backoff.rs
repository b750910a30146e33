//! Retry delay policy for retryable upstream failures.

use std::time::Duration;

use crate::config::AdmissionConfig;
use crate::core::error::ApiError;

/// Exponential backoff: `min(base * 2^attempt, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
}

impl BackoffPolicy {
    /// Build the policy from admission settings.
    #[must_use]
    pub const fn from_config(cfg: &AdmissionConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base: Duration::from_millis(cfg.base_backoff_ms),
            max: Duration::from_millis(cfg.max_backoff_ms),
        }
    }

    /// Delay to wait after failed attempt number `attempt` (zero-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay for a specific error, honoring a server retry hint as a floor.
    #[must_use]
    pub fn delay_for_error(&self, attempt: u32, error: &ApiError) -> Duration {
        let computed = self.delay_for(attempt);
        error
            .retry_after_secs()
            .map_or(computed, |secs| computed.max(Duration::from_secs(secs)))
            .min(self.max)
    }

    /// Whether an error on attempt `attempt` should be retried.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32, error: &ApiError) -> bool {
        error.is_retryable() && attempt < self.max_retries
    }
}
