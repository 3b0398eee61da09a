//! Generic retry-with-backoff executor for outbound calls
//!
//! This module provides the delivery retrier that:
//! - Never retries definite client errors (400/401/403/404 equivalents)
//! - Short-circuits on rate limits (429) and surfaces the suggested wait
//! - Retries everything else with exponential backoff
//! - Raises the last error once attempts are exhausted

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::domain::config::DeliveryConfig;
use crate::domain::errors::{Classify, FailureKind};

/// Retry executor shared by every outbound path.
#[derive(Debug, Clone)]
pub struct DeliveryRetrier {
    /// Total attempts, including the first
    max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards
    base_delay: Duration,
}

impl DeliveryRetrier {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.base_delay_ms))
    }

    /// Delay before attempt `attempt` (1-based): `base × 2^(attempt-2)`, none before the first.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        self.base_delay * 2u32.saturating_pow(attempt - 2)
    }

    /// Execute an operation with retry logic
    ///
    /// # Arguments
    /// * `label` - What is being attempted, for logging (e.g. "reply to !room:server")
    /// * `operation` - Async closure producing one attempt
    ///
    /// # Returns
    /// The first successful value, or the error that ended the loop
    pub async fn run<F, Fut, T, E>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(error) => match error.classify() {
                    FailureKind::Terminal => {
                        tracing::warn!("{} rejected, not retrying: {}", label, error);
                        return Err(error);
                    }
                    FailureKind::RateLimited(retry_after) => {
                        tracing::warn!("{} rate limited (retry after {:?})", label, retry_after);
                        return Err(error);
                    }
                    FailureKind::Retryable if attempt >= self.max_attempts => {
                        tracing::warn!(
                            "{} failed after {} attempts: {}",
                            label,
                            self.max_attempts,
                            error
                        );
                        return Err(error);
                    }
                    FailureKind::Retryable => {
                        attempt += 1;
                        let delay = self.delay_before(attempt);
                        tracing::debug!(
                            "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                            label,
                            attempt - 1,
                            self.max_attempts,
                            error,
                            delay
                        );
                        sleep(delay).await;
                    }
                },
            }
        }
    }

    /// Like [`run`](Self::run), but logs and discards the final failure.
    pub async fn best_effort<F, Fut, T, E>(&self, label: &str, operation: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        match self.run(label, operation).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Best-effort {} dropped: {}", label, e);
                None
            }
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
