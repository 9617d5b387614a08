// Reusable retry policy: attempts, exponential backoff, jitter and a retryable predicate.
// Composed with the circuit breaker by wrapping, never nested inside it.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::utils::logger::logger;
use crate::utils::time::sleep_ms;
use crate::utils::{SyncError, SyncResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt (milliseconds)
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    /// Upper bound of uniform random jitter added to each delay (0 disables)
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fetch_wrapper()
    }
}

impl RetryPolicy {
    /// Upstream HTTP client: 4 attempts, sleeping 2s, 4s, 8s between them.
    pub fn api_client() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 2_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 60_000,
            jitter_ms: 0,
        }
    }

    /// Generic async wrapper used around whole fetches: 3 attempts, 200ms then 400ms.
    pub fn fetch_wrapper() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            backoff_multiplier: 2.0,
            max_delay_ms: 10_000,
            jitter_ms: 0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    pub fn with_jitter_ms(mut self, jitter_ms: u64) -> Self {
        self.jitter_ms = jitter_ms;
        self
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.max_attempts == 0 {
            return Err(SyncError::config_error(
                "Max attempts must be greater than 0",
            ));
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err(SyncError::config_error(
                "Max delay must be greater than or equal to base delay",
            ));
        }

        if self.backoff_multiplier < 1.0 {
            return Err(SyncError::config_error(
                "Backoff multiplier must be at least 1",
            ));
        }

        Ok(())
    }

    /// Backoff before the next attempt, given the 1-based attempt that just failed.
    /// Excludes jitter.
    pub fn calculate_delay(&self, failed_attempt: u32) -> u64 {
        if failed_attempt == 0 {
            return 0;
        }
        let exponent = (failed_attempt - 1).min(32) as i32;
        let delay = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        (delay.min(self.max_delay_ms as f64)) as u64
    }

    fn jitter(&self) -> u64 {
        if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        }
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error, or
    /// attempts run out. The last error is returned unchanged.
    ///
    /// `operation` receives the 1-based attempt number. A retryable error that
    /// carries `retry_after_ms` waits that long, capped at `max_delay_ms`,
    /// instead of the computed backoff.
    pub async fn execute<F, Fut, T, P>(
        &self,
        label: &str,
        mut operation: F,
        is_retryable: P,
    ) -> SyncResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = SyncResult<T>>,
        P: Fn(&SyncError) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let err = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !is_retryable(&err) {
                return Err(err);
            }

            if attempt >= max_attempts {
                logger().error_with_meta(
                    "All retry attempts failed",
                    Some(&serde_json::json!({
                        "operation": label,
                        "attempts": attempt,
                        "error": err.message,
                        "kind": err.kind.as_str(),
                    })),
                );
                return Err(err);
            }

            let delay = match err.retry_after_ms {
                Some(retry_after) => retry_after.min(self.max_delay_ms),
                None => self.calculate_delay(attempt) + self.jitter(),
            };
            logger().warn_with_meta(
                "Attempt failed, retrying",
                Some(&serde_json::json!({
                    "operation": label,
                    "attempt": attempt,
                    "maxAttempts": max_attempts,
                    "delayMs": delay,
                    "error": err.message,
                    "kind": err.kind.as_str(),
                })),
            );

            sleep_ms(delay).await;
            attempt += 1;
        }
    }
}

/// Retry predicate used for upstream work.
pub fn retry_transient(err: &SyncError) -> bool {
    err.is_retryable()
}

/// Retry predicate that retries anything except circuit short-circuits and
/// credential rejections.
pub fn retry_unless_fatal(err: &SyncError) -> bool {
    use crate::utils::ErrorKind;
    !matches!(
        err.kind,
        ErrorKind::CircuitOpen | ErrorKind::AuthError | ErrorKind::ConfigurationError
    )
}
