//! Retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use crate::error::{ApiError, Result};

/// Retry policy configuration.
///
/// Attempt numbers are zero-based retry counts: attempt 0 is the first
/// failure, and with the defaults the waits are 1s, 2s, 4s before the fourth
/// failure is surfaced.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Backoff multiplier.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Whether `error`, seen after `attempt` prior retries, earns another try.
    pub fn should_retry(&self, error: &ApiError, attempt: u32) -> bool {
        error.retryable && attempt < self.max_retries
    }

    /// Wait before re-attempting after failure number `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(self.multiplier.saturating_pow(attempt))
    }

    /// Execute an async operation with retry.
    ///
    /// The operation receives the current retry count.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !self.should_retry(&e, attempt) {
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delays_double_from_one_second() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        for n in 0..3 {
            assert_eq!(policy.delay_for(n + 1), policy.delay_for(n) * 2);
        }
    }

    #[test]
    fn retry_budget_stops_at_third_retry() {
        let policy = RetryPolicy::default();
        let err = ApiError::http(503, None, "unavailable");
        assert!(policy.should_retry(&err, 0));
        assert!(policy.should_retry(&err, 2));
        assert!(!policy.should_retry(&err, 3));
    }

    #[test]
    fn fatal_errors_are_never_retried() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(&ApiError::http(404, None, "missing"), 0));
        assert!(!policy.should_retry(&ApiError::validation("bad input"), 0));
    }

    #[test]
    fn huge_attempt_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::default();
        assert!(policy.delay_for(200) >= policy.delay_for(10));
    }
}
