//! Bounded exponential backoff and timeout helpers for gateway calls.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry policy for retryable gateway failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_backoff_ms: u64,

    /// Upper bound for any single delay
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Delay to wait after `attempt` (1-based) has failed.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(exponent))
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are exhausted. The last error is returned.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut op: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("{} succeeded on attempt {}/{}", op_name, attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.backoff_for(attempt);
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {}ms",
                    op_name,
                    attempt,
                    max_attempts,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!("{} failed after {} attempts: {}", op_name, attempt, e);
                }
                return Err(e);
            }
        }
    }
}

/// Bound `fut` by `limit`, mapping expiry to [`AppError::Timeout`].
pub async fn with_timeout<T, Fut>(limit: Duration, op_name: &str, fut: Fut) -> AppResult<T>
where
    Fut: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(format!(
            "{} exceeded {}ms",
            op_name,
            limit.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(5), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_retries_service_unavailable_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_with_backoff(&fast_policy(3), "flaky", || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::ServiceUnavailable("down".to_string()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: AppResult<()> = retry_with_backoff(&fast_policy(3), "down", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AppError::ServiceUnavailable("down".to_string()))
        })
        .await;

        assert!(matches!(result, Err(AppError::ServiceUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_returned_immediately() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: AppResult<()> = retry_with_backoff(&fast_policy(5), "fatal", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AppError::DimensionMismatch {
                expected: 3,
                actual: 4,
            })
        })
        .await;

        assert!(matches!(result, Err(AppError::DimensionMismatch { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_timeout_maps_expiry() {
        let result: AppResult<()> = with_timeout(Duration::from_millis(10), "sleepy", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AppError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_through_result() {
        let result = with_timeout(Duration::from_secs(1), "quick", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
