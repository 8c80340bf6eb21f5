// Retry
// Adapter-side retry with a remaining-attempts counter and exponential backoff

use crate::error::AdapterError;

use std::future::Future;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 100;
const DEFAULT_MAX_DELAY_MS: u64 = 5_000;

/// How often and how patiently an adapter retries transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before the attempt following `attempt` (1-based): base * 2^(attempt-1), capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempts are used up. Exhaustion yields a terminal
/// (non-retryable) error carrying the last failure.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
) -> Result<T, AdapterError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match f(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.retryable && attempt < max_attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    data_object = %err.data_object_id,
                    operation,
                    attempt,
                    remaining_attempts = max_attempts - attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err.message,
                    "Retrying after transient adapter error"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) if err.retryable => {
                tracing::error!(
                    data_object = %err.data_object_id,
                    operation,
                    attempts = attempt,
                    error = %err.message,
                    "Retries exhausted"
                );
                return Err(AdapterError::new(
                    err.data_object_id,
                    format!(
                        "{} failed after {} attempts: {}",
                        operation, attempt, err.message
                    ),
                ));
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts).with_base_delay(Duration::ZERO)
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::new(5)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(350));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(10), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_with_policy(&fast_policy(3), "write", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(AdapterError::transient("tgt", "timeout"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_terminal() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_policy(&fast_policy(2), "write", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AdapterError::transient("tgt", "timeout")) }
        })
        .await;
        let err = result.unwrap_err();
        assert!(!err.retryable);
        assert!(err.message.contains("after 2 attempts"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_policy(&fast_policy(5), "read", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AdapterError::new("src", "bad path")) }
        })
        .await;
        assert_eq!(result.unwrap_err().message, "bad path");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
