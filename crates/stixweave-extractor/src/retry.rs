//! Bounded retries around capability calls

use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use stixweave_domain::CapabilityError;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Why a retried call gave up
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// Non-transient failure, not retried
    #[error("{0}")]
    Permanent(CapabilityError),

    /// Every attempt failed transiently
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Last failure seen
        last: CapabilityError,
    },

    /// The run was cancelled
    #[error("cancelled")]
    Cancelled,
}

/// Exponential backoff for transient failures
///
/// The delay before retry `n` (zero-based) is `min(base * 2^n, max)`. The same
/// operation is re-issued unchanged on every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Create a retry policy
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// Build from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.base_delay_ms, config.max_delay_ms)
    }

    /// Delay before retry number `attempt` (zero-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Run `operation` until it succeeds, fails permanently, runs out of retries or is cancelled
    ///
    /// Cancellation is checked before every attempt and interrupts both a
    /// running attempt and a pending backoff sleep.
    pub async fn run<F, Fut, T>(
        &self,
        operation_name: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CapabilityError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                outcome = operation() => outcome,
            };
            let error = match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        info!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => {
                    warn!(operation = operation_name, error = %e, "Operation failed permanently");
                    return Err(RetryError::Permanent(e));
                }
                Err(e) => e,
            };

            if attempt >= self.max_retries {
                warn!(
                    operation = operation_name,
                    attempts = attempt + 1,
                    error = %error,
                    "Operation failed after max retries"
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt + 1,
                    last: error,
                });
            }

            let delay = self.backoff(attempt);
            attempt += 1;
            warn!(
                operation = operation_name,
                attempt = attempt,
                max_retries = self.max_retries,
                backoff_ms = delay.as_millis() as u64,
                error = %error,
                "Operation failed, retrying"
            );

            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, 1, 4)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, 500, 8_000);
        let delays: Vec<u64> = (0..7).map(|n| policy.backoff(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![500, 1_000, 2_000, 4_000, 8_000, 8_000, 8_000]);
        assert_eq!(policy.backoff(40), Duration::from_millis(8_000));
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let calls = AtomicUsize::new(0);
        let result = fast_policy(3)
            .run("test", &CancellationToken::new(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CapabilityError::Transient("503".to_string()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = fast_policy(3)
            .run("test", &CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CapabilityError::Permanent("401".to_string())) }
            })
            .await;
        assert!(matches!(result, Err(RetryError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = fast_policy(2)
            .run("test", &CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CapabilityError::Transient("timeout".to_string())) }
            })
            .await;
        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 3,
                last: CapabilityError::Transient("timeout".to_string()),
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = fast_policy(3)
            .run("test", &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert_eq!(result, Err(RetryError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff_sleep() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(3, 60_000, 60_000);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = policy
            .run("test", &cancel, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(CapabilityError::Transient("429".to_string())) }
            })
            .await;

        assert_eq!(result, Err(RetryError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_running_attempt() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let result: Result<(), _> = fast_policy(3)
            .run("test", &cancel, || async {
                tokio::time::sleep(Duration::from_secs(100)).await;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(RetryError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
