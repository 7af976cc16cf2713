//! Exponential backoff retry policy with jitter.
//!
//! A pure delay scheduler: computes `min(max_delay, base * exp_base^k)` with
//! optional ±20% uniform jitter, and drives a retry loop around a fallible
//! async operation. Sleeps are cancellable through the caller's
//! [`CancellationToken`]; there is no trailing delay after the final attempt.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::SearchError;

/// Retry loop wrapper around [`RetryConfig`] parameters.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before retry attempt `attempt` (0-based index of the attempt
    /// that just failed). Jitter perturbs by ±20%, floored at zero.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay.as_secs_f64();
        let raw = base * self.config.exponential_base.powi(attempt as i32);
        let capped = raw.min(self.config.max_delay.as_secs_f64());

        let secs = if self.config.jitter {
            let jitter_amount = capped * 0.2;
            let offset = rand::thread_rng().gen_range(-jitter_amount..=jitter_amount);
            (capped + offset).max(0.0)
        } else {
            capped
        };
        Duration::from_secs_f64(secs)
    }

    /// Run `op` up to `max_attempts` times, sleeping the backoff delay
    /// between attempts. Returns the first success, or the last error once
    /// attempts are exhausted. Cancellation aborts a pending sleep and
    /// returns [`SearchError::Cancelled`].
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, SearchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SearchError>>,
    {
        let mut last_error = SearchError::Transient("no attempts made".into());

        for attempt in 0..self.config.max_attempts {
            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled);
            }

            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(attempt = attempt + 1, "retry succeeded");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max = self.config.max_attempts,
                        error = %err,
                        "attempt failed"
                    );
                    last_error = err;
                }
            }

            // No trailing delay after the final attempt.
            if attempt + 1 < self.config.max_attempts {
                let delay = self.delay_for(attempt);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SearchError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_attempts: u32, base_ms: u64, jitter: bool) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
            jitter,
        })
    }

    #[test]
    fn delay_grows_exponentially_without_jitter() {
        let policy = policy(5, 100, false);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn delay_capped_at_max() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            exponential_base: 2.0,
            jitter: false,
        });
        assert_eq!(policy.delay_for(10), Duration::from_secs(5));
    }

    #[test]
    fn jittered_delay_stays_within_twenty_percent() {
        let policy = policy(5, 1000, true);
        for _ in 0..50 {
            let d = policy.delay_for(0).as_secs_f64();
            assert!((0.8..=1.2).contains(&d), "delay {d} outside jitter band");
        }
    }

    #[tokio::test]
    async fn succeeds_after_two_failures_with_exactly_three_invocations() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            exponential_base: 2.0,
            jitter: false,
        });
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_op = Arc::clone(&calls);

        let result = policy
            .run(&cancel, || {
                let calls = Arc::clone(&calls_op);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(SearchError::Transient(format!("failure {n}")))
                    } else {
                        Ok(42u32)
                    }
                }
            })
            .await;

        assert_eq!(result.expect("third attempt succeeds"), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_last_error_when_exhausted() {
        let policy = policy(3, 1, false);
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_op = Arc::clone(&calls);

        let result: Result<(), _> = policy
            .run(&cancel, || {
                let calls = Arc::clone(&calls_op);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    Err(SearchError::Transient(format!("failure {n}")))
                }
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("failure 2"), "got: {err}");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn first_attempt_success_does_not_sleep() {
        let policy = policy(5, 5_000, false);
        let cancel = CancellationToken::new();
        let started = std::time::Instant::now();

        let result = policy.run(&cancel, || async { Ok(1u8) }).await;
        assert_eq!(result.expect("immediate success"), 1);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn cancellation_aborts_pending_sleep() {
        let policy = policy(3, 5_000, false);
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });

        let started = std::time::Instant::now();
        let result: Result<(), _> = policy
            .run(&cancel, || async { Err(SearchError::Transient("x".into())) })
            .await;

        assert!(matches!(result, Err(SearchError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits() {
        let policy = policy(3, 1, false);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), _> = policy.run(&cancel, || async { Ok(()) }).await;
        assert!(matches!(result, Err(SearchError::Cancelled)));
    }
}
