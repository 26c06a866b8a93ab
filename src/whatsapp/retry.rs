//! Connect retry with bounded exponential backoff.
//!
//! The original bridge reconnected in a tight unbounded loop. Here every
//! reconnect path goes through an explicit policy: exponential backoff with
//! jitter, a delay cap, and a finite attempt budget. Exhausting the budget
//! is a distinct terminal outcome, separate from a non-retryable failure.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff policy for one retry loop.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// First delay; subsequent delays double.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub cap: Duration,
    /// Attempts after the initial one before giving up.
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
            max_retries: 12,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (0-based), jittered to 50-150%
    /// of the exponential value so simultaneous restarts spread out.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.cap);
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        exp.mul_f64(jitter).min(self.cap)
    }
}

/// Outcome of a retried operation that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    /// The retry budget ran out; `source` is the last failure seen.
    #[error("retry budget exhausted after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: E },

    /// The operation failed in a way that is not worth retrying.
    #[error(transparent)]
    Fatal(E),
}

/// Retry `operation` under `policy` until it succeeds, fails fatally, or
/// the attempt budget runs out.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: BackoffPolicy,
    mut operation: F,
    is_retryable: fn(&E) -> bool,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) if !is_retryable(&err) => return Err(RetryError::Fatal(err)),
            Err(err) => {
                if attempt >= policy.max_retries {
                    return Err(RetryError::Exhausted {
                        attempts: attempt + 1,
                        source: err,
                    });
                }
                let backoff = policy.delay(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whatsapp::traits::ProtocolError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(4),
            max_retries: 3,
        }
    }

    #[tokio::test]
    async fn succeeds_immediately() {
        let result = retry_with_backoff(
            fast_policy(),
            || async { Ok::<_, ProtocolError>(42) },
            ProtocolError::is_transient,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempt = Arc::new(AtomicU32::new(0));
        let attempt_clone = attempt.clone();

        let result = retry_with_backoff(
            fast_policy(),
            move || {
                let attempt = attempt_clone.clone();
                async move {
                    if attempt.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ProtocolError::Network("transient".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            },
            ProtocolError::is_transient,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempt.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_fails_immediately() {
        let attempt = Arc::new(AtomicU32::new(0));
        let attempt_clone = attempt.clone();

        let result: Result<i32, _> = retry_with_backoff(
            fast_policy(),
            move || {
                let attempt = attempt_clone.clone();
                async move {
                    attempt.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>(ProtocolError::Protocol("bad request".to_string()))
                }
            },
            ProtocolError::is_transient,
        )
        .await;

        assert!(matches!(result, Err(RetryError::Fatal(_))));
        assert_eq!(attempt.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_is_its_own_outcome() {
        let result: Result<i32, _> = retry_with_backoff(
            fast_policy(),
            || async { Err::<i32, _>(ProtocolError::Network("down".to_string())) },
            ProtocolError::is_transient,
        )
        .await;

        match result {
            Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 4),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn delays_are_capped_and_jittered_within_bounds() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
            max_retries: 12,
        };

        for attempt in 0..16 {
            let delay = policy.delay(attempt);
            assert!(delay <= policy.cap);
            // Jitter floor: half of the un-jittered exponential, still capped.
            let exp = policy.base.saturating_mul(2u32.saturating_pow(attempt)).min(policy.cap);
            assert!(delay >= exp.mul_f64(0.5));
        }
    }
}
