//! Bounded retry for eventually-consistent operations.
//!
//! The poller knows nothing about what it runs: it only looks at the
//! success/failure signal, so the same primitive backs SSH reachability,
//! transient engine errors, and anything else that needs "try again in a
//! bit, up to a budget".

use crate::cancel::CancelToken;
use crate::errors::RetryError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Immutable retry budget, constructed once per call site.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Must be at least 1.
    pub max_attempts: u32,
    /// Sleep between attempts. No sleep after the final attempt or after
    /// a success.
    pub interval: Duration,
    /// Name used in diagnostics and the exhaustion error.
    pub operation_name: String,
}

impl RetryPolicy {
    pub fn new(operation_name: impl Into<String>, max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
            operation_name: operation_name.into(),
        }
    }

    /// Budget for waiting out instance boot latency before SSH answers:
    /// 30 attempts, 10 seconds apart (five minutes).
    pub fn ssh_reachability(target: &str) -> Self {
        Self::new(format!("SSH to {target}"), 30, Duration::from_secs(10))
    }

    /// Budget for transient provisioning-engine errors (throttling,
    /// connection resets). Deliberately small; real failures should
    /// surface fast.
    pub fn engine_transient(operation: &str) -> Self {
        Self::new(operation.to_string(), 3, Duration::from_secs(5))
    }
}

/// Run `operation` under `policy`, sleeping `policy.interval` between
/// failed attempts.
///
/// Returns the first success immediately. If every attempt fails, returns
/// [`RetryError::Exhausted`] carrying the last observed error, the attempt
/// count, and the elapsed time. If `cancel` fires mid-sleep the remaining
/// attempts are abandoned and [`RetryError::Cancelled`] is returned.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let started = Instant::now();
    let mut last_error: Option<E> = None;

    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled {
                operation: policy.operation_name.clone(),
                attempts: attempt - 1,
            });
        }

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = %policy.operation_name,
                        attempt,
                        "operation succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(err) => {
                debug!(
                    operation = %policy.operation_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    "attempt failed"
                );
                last_error = Some(err);
            }
        }

        if attempt < policy.max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(policy.interval) => {}
                _ = cancel.cancelled() => {
                    warn!(operation = %policy.operation_name, "retry cancelled mid-sleep");
                    return Err(RetryError::Cancelled {
                        operation: policy.operation_name.clone(),
                        attempts: attempt,
                    });
                }
            }
        }
    }

    let last_error = last_error.expect("max_attempts >= 1 guarantees at least one error");
    warn!(
        operation = %policy.operation_name,
        attempts = policy.max_attempts,
        elapsed = ?started.elapsed(),
        "retry budget exhausted"
    );
    Err(RetryError::Exhausted {
        operation: policy.operation_name.clone(),
        attempts: policy.max_attempts,
        elapsed: started.elapsed(),
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new("test-op", max_attempts, Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = retry(&fast_policy(5), &CancelToken::never(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("ok")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_k_failures_with_exactly_k_plus_one_attempts() {
        let k = 3u32;
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = retry(&fast_policy(10), &CancelToken::never(), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= k {
                    Err(format!("failure {n}"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), k + 1);
        assert_eq!(calls.load(Ordering::SeqCst), k + 1);
    }

    #[tokio::test]
    async fn test_exhaustion_makes_exactly_max_attempts_and_keeps_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = retry(&fast_policy(4), &CancelToken::never(), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err::<(), _>(format!("failure {n}"))
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result.unwrap_err() {
            RetryError::Exhausted {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 4);
                assert_eq!(last_error, "failure 4");
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_mid_sleep_returns_immediately() {
        let (handle, token) = cancel_pair();
        let policy = RetryPolicy::new("slow-op", 100, Duration::from_secs(30));
        let task = tokio::spawn(async move {
            retry(&policy, &token, || async { Err::<(), _>("down") }).await
        });
        // Give the first attempt time to fail and enter the sleep.
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("cancel must interrupt the sleep")
            .unwrap();
        match result.unwrap_err() {
            RetryError::Cancelled { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_sleep_after_final_attempt() {
        let policy = RetryPolicy::new("final", 1, Duration::from_secs(3600));
        let started = std::time::Instant::now();
        let result: Result<(), _> =
            retry(&policy, &CancelToken::never(), || async { Err::<(), _>("no") }).await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_ssh_reachability_budget() {
        let policy = RetryPolicy::ssh_reachability("1.2.3.4");
        assert_eq!(policy.max_attempts, 30);
        assert_eq!(policy.interval, Duration::from_secs(10));
        assert!(policy.operation_name.contains("1.2.3.4"));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new("clamped", 0, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
    }
}
