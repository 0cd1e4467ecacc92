use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Bounded Retry with Exponential Backoff
// ============================================================================
//
// Publish and capture operations must never block indefinitely: every retry
// loop is bounded by a policy, and permanent failures abort immediately.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Ceiling for the backoff delay
    pub max_backoff: Duration,
    /// Backoff multiplier between attempts
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy for event publishes: more attempts, short initial delay.
    pub fn publish() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }

    /// Single attempt, no waiting. Useful in tests and for fire-once probes.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Backoff delay to wait after the given (1-based) failed attempt.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let millis = (self.initial_backoff.as_millis() as f64) * self.multiplier.powi(exp as i32);
        Duration::from_millis(millis as u64).min(self.max_backoff)
    }
}

/// Errors that may succeed on a later attempt.
///
/// Permanent errors (unroutable message, malformed payload) abort the retry
/// loop immediately instead of burning the attempt budget.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Final outcome of a bounded retry loop.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// Succeeded within the attempt budget
    Ok(T),
    /// Every attempt failed with a transient error
    Exhausted(E),
    /// A permanent error ended the loop early
    Aborted(E),
}

impl<T, E> RetryOutcome<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryOutcome::Ok(value) => Ok(value),
            RetryOutcome::Exhausted(e) | RetryOutcome::Aborted(e) => Err(e),
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or the attempt
/// budget is spent. The closure receives the 1-based attempt number.
pub async fn with_backoff<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + Transient,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return RetryOutcome::Ok(value);
            }
            Err(error) if !error.is_transient() => {
                tracing::error!(attempt, error = %error, "Permanent failure, not retrying");
                return RetryOutcome::Aborted(error);
            }
            Err(error) => {
                if attempt >= policy.max_attempts {
                    tracing::error!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        error = %error,
                        "Retry budget exhausted"
                    );
                    return RetryOutcome::Exhausted(error);
                }

                let delay = policy.backoff_after(attempt);
                tracing::warn!(
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying after backoff"
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Flaky(bool);

    impl std::fmt::Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky(transient={})", self.0)
        }
    }

    impl Transient for Flaky {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let seen = counter.clone();

        let outcome = with_backoff(&quick_policy(3), |_attempt| {
            let seen = seen.clone();
            async move {
                if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Flaky(true))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert!(matches!(outcome, RetryOutcome::Ok("done")));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempt_budget() {
        let outcome = with_backoff(&quick_policy(2), |_| async { Err::<(), _>(Flaky(true)) }).await;
        assert!(matches!(outcome, RetryOutcome::Exhausted(_)));
    }

    #[tokio::test]
    async fn permanent_failure_aborts_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let seen = counter.clone();

        let outcome = with_backoff(&quick_policy(5), |_| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Flaky(false))
            }
        })
        .await;

        assert!(matches!(outcome, RetryOutcome::Aborted(_)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            multiplier: 2.0,
        };

        assert_eq!(policy.backoff_after(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(350));
        assert_eq!(policy.backoff_after(8), Duration::from_millis(350));
    }
}
