use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards the publish path against a persistently unavailable bus. While the
// circuit is open, publishes fail fast instead of piling up retry loops.
//
// States:
// - Closed: calls pass through, failures are counted
// - Open: calls are rejected until the cool-down elapses
// - HalfOpen: probe calls allowed; enough successes close the circuit again
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    /// Numeric encoding used by the metrics gauge.
    pub fn as_gauge(&self) -> i64 {
        match self {
            BreakerState::Closed => 0,
            BreakerState::Open => 1,
            BreakerState::HalfOpen => 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Cool-down before a probe is allowed through an open circuit
    pub cooldown: Duration,
    /// Successes required to close a half-open circuit
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

struct BreakerInner {
    state: BreakerState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Mutex<BreakerInner>>,
    config: BreakerConfig,
}

#[derive(Debug)]
pub enum BreakerError<E> {
    /// Circuit is open, the call was not attempted
    Open,
    /// The call was attempted and failed
    Inner(E),
}

impl<E: std::fmt::Display> std::fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerError::Open => write!(f, "circuit breaker is open"),
            BreakerError::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error> std::error::Error for BreakerError<E> {}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            })),
            config,
        }
    }

    /// Run `call` if the circuit allows it, recording the outcome.
    pub async fn guard<F, T, E>(&self, call: F) -> Result<T, BreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        {
            let mut inner = self.inner.lock().await;
            if inner.state == BreakerState::Open {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed < self.config.cooldown {
                    return Err(BreakerError::Open);
                }
                tracing::info!("Circuit breaker half-open, allowing probe");
                inner.state = BreakerState::HalfOpen;
                inner.successes = 0;
            }
        }

        match call.await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(error) => {
                self.on_failure().await;
                Err(BreakerError::Inner(error))
            }
        }
    }

    async fn on_success(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            BreakerState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.config.success_threshold {
                    tracing::info!(successes = inner.successes, "Circuit breaker closed");
                    inner.state = BreakerState::Closed;
                    inner.failures = 0;
                    inner.successes = 0;
                    inner.opened_at = None;
                }
            }
            BreakerState::Closed => inner.failures = 0,
            BreakerState::Open => {}
        }
    }

    async fn on_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.failures += 1;

        match inner.state {
            BreakerState::Closed if inner.failures >= self.config.failure_threshold => {
                tracing::warn!(failures = inner.failures, "Circuit breaker opened");
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
            }
            BreakerState::HalfOpen => {
                tracing::warn!("Probe failed, circuit breaker reopened");
                inner.state = BreakerState::Open;
                inner.successes = 0;
                inner.opened_at = Some(Instant::now());
            }
            _ => {}
        }
    }

    pub async fn state(&self) -> BreakerState {
        self.inner.lock().await.state
    }

    /// Force the circuit closed, e.g. after an operator intervention.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = BreakerState::Closed;
        inner.failures = 0;
        inner.successes = 0;
        inner.opened_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failures: u32, cooldown_ms: u64, successes: u32) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: failures,
            cooldown: Duration::from_millis(cooldown_ms),
            success_threshold: successes,
        })
    }

    #[tokio::test]
    async fn opens_after_consecutive_failures() {
        let cb = breaker(3, 1000, 2);

        for _ in 0..3 {
            let _ = cb.guard(async { Err::<(), _>("unavailable") }).await;
        }
        assert_eq!(cb.state().await, BreakerState::Open);

        let rejected = cb.guard(async { Ok::<_, &str>(()) }).await;
        assert!(matches!(rejected, Err(BreakerError::Open)));
    }

    #[tokio::test]
    async fn probe_closes_circuit_after_cooldown() {
        let cb = breaker(2, 50, 1);

        for _ in 0..2 {
            let _ = cb.guard(async { Err::<(), _>("unavailable") }).await;
        }
        assert_eq!(cb.state().await, BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;

        let probe = cb.guard(async { Ok::<_, &str>(()) }).await;
        assert!(probe.is_ok());
        assert_eq!(cb.state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn failed_probe_reopens() {
        let cb = breaker(1, 20, 1);

        let _ = cb.guard(async { Err::<(), _>("down") }).await;
        assert_eq!(cb.state().await, BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;
        let _ = cb.guard(async { Err::<(), _>("still down") }).await;
        assert_eq!(cb.state().await, BreakerState::Open);
    }

    #[tokio::test]
    async fn success_resets_failure_streak() {
        let cb = breaker(2, 1000, 1);

        let _ = cb.guard(async { Err::<(), _>("blip") }).await;
        let _ = cb.guard(async { Ok::<_, &str>(()) }).await;
        let _ = cb.guard(async { Err::<(), _>("blip") }).await;

        assert_eq!(cb.state().await, BreakerState::Closed);
    }
}
