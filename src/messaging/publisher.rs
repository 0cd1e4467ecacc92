use std::sync::Arc;

use crate::events::DomainEvent;
use crate::messaging::{DeadLetterStore, DeliveryError, EventBus};
use crate::metrics::Metrics;
use crate::utils::{with_backoff, BreakerConfig, BreakerError, CircuitBreaker, RetryOutcome, RetryPolicy};

// ============================================================================
// Event Publisher
// ============================================================================
//
// Every stage publishes through this wrapper rather than the raw bus: each
// publish runs inside the circuit breaker with bounded retry/backoff, and an
// exhausted budget lands the event in the dead letter store where an
// operator can replay it. Publishing never blocks indefinitely and never
// loses an event silently.
//
// ============================================================================

pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
    exchange: String,
    policy: RetryPolicy,
    breaker: CircuitBreaker,
    dlq: Arc<DeadLetterStore>,
    metrics: Arc<Metrics>,
}

impl EventPublisher {
    pub fn new(
        bus: Arc<dyn EventBus>,
        exchange: impl Into<String>,
        policy: RetryPolicy,
        dlq: Arc<DeadLetterStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            bus,
            exchange: exchange.into(),
            policy,
            breaker: CircuitBreaker::new(BreakerConfig::default()),
            dlq,
            metrics,
        }
    }

    pub fn with_breaker_config(mut self, config: BreakerConfig) -> Self {
        self.breaker = CircuitBreaker::new(config);
        self
    }

    /// Publish one domain event under its routing key.
    pub async fn publish<E: DomainEvent>(&self, event: &E) -> Result<(), DeliveryError> {
        let routing_key = event.routing_key();
        let payload = serde_json::to_vec(event)?;

        let outcome = with_backoff(&self.policy, |_attempt| {
            let payload = payload.clone();
            async move {
                self.breaker
                    .guard(self.bus.publish(&self.exchange, routing_key, payload))
                    .await
                    .map_err(|e| match e {
                        // an open circuit means the channel is down; retry
                        // after backoff like any transient outage
                        BreakerError::Open => DeliveryError::ChannelUnavailable,
                        BreakerError::Inner(inner) => inner,
                    })
            }
        })
        .await;

        self.metrics
            .set_breaker_state(self.breaker.state().await.as_gauge());

        match outcome {
            RetryOutcome::Ok(()) => {
                self.metrics.record_published(routing_key);
                tracing::info!(
                    routing_key = %routing_key,
                    order_id = %event.order_id(),
                    "📤 Event published"
                );
                Ok(())
            }
            RetryOutcome::Exhausted(error) | RetryOutcome::Aborted(error) => {
                self.metrics.record_publish_failure(routing_key);
                self.dlq.record(
                    "publisher",
                    routing_key,
                    &payload,
                    format!("publish failed: {error}"),
                    self.policy.max_attempts,
                );
                self.metrics.record_dead_letter(routing_key);
                Err(error)
            }
        }
    }
}
