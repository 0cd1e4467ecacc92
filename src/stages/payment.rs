use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::order::{Order, OrderError, OrderStatus};
use crate::events::{OrderCreatedEvent, OrderPaidEvent, SCHEMA_VERSION};
use crate::messaging::{Consumer, Delivery, Disposition, EventPublisher};
use crate::store::OrderStore;

use super::ProcessingFailure;

// ============================================================================
// Payment Stage
// ============================================================================
//
// Consumes `order.created` and captures payment. The order id is the
// idempotency key: the capture ledger and the order's current status are
// checked before charging, so a redelivered message can never double-charge.
// The delivery is acknowledged only once the outcome is known; a capture
// failure forces redelivery until the broker's budget dead-letters it and
// the order stays PENDING for manual resolution.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub reference: String,
}

/// Seam to the payment provider. The simulated implementation stands in for
/// a real capture call with bounded latency.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn capture(&self, order: &Order) -> Result<PaymentConfirmation, ProcessingFailure>;
}

pub struct SimulatedPaymentProcessor {
    latency: Duration,
}

impl SimulatedPaymentProcessor {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl PaymentProcessor for SimulatedPaymentProcessor {
    async fn capture(&self, order: &Order) -> Result<PaymentConfirmation, ProcessingFailure> {
        tokio::time::sleep(self.latency).await;
        let reference = format!("PAY-{}", order.id.simple().to_string()[..12].to_uppercase());
        Ok(PaymentConfirmation { reference })
    }
}

pub struct PaymentStage {
    store: Arc<dyn OrderStore>,
    publisher: Arc<EventPublisher>,
    processor: Arc<dyn PaymentProcessor>,
    /// order id -> payment reference, written after a successful capture
    captured: DashMap<Uuid, String>,
}

impl PaymentStage {
    pub fn new(
        store: Arc<dyn OrderStore>,
        publisher: Arc<EventPublisher>,
        processor: Arc<dyn PaymentProcessor>,
    ) -> Self {
        Self {
            store,
            publisher,
            processor,
            captured: DashMap::new(),
        }
    }

    /// Announce the capture. The capture itself is already in the ledger, so
    /// when this publish fails a redelivery skips straight back here.
    async fn confirm(&self, order_id: Uuid) -> Disposition {
        match self.publisher.publish(&OrderPaidEvent::new(order_id)).await {
            Ok(()) => Disposition::Ack,
            Err(_) => Disposition::Requeue,
        }
    }
}

#[async_trait]
impl Consumer for PaymentStage {
    async fn handle(&self, delivery: Delivery) -> Disposition {
        let event: OrderCreatedEvent = match delivery.json() {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(error = %error, "Malformed order.created payload");
                return Disposition::DeadLetter;
            }
        };
        if event.schema_version > SCHEMA_VERSION {
            tracing::warn!(
                schema_version = event.schema_version,
                "Unsupported order.created schema"
            );
            return Disposition::DeadLetter;
        }
        let order = event.order;

        if let Some(reference) = self.captured.get(&order.id).map(|r| r.value().clone()) {
            tracing::debug!(
                order_id = %order.id,
                reference = %reference,
                "Duplicate delivery, capture already recorded"
            );
            return self.confirm(order.id).await;
        }

        match self.store.get(order.id).await {
            Ok(current) if current.status == OrderStatus::Cancelled => {
                tracing::info!(order_id = %order.id, "Order cancelled before capture, skipping");
                return Disposition::Ack;
            }
            Ok(current) if current.status != OrderStatus::Pending => {
                tracing::debug!(
                    order_id = %order.id,
                    status = %current.status,
                    "Order already progressed, skipping capture"
                );
                return Disposition::Ack;
            }
            Ok(_) => {}
            Err(OrderError::NotFound(_)) => {
                // the snapshot is sufficient evidence to capture against
                tracing::warn!(order_id = %order.id, "Order unknown to the store, capturing from snapshot");
            }
            Err(error) => {
                tracing::error!(order_id = %order.id, error = %error, "Store lookup failed");
                return Disposition::Requeue;
            }
        }

        match self.processor.capture(&order).await {
            Ok(confirmation) => {
                tracing::info!(
                    order_id = %order.id,
                    reference = %confirmation.reference,
                    amount = order.total,
                    "💳 Payment captured"
                );
                self.captured.insert(order.id, confirmation.reference);
                self.confirm(order.id).await
            }
            Err(failure) => {
                tracing::warn!(
                    order_id = %order.id,
                    attempt = delivery.attempt,
                    error = %failure,
                    "Payment capture failed"
                );
                Disposition::Requeue
            }
        }
    }
}
