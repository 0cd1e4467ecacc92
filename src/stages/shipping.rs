use async_trait::async_trait;
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::order::{OrderError, OrderStatus};
use crate::events::{OrderPaidEvent, ShippingArrangedEvent, SCHEMA_VERSION};
use crate::messaging::{Consumer, Delivery, Disposition, EventPublisher};
use crate::store::OrderStore;

use super::ProcessingFailure;

// ============================================================================
// Shipping Stage
// ============================================================================
//
// Consumes `order.paid` and arranges fulfillment. The tracking reference is
// recorded in the arrangement ledger before `shipping.arranged` goes out, so
// reprocessing the same message replays the existing reference; a customer
// can never observe two different tracking numbers for one order.
//
// ============================================================================

/// Seam to the carrier. The simulated implementation stands in for a real
/// dispatch call with bounded latency.
#[async_trait]
pub trait CarrierGateway: Send + Sync {
    async fn arrange(&self, order_id: Uuid) -> Result<String, ProcessingFailure>;
}

pub struct SimulatedCarrier {
    latency: Duration,
}

impl SimulatedCarrier {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl CarrierGateway for SimulatedCarrier {
    async fn arrange(&self, _order_id: Uuid) -> Result<String, ProcessingFailure> {
        tokio::time::sleep(self.latency).await;
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(char::from)
            .collect();
        Ok(format!("TRK-{}", suffix.to_uppercase()))
    }
}

pub struct ShippingStage {
    store: Arc<dyn OrderStore>,
    publisher: Arc<EventPublisher>,
    carrier: Arc<dyn CarrierGateway>,
    /// order id -> tracking reference, written before the event is published
    arranged: DashMap<Uuid, String>,
}

impl ShippingStage {
    pub fn new(
        store: Arc<dyn OrderStore>,
        publisher: Arc<EventPublisher>,
        carrier: Arc<dyn CarrierGateway>,
    ) -> Self {
        Self {
            store,
            publisher,
            carrier,
            arranged: DashMap::new(),
        }
    }

    async fn announce(&self, order_id: Uuid, tracking_number: &str) -> Disposition {
        let event = ShippingArrangedEvent::new(order_id, tracking_number);
        match self.publisher.publish(&event).await {
            Ok(()) => Disposition::Ack,
            // the ledger already holds the reference; a redelivery replays it
            Err(_) => Disposition::Requeue,
        }
    }
}

#[async_trait]
impl Consumer for ShippingStage {
    async fn handle(&self, delivery: Delivery) -> Disposition {
        let event: OrderPaidEvent = match delivery.json() {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(error = %error, "Malformed order.paid payload");
                return Disposition::DeadLetter;
            }
        };
        if event.schema_version > SCHEMA_VERSION {
            tracing::warn!(
                schema_version = event.schema_version,
                "Unsupported order.paid schema"
            );
            return Disposition::DeadLetter;
        }
        let order_id = event.order_id;

        if let Some(tracking) = self.arranged.get(&order_id).map(|t| t.value().clone()) {
            tracing::debug!(
                order_id = %order_id,
                tracking_number = %tracking,
                "Duplicate delivery, replaying existing arrangement"
            );
            return self.announce(order_id, &tracking).await;
        }

        match self.store.get(order_id).await {
            Ok(current) if current.status == OrderStatus::Cancelled => {
                tracing::info!(order_id = %order_id, "Order cancelled before dispatch, skipping");
                return Disposition::Ack;
            }
            Ok(current) if current.status == OrderStatus::Shipped => {
                tracing::debug!(order_id = %order_id, "Order already shipped, skipping");
                return Disposition::Ack;
            }
            Ok(_) => {}
            Err(OrderError::NotFound(_)) => {
                tracing::warn!(order_id = %order_id, "Order unknown to the store, arranging anyway");
            }
            Err(error) => {
                tracing::error!(order_id = %order_id, error = %error, "Store lookup failed");
                return Disposition::Requeue;
            }
        }

        match self.carrier.arrange(order_id).await {
            Ok(tracking) => {
                tracing::info!(
                    order_id = %order_id,
                    tracking_number = %tracking,
                    "📦 Shipment arranged"
                );
                self.arranged.insert(order_id, tracking.clone());
                self.announce(order_id, &tracking).await
            }
            Err(failure) => {
                tracing::warn!(
                    order_id = %order_id,
                    attempt = delivery.attempt,
                    error = %failure,
                    "Shipment arrangement failed"
                );
                Disposition::Requeue
            }
        }
    }
}
