use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::order::{OrderError, OrderStatus, TransitionEvidence};
use crate::events::{routing_keys, OrderPaidEvent, ShippingArrangedEvent, SCHEMA_VERSION};
use crate::messaging::{Consumer, Delivery, Disposition};
use crate::store::OrderStore;

// ============================================================================
// Status Reconciler
// ============================================================================
//
// Folds payment and shipping confirmations back into the order store, so
// that a read reflects the pipeline's true progress without a manual status
// PATCH. Duplicate deliveries land on the idempotent AlreadyApplied path; an
// unknown order or a guard violation (a stale `order.paid` after a cancel)
// is dead-lettered for follow-up, never applied and never dropped silently.
//
// ============================================================================

pub struct StatusReconciler {
    store: Arc<dyn OrderStore>,
}

impl StatusReconciler {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    async fn reconcile(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        evidence: TransitionEvidence,
    ) -> Disposition {
        match self.store.apply_transition(order_id, target, evidence).await {
            Ok(outcome) if outcome.was_applied() => {
                tracing::info!(order_id = %order_id, status = %target, "✅ Order status reconciled");
                Disposition::Ack
            }
            Ok(_) => {
                tracing::debug!(order_id = %order_id, status = %target, "Already reconciled, duplicate delivery");
                Disposition::Ack
            }
            Err(OrderError::NotFound(_)) => {
                tracing::error!(order_id = %order_id, status = %target, "Event for unknown order");
                Disposition::DeadLetter
            }
            Err(OrderError::InvalidTransition { from, to }) => {
                tracing::warn!(
                    order_id = %order_id,
                    from = %from,
                    to = %to,
                    "Stale event rejected by transition guard"
                );
                Disposition::DeadLetter
            }
            Err(error) => {
                tracing::error!(order_id = %order_id, error = %error, "Reconciliation failed");
                Disposition::DeadLetter
            }
        }
    }
}

#[async_trait]
impl Consumer for StatusReconciler {
    async fn handle(&self, delivery: Delivery) -> Disposition {
        match delivery.routing_key.as_str() {
            routing_keys::ORDER_PAID => {
                let event: OrderPaidEvent = match delivery.json() {
                    Ok(event) => event,
                    Err(error) => {
                        tracing::warn!(error = %error, "Malformed order.paid payload");
                        return Disposition::DeadLetter;
                    }
                };
                if event.schema_version > SCHEMA_VERSION {
                    tracing::warn!(schema_version = event.schema_version, "Unsupported order.paid schema");
                    return Disposition::DeadLetter;
                }
                self.reconcile(
                    event.order_id,
                    OrderStatus::Paid,
                    TransitionEvidence::PaymentCaptured { reference: None },
                )
                .await
            }
            routing_keys::SHIPPING_ARRANGED => {
                let event: ShippingArrangedEvent = match delivery.json() {
                    Ok(event) => event,
                    Err(error) => {
                        tracing::warn!(error = %error, "Malformed shipping.arranged payload");
                        return Disposition::DeadLetter;
                    }
                };
                if event.schema_version > SCHEMA_VERSION {
                    tracing::warn!(
                        schema_version = event.schema_version,
                        "Unsupported shipping.arranged schema"
                    );
                    return Disposition::DeadLetter;
                }
                self.reconcile(
                    event.order_id,
                    OrderStatus::Shipped,
                    TransitionEvidence::ShipmentArranged {
                        tracking_number: event.tracking_number,
                    },
                )
                .await
            }
            other => {
                tracing::warn!(routing_key = %other, "Unexpected routing key on reconciler queue");
                Disposition::DeadLetter
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderDraft, OrderItem, ShippingAddress};
    use crate::store::InMemoryStore;

    fn draft() -> OrderDraft {
        OrderDraft {
            customer_id: "customer-1".into(),
            items: vec![OrderItem {
                isbn: "A".into(),
                quantity: 2,
                price: 10.0,
            }],
            shipping_address: ShippingAddress {
                street: "1 Main St".into(),
                city: "Metropolis".into(),
                country: "US".into(),
                zip_code: "00001".into(),
            },
        }
    }

    fn paid_delivery(order_id: Uuid) -> Delivery {
        Delivery {
            routing_key: routing_keys::ORDER_PAID.into(),
            payload: serde_json::to_vec(&OrderPaidEvent::new(order_id)).unwrap(),
            attempt: 1,
            redelivered: false,
        }
    }

    fn arranged_delivery(order_id: Uuid, tracking: &str) -> Delivery {
        Delivery {
            routing_key: routing_keys::SHIPPING_ARRANGED.into(),
            payload: serde_json::to_vec(&ShippingArrangedEvent::new(order_id, tracking)).unwrap(),
            attempt: 1,
            redelivered: false,
        }
    }

    #[tokio::test]
    async fn folds_payment_and_shipping_into_the_store() {
        let store = Arc::new(InMemoryStore::new());
        let reconciler = StatusReconciler::new(store.clone());
        let order = store.create(draft()).await.unwrap();

        assert_eq!(
            reconciler.handle(paid_delivery(order.id)).await,
            Disposition::Ack
        );
        assert_eq!(store.get(order.id).await.unwrap().status, OrderStatus::Paid);

        assert_eq!(
            reconciler.handle(arranged_delivery(order.id, "TRK-7")).await,
            Disposition::Ack
        );
        let shipped = store.get(order.id).await.unwrap();
        assert_eq!(shipped.status, OrderStatus::Shipped);
        assert_eq!(shipped.tracking_number.as_deref(), Some("TRK-7"));
    }

    #[tokio::test]
    async fn duplicate_event_is_acked_without_effect() {
        let store = Arc::new(InMemoryStore::new());
        let reconciler = StatusReconciler::new(store.clone());
        let order = store.create(draft()).await.unwrap();

        assert_eq!(reconciler.handle(paid_delivery(order.id)).await, Disposition::Ack);
        let updated_at = store.get(order.id).await.unwrap().updated_at;

        assert_eq!(reconciler.handle(paid_delivery(order.id)).await, Disposition::Ack);
        let after = store.get(order.id).await.unwrap();
        assert_eq!(after.status, OrderStatus::Paid);
        assert_eq!(after.updated_at, updated_at);
    }

    #[tokio::test]
    async fn stale_paid_event_after_cancel_is_dead_lettered() {
        let store = Arc::new(InMemoryStore::new());
        let reconciler = StatusReconciler::new(store.clone());
        let order = store.create(draft()).await.unwrap();

        store
            .apply_transition(
                order.id,
                OrderStatus::Cancelled,
                TransitionEvidence::ManualOverride { reason: None },
            )
            .await
            .unwrap();

        assert_eq!(
            reconciler.handle(paid_delivery(order.id)).await,
            Disposition::DeadLetter
        );
        assert_eq!(
            store.get(order.id).await.unwrap().status,
            OrderStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn unknown_order_is_dead_lettered() {
        let store = Arc::new(InMemoryStore::new());
        let reconciler = StatusReconciler::new(store);

        assert_eq!(
            reconciler.handle(paid_delivery(Uuid::new_v4())).await,
            Disposition::DeadLetter
        );
    }

    #[tokio::test]
    async fn unexpected_routing_key_is_dead_lettered() {
        let store = Arc::new(InMemoryStore::new());
        let reconciler = StatusReconciler::new(store);

        let delivery = Delivery {
            routing_key: "order.created".into(),
            payload: b"{}".to_vec(),
            attempt: 1,
            redelivered: false,
        };
        assert_eq!(reconciler.handle(delivery).await, Disposition::DeadLetter);
    }
}
