use std::sync::Arc;

use crate::domain::order::{Order, OrderDraft, OrderError};
use crate::events::OrderCreatedEvent;
use crate::messaging::EventPublisher;
use crate::store::OrderStore;

// ============================================================================
// Intake Stage
// ============================================================================
//
// Admits a new order: validates the draft, assigns identity, computes the
// total, persists it as PENDING, and announces it with `order.created`.
//
// "Order accepted" is decoupled from "event delivered": the publish runs in
// the background with its own retry budget, and an exhausted budget parks
// the event in the dead letter store. The caller's order exists either way.
//
// ============================================================================

pub struct IntakeStage {
    store: Arc<dyn OrderStore>,
    publisher: Arc<EventPublisher>,
}

impl IntakeStage {
    pub fn new(store: Arc<dyn OrderStore>, publisher: Arc<EventPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Validate and admit a draft. Fails with `OrderError::Validation`
    /// listing every violated field.
    pub async fn submit(&self, draft: OrderDraft) -> Result<Order, OrderError> {
        let order = self.store.create(draft).await?;
        tracing::info!(
            order_id = %order.id,
            customer_id = %order.customer_id,
            total = order.total,
            "🧾 Order admitted"
        );

        let event = OrderCreatedEvent::new(&order);
        let publisher = self.publisher.clone();
        tokio::spawn(async move {
            // failure is already retried, logged and dead-lettered inside
            // the publisher; nothing to surface to the intake caller
            let _ = publisher.publish(&event).await;
        });

        Ok(order)
    }
}
