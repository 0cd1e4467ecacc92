use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::order::{Order, OrderDraft, OrderError, OrderStatus, TransitionEvidence, TransitionOutcome};

use super::OrderStore;

// ============================================================================
// In-Memory Order Store
// ============================================================================
//
// Concurrent map keyed by order id. `get_mut` holds the map's per-key lock
// for the duration of a transition, which gives the single-writer-per-order
// discipline: two events for the same order serialize, events for different
// orders proceed in parallel.
//
// ============================================================================

#[derive(Default)]
pub struct InMemoryStore {
    orders: DashMap<Uuid, Order>,
    // listing preserves insertion order, which DashMap does not
    insertion_order: Mutex<Vec<Uuid>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn create(&self, draft: OrderDraft) -> Result<Order, OrderError> {
        let order = Order::from_draft(draft)?;

        self.insertion_order
            .lock()
            .expect("insertion order lock poisoned")
            .push(order.id);
        self.orders.insert(order.id, order.clone());

        tracing::debug!(order_id = %order.id, total = order.total, "Order persisted");
        Ok(order)
    }

    async fn get(&self, id: Uuid) -> Result<Order, OrderError> {
        self.orders
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or(OrderError::NotFound(id))
    }

    async fn list(&self, status: Option<OrderStatus>) -> Vec<Order> {
        let ids = self
            .insertion_order
            .lock()
            .expect("insertion order lock poisoned")
            .clone();

        ids.iter()
            .filter_map(|id| self.orders.get(id).map(|entry| entry.clone()))
            .filter(|order| status.map_or(true, |wanted| order.status == wanted))
            .collect()
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        target: OrderStatus,
        evidence: TransitionEvidence,
    ) -> Result<TransitionOutcome, OrderError> {
        let mut entry = self.orders.get_mut(&id).ok_or(OrderError::NotFound(id))?;
        entry.transition(target, &evidence)
    }
}
