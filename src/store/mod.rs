use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::order::{Order, OrderDraft, OrderError, OrderStatus, TransitionEvidence, TransitionOutcome};

mod memory;

pub use memory::InMemoryStore;

// ============================================================================
// Order Aggregate Store
// ============================================================================
//
// The only shared mutable resource in the pipeline. All mutation flows
// through `create` and `apply_transition`; both must be safe under
// concurrent invocation for different orders and serialize writes to the
// same order. The trait keeps the state machine independent of the backend:
// the in-memory map here, a durable store in production.
//
// ============================================================================

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Admit a draft as a new PENDING order. Fails with
    /// `OrderError::Validation` listing every violated field.
    async fn create(&self, draft: OrderDraft) -> Result<Order, OrderError>;

    /// Fetch one order. Fails with `OrderError::NotFound`.
    async fn get(&self, id: Uuid) -> Result<Order, OrderError>;

    /// All orders in insertion order, optionally filtered by status.
    async fn list(&self, status: Option<OrderStatus>) -> Vec<Order>;

    /// Drive the status state machine. Idempotent: re-applying the current
    /// status returns `TransitionOutcome::AlreadyApplied`. A guard violation
    /// fails with `OrderError::InvalidTransition` and leaves the order
    /// untouched.
    async fn apply_transition(
        &self,
        id: Uuid,
        target: OrderStatus,
        evidence: TransitionEvidence,
    ) -> Result<TransitionOutcome, OrderError>;
}
