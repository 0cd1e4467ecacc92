use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::draft::OrderDraft;
use super::errors::OrderError;
use super::transitions::{TransitionEvidence, TransitionOutcome};
use super::value_objects::{OrderItem, OrderStatus, ShippingAddress};

// ============================================================================
// Order Aggregate
// ============================================================================
//
// The single source of truth for one purchase order. Created exactly once by
// intake; after that, only `transition` mutates it. The total is computed at
// creation and never recomputed, and the identifier never changes.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub status: OrderStatus,
    pub total: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tracking_number: Option<String>,
}

impl Order {
    /// Admit a draft: validate, assign identity, compute the total, start in
    /// PENDING.
    pub fn from_draft(draft: OrderDraft) -> Result<Self, OrderError> {
        draft.validate()?;

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            total: draft.total(),
            customer_id: draft.customer_id,
            items: draft.items,
            shipping_address: draft.shipping_address,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            tracking_number: None,
        })
    }

    /// Move the order to `target` if the state machine allows it.
    ///
    /// Re-applying the current status is an idempotent no-op so that
    /// duplicate event deliveries cannot corrupt state. A transition to
    /// SHIPPED records the tracking number carried by the evidence.
    pub fn transition(
        &mut self,
        target: OrderStatus,
        evidence: &TransitionEvidence,
    ) -> Result<TransitionOutcome, OrderError> {
        if self.status == target {
            return Ok(TransitionOutcome::AlreadyApplied(self.clone()));
        }

        if !self.status.can_become(target) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }

        self.status = target;
        self.updated_at = Utc::now();

        if target == OrderStatus::Shipped {
            if let TransitionEvidence::ShipmentArranged { tracking_number } = evidence {
                self.tracking_number = Some(tracking_number.clone());
            }
        }

        Ok(TransitionOutcome::Applied(self.clone()))
    }
}
