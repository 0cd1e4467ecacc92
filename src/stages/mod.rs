use uuid::Uuid;

// ============================================================================
// Pipeline Stages
// ============================================================================
//
// Intake admits orders and emits `order.created`; payment and shipping are
// long-lived consumers that publish their own facts; the reconciler folds
// those facts back into the order store. Stages communicate only through
// the event bus, never by calling each other.
//
// ============================================================================

pub mod intake;
pub mod payment;
pub mod reconciler;
pub mod shipping;

pub use intake::IntakeStage;
pub use payment::{PaymentConfirmation, PaymentProcessor, PaymentStage, SimulatedPaymentProcessor};
pub use reconciler::StatusReconciler;
pub use shipping::{CarrierGateway, ShippingStage, SimulatedCarrier};

/// A stage-specific capture/fulfillment failure. Triggers redelivery up to
/// the broker's attempt budget, then the message is dead-lettered.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{stage} failed for order {order_id}: {reason}")]
pub struct ProcessingFailure {
    pub stage: &'static str,
    pub order_id: Uuid,
    pub reason: String,
}

impl ProcessingFailure {
    pub fn new(stage: &'static str, order_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            stage,
            order_id,
            reason: reason.into(),
        }
    }
}
