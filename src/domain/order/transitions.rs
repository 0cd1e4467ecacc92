use super::aggregate::Order;

// ============================================================================
// Transition Evidence & Outcome
// ============================================================================

/// What justifies a status transition. Pipeline events carry the facts the
/// transition needs (e.g. the tracking number for SHIPPED); manual overrides
/// record that an operator intervened.
#[derive(Debug, Clone)]
pub enum TransitionEvidence {
    PaymentCaptured { reference: Option<String> },
    ShipmentArranged { tracking_number: String },
    ManualOverride { reason: Option<String> },
}

impl TransitionEvidence {
    pub fn kind(&self) -> &'static str {
        match self {
            TransitionEvidence::PaymentCaptured { .. } => "payment_captured",
            TransitionEvidence::ShipmentArranged { .. } => "shipment_arranged",
            TransitionEvidence::ManualOverride { .. } => "manual_override",
        }
    }
}

/// Result of an `apply_transition` call.
///
/// `AlreadyApplied` is the idempotent no-op path: re-delivering the event
/// that caused a transition must not be an error, or duplicate deliveries
/// would poison the queue.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Applied(Order),
    AlreadyApplied(Order),
}

impl TransitionOutcome {
    pub fn order(&self) -> &Order {
        match self {
            TransitionOutcome::Applied(order) | TransitionOutcome::AlreadyApplied(order) => order,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            TransitionOutcome::Applied(order) | TransitionOutcome::AlreadyApplied(order) => order,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}
