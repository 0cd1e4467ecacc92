use serde::Serialize;
use uuid::Uuid;

use super::value_objects::OrderStatus;

// ============================================================================
// Order Error Taxonomy
// ============================================================================
//
// Validation and NotFound are caller errors, surfaced synchronously and never
// retried. InvalidTransition marks a guard violation: either a logic bug or a
// legitimately stale event, so it is rejected rather than retried.
//
// ============================================================================

/// One violated constraint in an order draft.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order validation failed: {}", format_violations(.0))]
    Validation(Vec<FieldViolation>),

    #[error("order {0} not found")]
    NotFound(Uuid),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

fn format_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
