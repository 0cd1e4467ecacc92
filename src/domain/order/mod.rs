// ============================================================================
// Order Domain
// ============================================================================
//
// Everything order-specific lives here:
// - Value objects (OrderItem, ShippingAddress, OrderStatus)
// - The draft customers submit and its validation
// - The Order aggregate and its status state machine
// - Transition evidence/outcome types
// - The error taxonomy
//
// ============================================================================

pub mod aggregate;
pub mod draft;
pub mod errors;
pub mod transitions;
pub mod value_objects;

pub use aggregate::Order;
pub use draft::OrderDraft;
pub use errors::{FieldViolation, OrderError};
pub use transitions::{TransitionEvidence, TransitionOutcome};
pub use value_objects::{OrderItem, OrderStatus, ShippingAddress};
