use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::{Order, OrderStatus};

// ============================================================================
// Event Wire Contract
// ============================================================================
//
// The versioned contract every stage shares: routing keys, payload shapes,
// and the schema version consumers can use to reject or upcast future
// shapes. Events are immutable, append-only facts; any of them may be
// delivered more than once, so consumers must treat duplicates as no-ops.
//
// ============================================================================

/// Current version of every payload shape below.
pub const SCHEMA_VERSION: u16 = 1;

/// The single topic exchange all domain events are published to.
pub const ORDERS_EXCHANGE: &str = "orders";

/// Routing keys per event kind.
pub mod routing_keys {
    pub const ORDER_CREATED: &str = "order.created";
    pub const ORDER_PAID: &str = "order.paid";
    pub const SHIPPING_ARRANGED: &str = "shipping.arranged";
}

/// Common surface of every pipeline event: the routing key it publishes
/// under and the order it concerns.
pub trait DomainEvent: Serialize + Send + Sync {
    fn routing_key(&self) -> &'static str;
    fn order_id(&self) -> Uuid;
}

/// `order.created` - the full order snapshot emitted by intake.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedEvent {
    pub schema_version: u16,
    pub emitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub order: Order,
}

impl OrderCreatedEvent {
    pub fn new(order: &Order) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            emitted_at: Utc::now(),
            order: order.clone(),
        }
    }
}

impl DomainEvent for OrderCreatedEvent {
    fn routing_key(&self) -> &'static str {
        routing_keys::ORDER_CREATED
    }

    fn order_id(&self) -> Uuid {
        self.order.id
    }
}

/// `order.paid` - payment capture confirmed for an order.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderPaidEvent {
    pub schema_version: u16,
    pub emitted_at: DateTime<Utc>,
    pub order_id: Uuid,
    pub status: OrderStatus,
}

impl OrderPaidEvent {
    pub fn new(order_id: Uuid) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            emitted_at: Utc::now(),
            order_id,
            status: OrderStatus::Paid,
        }
    }
}

impl DomainEvent for OrderPaidEvent {
    fn routing_key(&self) -> &'static str {
        routing_keys::ORDER_PAID
    }

    fn order_id(&self) -> Uuid {
        self.order_id
    }
}

/// `shipping.arranged` - fulfillment dispatched, tracking reference assigned.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ShippingArrangedEvent {
    pub schema_version: u16,
    pub emitted_at: DateTime<Utc>,
    pub order_id: Uuid,
    pub tracking_number: String,
}

impl ShippingArrangedEvent {
    pub fn new(order_id: Uuid, tracking_number: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            emitted_at: Utc::now(),
            order_id,
            tracking_number: tracking_number.into(),
        }
    }
}

impl DomainEvent for ShippingArrangedEvent {
    fn routing_key(&self) -> &'static str {
        routing_keys::SHIPPING_ARRANGED
    }

    fn order_id(&self) -> Uuid {
        self.order_id
    }
}
