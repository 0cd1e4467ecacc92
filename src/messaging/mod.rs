use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::utils::Transient;

pub mod broker;
pub mod dlq;
pub mod publisher;
pub mod topic;

pub use broker::{BrokerConfig, InMemoryBroker};
pub use dlq::{DeadLetter, DeadLetterStore, DlqStats};
pub use publisher::EventPublisher;

// ============================================================================
// Event Bus Abstraction
// ============================================================================
//
// A topic-routed publish/subscribe fabric: one exchange carrying domain
// events, durable queues bound by routing-key patterns. The bus is
// responsible only for delivery-with-acknowledgment and routing; it carries
// no business logic. Delivery is at-least-once: consumers must resolve every
// message to an explicit disposition, and anything short of an Ack leads to
// redelivery or the dead letter store.
//
// ============================================================================

/// One message handed to a consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub routing_key: String,
    pub payload: Vec<u8>,
    /// 1-based delivery attempt for this message on this queue
    pub attempt: u32,
    pub redelivered: bool,
}

impl Delivery {
    /// Decode the JSON payload into an event type.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }
}

/// What a consumer decided about one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processing committed; the message is done
    Ack,
    /// Transient failure; redeliver (bounded by the broker's attempt limit)
    Requeue,
    /// Unprocessable; hand straight to the dead letter store
    DeadLetter,
}

impl Disposition {
    pub fn label(&self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::Requeue => "requeue",
            Disposition::DeadLetter => "dead_letter",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("message bus channel is unavailable")]
    ChannelUnavailable,

    #[error("unknown exchange: {0}")]
    UnknownExchange(String),

    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    #[error("queue {0} already has a consumer")]
    ConsumerConflict(String),

    #[error("failed to encode event payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl Transient for DeliveryError {
    fn is_transient(&self) -> bool {
        // topology and encoding errors will not heal on retry
        matches!(self, DeliveryError::ChannelUnavailable)
    }
}

/// A long-lived consumer attached to one queue.
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn handle(&self, delivery: Delivery) -> Disposition;
}

/// The transport seam between stages and the broker. Declarations are
/// idempotent, so a stage can re-run them safely on every startup or
/// reconnect.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn declare_exchange(&self, exchange: &str) -> Result<(), DeliveryError>;

    async fn declare_queue(&self, queue: &str) -> Result<(), DeliveryError>;

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<(), DeliveryError>;

    /// Route `payload` to every queue whose binding matches `routing_key`.
    /// Fails with `DeliveryError::ChannelUnavailable` when the channel is
    /// down; retry/backoff policy belongs to the caller (see
    /// `EventPublisher`).
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
    ) -> Result<(), DeliveryError>;

    /// Attach the queue's consumer. At most one consumer per queue; the
    /// consumer is invoked once per delivered message.
    async fn subscribe(&self, queue: &str, consumer: Arc<dyn Consumer>) -> Result<(), DeliveryError>;
}
