use std::sync::Arc;

use crate::events::{routing_keys, ORDERS_EXCHANGE};
use crate::messaging::{DeliveryError, EventBus, EventPublisher};
use crate::stages::{CarrierGateway, IntakeStage, PaymentProcessor, PaymentStage, ShippingStage, StatusReconciler};
use crate::store::OrderStore;

// ============================================================================
// Pipeline - topology and stage wiring
// ============================================================================
//
// Declares the exchange/queue/binding topology and attaches every stage
// consumer. Declarations are idempotent, so the same wiring runs safely on
// every startup. Queue layout:
//
//   payment-queue    <- order.created
//   shipping-queue   <- order.paid
//   reconciler-queue <- order.paid, shipping.*
//
// ============================================================================

pub const PAYMENT_QUEUE: &str = "payment-queue";
pub const SHIPPING_QUEUE: &str = "shipping-queue";
pub const RECONCILER_QUEUE: &str = "reconciler-queue";

pub struct Pipeline {
    pub intake: Arc<IntakeStage>,
}

impl Pipeline {
    /// Declare the topology and start all stage consumers.
    pub async fn start(
        bus: Arc<dyn EventBus>,
        store: Arc<dyn OrderStore>,
        publisher: Arc<EventPublisher>,
        payment_processor: Arc<dyn PaymentProcessor>,
        carrier: Arc<dyn CarrierGateway>,
    ) -> Result<Self, DeliveryError> {
        bus.declare_exchange(ORDERS_EXCHANGE).await?;
        for queue in [PAYMENT_QUEUE, SHIPPING_QUEUE, RECONCILER_QUEUE] {
            bus.declare_queue(queue).await?;
        }
        bus.bind_queue(PAYMENT_QUEUE, ORDERS_EXCHANGE, routing_keys::ORDER_CREATED)
            .await?;
        bus.bind_queue(SHIPPING_QUEUE, ORDERS_EXCHANGE, routing_keys::ORDER_PAID)
            .await?;
        bus.bind_queue(RECONCILER_QUEUE, ORDERS_EXCHANGE, routing_keys::ORDER_PAID)
            .await?;
        bus.bind_queue(RECONCILER_QUEUE, ORDERS_EXCHANGE, "shipping.*")
            .await?;

        let payment = Arc::new(PaymentStage::new(
            store.clone(),
            publisher.clone(),
            payment_processor,
        ));
        let shipping = Arc::new(ShippingStage::new(store.clone(), publisher.clone(), carrier));
        let reconciler = Arc::new(StatusReconciler::new(store.clone()));

        bus.subscribe(PAYMENT_QUEUE, payment).await?;
        bus.subscribe(SHIPPING_QUEUE, shipping).await?;
        bus.subscribe(RECONCILER_QUEUE, reconciler).await?;

        let intake = Arc::new(IntakeStage::new(store, publisher));
        tracing::info!("🚚 Pipeline started, all stage consumers attached");

        Ok(Self { intake })
    }
}
