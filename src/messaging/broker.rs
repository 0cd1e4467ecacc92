use async_trait::async_trait;
use futures_util::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};

use crate::messaging::{topic, Consumer, DeadLetterStore, Delivery, DeliveryError, Disposition, EventBus};
use crate::metrics::Metrics;

// ============================================================================
// In-Memory Topic Broker
// ============================================================================
//
// In-process backend for the EventBus trait: one dispatch task per consumed
// queue, per-queue worker concurrency, attempt counting with bounded
// redelivery, and dead-letter hand-off. Messages survive until a consumer
// acks them (or exhausts the redelivery budget) for the lifetime of the
// process; a networked broker backend slots in behind the same trait for
// cross-process durability.
//
// A panicking handler never acknowledged its delivery, so the message is
// requeued exactly like an explicit Requeue.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Delivery attempts per message before it is dead-lettered
    pub max_delivery_attempts: u32,
    /// Concurrent handler invocations per queue
    pub worker_concurrency: usize,
    /// Pause before a requeued message is redelivered
    pub requeue_delay: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_delivery_attempts: 3,
            worker_concurrency: 4,
            requeue_delay: Duration::from_millis(50),
        }
    }
}

struct Pending {
    routing_key: String,
    payload: Vec<u8>,
    attempt: u32,
}

struct QueueHandle {
    name: String,
    tx: mpsc::UnboundedSender<Pending>,
    // held until `subscribe` claims the queue
    rx: Mutex<Option<mpsc::UnboundedReceiver<Pending>>>,
}

#[derive(Clone)]
struct Binding {
    pattern: String,
    queue: String,
}

pub struct InMemoryBroker {
    config: BrokerConfig,
    exchanges: RwLock<HashMap<String, Vec<Binding>>>,
    queues: RwLock<HashMap<String, Arc<QueueHandle>>>,
    connected: AtomicBool,
    dlq: Arc<DeadLetterStore>,
    metrics: Arc<Metrics>,
}

impl InMemoryBroker {
    pub fn new(config: BrokerConfig, dlq: Arc<DeadLetterStore>, metrics: Arc<Metrics>) -> Self {
        Self {
            config,
            exchanges: RwLock::new(HashMap::new()),
            queues: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(true),
            dlq,
            metrics,
        }
    }

    /// Simulate losing the channel: publishes fail until `reopen`.
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        tracing::warn!("Broker channel closed");
    }

    pub fn reopen(&self) {
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!("Broker channel reopened");
    }

    fn dispatch_loop(
        &self,
        handle: Arc<QueueHandle>,
        mut rx: mpsc::UnboundedReceiver<Pending>,
        consumer: Arc<dyn Consumer>,
    ) {
        let queue = handle.name.clone();
        let requeue_tx = handle.tx.clone();
        let config = self.config.clone();
        let dlq = self.dlq.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            let workers = Arc::new(Semaphore::new(config.worker_concurrency.max(1)));
            tracing::info!(
                queue = %queue,
                concurrency = config.worker_concurrency,
                "Consumer attached"
            );

            while let Some(pending) = rx.recv().await {
                let permit = workers
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("worker semaphore closed");

                let queue = queue.clone();
                let requeue_tx = requeue_tx.clone();
                let config = config.clone();
                let dlq = dlq.clone();
                let metrics = metrics.clone();
                let consumer = consumer.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    deliver(queue, pending, consumer, requeue_tx, config, dlq, metrics).await;
                });
            }

            tracing::debug!(queue = %queue, "Dispatch loop ended");
        });
    }
}

async fn deliver(
    queue: String,
    pending: Pending,
    consumer: Arc<dyn Consumer>,
    requeue_tx: mpsc::UnboundedSender<Pending>,
    config: BrokerConfig,
    dlq: Arc<DeadLetterStore>,
    metrics: Arc<Metrics>,
) {
    let delivery = Delivery {
        routing_key: pending.routing_key.clone(),
        payload: pending.payload.clone(),
        attempt: pending.attempt,
        redelivered: pending.attempt > 1,
    };

    let started = Instant::now();
    let disposition = match AssertUnwindSafe(consumer.handle(delivery)).catch_unwind().await {
        Ok(disposition) => disposition,
        Err(_) => {
            // the handler died before acknowledging, same as a lost consumer
            tracing::error!(
                queue = %queue,
                routing_key = %pending.routing_key,
                attempt = pending.attempt,
                "Consumer panicked mid-delivery, requeueing"
            );
            Disposition::Requeue
        }
    };
    metrics.record_delivery(&queue, disposition.label(), started.elapsed().as_secs_f64());

    match disposition {
        Disposition::Ack => {
            tracing::trace!(queue = %queue, routing_key = %pending.routing_key, "Delivery acknowledged");
        }
        Disposition::Requeue => {
            if pending.attempt >= config.max_delivery_attempts {
                dlq.record(
                    &queue,
                    &pending.routing_key,
                    &pending.payload,
                    format!("redelivery budget exhausted after {} attempts", pending.attempt),
                    pending.attempt,
                );
                metrics.record_dead_letter(&pending.routing_key);
                return;
            }

            tracing::warn!(
                queue = %queue,
                routing_key = %pending.routing_key,
                attempt = pending.attempt,
                "Delivery rejected, scheduling redelivery"
            );
            tokio::time::sleep(config.requeue_delay).await;
            let requeued = Pending {
                routing_key: pending.routing_key,
                payload: pending.payload,
                attempt: pending.attempt + 1,
            };
            if requeue_tx.send(requeued).is_err() {
                tracing::error!(queue = %queue, "Queue dropped before redelivery");
            }
        }
        Disposition::DeadLetter => {
            dlq.record(
                &queue,
                &pending.routing_key,
                &pending.payload,
                "rejected by consumer",
                pending.attempt,
            );
            metrics.record_dead_letter(&pending.routing_key);
        }
    }
}

#[async_trait]
impl EventBus for InMemoryBroker {
    async fn declare_exchange(&self, exchange: &str) -> Result<(), DeliveryError> {
        self.exchanges
            .write()
            .await
            .entry(exchange.to_string())
            .or_default();
        Ok(())
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), DeliveryError> {
        let mut queues = self.queues.write().await;
        if !queues.contains_key(queue) {
            let (tx, rx) = mpsc::unbounded_channel();
            queues.insert(
                queue.to_string(),
                Arc::new(QueueHandle {
                    name: queue.to_string(),
                    tx,
                    rx: Mutex::new(Some(rx)),
                }),
            );
        }
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<(), DeliveryError> {
        if !self.queues.read().await.contains_key(queue) {
            return Err(DeliveryError::UnknownQueue(queue.to_string()));
        }

        let mut exchanges = self.exchanges.write().await;
        let bindings = exchanges
            .get_mut(exchange)
            .ok_or_else(|| DeliveryError::UnknownExchange(exchange.to_string()))?;

        let exists = bindings
            .iter()
            .any(|b| b.pattern == pattern && b.queue == queue);
        if !exists {
            bindings.push(Binding {
                pattern: pattern.to_string(),
                queue: queue.to_string(),
            });
            tracing::debug!(queue = %queue, exchange = %exchange, pattern = %pattern, "Queue bound");
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
    ) -> Result<(), DeliveryError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(DeliveryError::ChannelUnavailable);
        }

        let exchanges = self.exchanges.read().await;
        let bindings = exchanges
            .get(exchange)
            .ok_or_else(|| DeliveryError::UnknownExchange(exchange.to_string()))?;

        let queues = self.queues.read().await;
        let mut routed = 0usize;
        for binding in bindings {
            if !topic::matches(&binding.pattern, routing_key) {
                continue;
            }
            if let Some(handle) = queues.get(&binding.queue) {
                let pending = Pending {
                    routing_key: routing_key.to_string(),
                    payload: payload.clone(),
                    attempt: 1,
                };
                if handle.tx.send(pending).is_ok() {
                    routed += 1;
                }
            }
        }

        if routed == 0 {
            // topic exchange semantics: unroutable messages are dropped
            tracing::debug!(exchange = %exchange, routing_key = %routing_key, "No binding matched");
        } else {
            tracing::trace!(
                exchange = %exchange,
                routing_key = %routing_key,
                queues = routed,
                "Message routed"
            );
        }
        Ok(())
    }

    async fn subscribe(&self, queue: &str, consumer: Arc<dyn Consumer>) -> Result<(), DeliveryError> {
        let handle = self
            .queues
            .read()
            .await
            .get(queue)
            .cloned()
            .ok_or_else(|| DeliveryError::UnknownQueue(queue.to_string()))?;

        let rx = handle
            .rx
            .lock()
            .await
            .take()
            .ok_or_else(|| DeliveryError::ConsumerConflict(queue.to_string()))?;

        self.dispatch_loop(handle, rx, consumer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tokio::time::{sleep, timeout};

    fn broker(max_attempts: u32) -> (Arc<InMemoryBroker>, Arc<DeadLetterStore>) {
        let dlq = Arc::new(DeadLetterStore::new());
        let metrics = Arc::new(Metrics::default());
        let config = BrokerConfig {
            max_delivery_attempts: max_attempts,
            worker_concurrency: 4,
            requeue_delay: Duration::from_millis(1),
        };
        (
            Arc::new(InMemoryBroker::new(config, dlq.clone(), metrics)),
            dlq,
        )
    }

    struct Recording {
        deliveries: AtomicU32,
        disposition: Disposition,
    }

    #[async_trait]
    impl Consumer for Recording {
        async fn handle(&self, _delivery: Delivery) -> Disposition {
            self.deliveries.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.disposition
        }
    }

    async fn wait_for(check: impl Fn() -> bool) {
        timeout(Duration::from_secs(2), async {
            while !check() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn topology(broker: &InMemoryBroker, queue: &str, pattern: &str) {
        broker.declare_exchange("orders").await.unwrap();
        broker.declare_queue(queue).await.unwrap();
        broker.bind_queue(queue, "orders", pattern).await.unwrap();
    }

    #[tokio::test]
    async fn routes_by_binding_pattern() {
        let (broker, _) = broker(3);
        topology(&broker, "shipping-queue", "shipping.*").await;

        let consumer = Arc::new(Recording {
            deliveries: AtomicU32::new(0),
            disposition: Disposition::Ack,
        });
        broker
            .subscribe("shipping-queue", consumer.clone())
            .await
            .unwrap();

        broker
            .publish("orders", "shipping.arranged", b"{}".to_vec())
            .await
            .unwrap();
        broker
            .publish("orders", "order.created", b"{}".to_vec())
            .await
            .unwrap();

        wait_for(|| consumer.deliveries.load(std::sync::atomic::Ordering::SeqCst) == 1).await;
        // the non-matching key never arrives
        sleep(Duration::from_millis(20)).await;
        assert_eq!(consumer.deliveries.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn requeue_redelivers_until_budget_then_dead_letters() {
        let (broker, dlq) = broker(3);
        topology(&broker, "payment-queue", "order.created").await;

        let consumer = Arc::new(Recording {
            deliveries: AtomicU32::new(0),
            disposition: Disposition::Requeue,
        });
        broker
            .subscribe("payment-queue", consumer.clone())
            .await
            .unwrap();

        broker
            .publish("orders", "order.created", b"{}".to_vec())
            .await
            .unwrap();

        wait_for(|| dlq.len() == 1).await;
        assert_eq!(consumer.deliveries.load(std::sync::atomic::Ordering::SeqCst), 3);

        let entry = &dlq.entries(1)[0];
        assert_eq!(entry.source, "payment-queue");
        assert_eq!(entry.attempts, 3);
    }

    #[tokio::test]
    async fn explicit_dead_letter_skips_redelivery() {
        let (broker, dlq) = broker(5);
        topology(&broker, "payment-queue", "order.created").await;

        let consumer = Arc::new(Recording {
            deliveries: AtomicU32::new(0),
            disposition: Disposition::DeadLetter,
        });
        broker
            .subscribe("payment-queue", consumer.clone())
            .await
            .unwrap();

        broker
            .publish("orders", "order.created", b"{}".to_vec())
            .await
            .unwrap();

        wait_for(|| dlq.len() == 1).await;
        assert_eq!(consumer.deliveries.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_consumer_triggers_redelivery() {
        struct PanicsOnce {
            calls: AtomicU32,
        }

        #[async_trait]
        impl Consumer for PanicsOnce {
            async fn handle(&self, _delivery: Delivery) -> Disposition {
                if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                    panic!("handler crashed");
                }
                Disposition::Ack
            }
        }

        let (broker, dlq) = broker(3);
        topology(&broker, "payment-queue", "order.created").await;

        let consumer = Arc::new(PanicsOnce {
            calls: AtomicU32::new(0),
        });
        broker
            .subscribe("payment-queue", consumer.clone())
            .await
            .unwrap();

        broker
            .publish("orders", "order.created", b"{}".to_vec())
            .await
            .unwrap();

        wait_for(|| consumer.calls.load(std::sync::atomic::Ordering::SeqCst) == 2).await;
        assert!(dlq.is_empty());
    }

    #[tokio::test]
    async fn closed_channel_fails_publish() {
        let (broker, _) = broker(3);
        topology(&broker, "payment-queue", "order.created").await;

        broker.close();
        let err = broker
            .publish("orders", "order.created", b"{}".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::ChannelUnavailable));

        broker.reopen();
        assert!(broker
            .publish("orders", "order.created", b"{}".to_vec())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn declarations_are_idempotent() {
        let (broker, _) = broker(3);
        for _ in 0..3 {
            topology(&broker, "payment-queue", "order.created").await;
        }

        let consumer = Arc::new(Recording {
            deliveries: AtomicU32::new(0),
            disposition: Disposition::Ack,
        });
        broker
            .subscribe("payment-queue", consumer.clone())
            .await
            .unwrap();

        broker
            .publish("orders", "order.created", b"{}".to_vec())
            .await
            .unwrap();

        // a duplicated binding would deliver the message twice
        wait_for(|| consumer.deliveries.load(std::sync::atomic::Ordering::SeqCst) >= 1).await;
        sleep(Duration::from_millis(20)).await;
        assert_eq!(consumer.deliveries.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_consumer_on_same_queue_is_rejected() {
        let (broker, _) = broker(3);
        topology(&broker, "payment-queue", "order.created").await;

        let consumer = Arc::new(Recording {
            deliveries: AtomicU32::new(0),
            disposition: Disposition::Ack,
        });
        broker
            .subscribe("payment-queue", consumer.clone())
            .await
            .unwrap();
        let err = broker.subscribe("payment-queue", consumer).await.unwrap_err();
        assert!(matches!(err, DeliveryError::ConsumerConflict(_)));
    }

    #[tokio::test]
    async fn one_event_fans_out_to_every_matching_queue() {
        let (broker, _) = broker(3);
        broker.declare_exchange("orders").await.unwrap();
        for queue in ["shipping-queue", "reconciler-queue"] {
            broker.declare_queue(queue).await.unwrap();
            broker.bind_queue(queue, "orders", "order.paid").await.unwrap();
        }

        let shipping = Arc::new(Recording {
            deliveries: AtomicU32::new(0),
            disposition: Disposition::Ack,
        });
        let reconciler = Arc::new(Recording {
            deliveries: AtomicU32::new(0),
            disposition: Disposition::Ack,
        });
        broker.subscribe("shipping-queue", shipping.clone()).await.unwrap();
        broker
            .subscribe("reconciler-queue", reconciler.clone())
            .await
            .unwrap();

        broker
            .publish("orders", "order.paid", b"{}".to_vec())
            .await
            .unwrap();

        wait_for(|| {
            shipping.deliveries.load(std::sync::atomic::Ordering::SeqCst) == 1
                && reconciler.deliveries.load(std::sync::atomic::Ordering::SeqCst) == 1
        })
        .await;
    }

    #[tokio::test]
    async fn concurrent_deliveries_are_bounded_but_parallel() {
        let (broker, _) = broker(3);
        topology(&broker, "payment-queue", "order.created").await;

        struct Slow {
            concurrent: AtomicU32,
            peak: AtomicU32,
            done: AtomicU32,
        }

        #[async_trait]
        impl Consumer for Slow {
            async fn handle(&self, _delivery: Delivery) -> Disposition {
                let now = self.concurrent.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, std::sync::atomic::Ordering::SeqCst);
                sleep(Duration::from_millis(20)).await;
                self.concurrent.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                self.done.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Disposition::Ack
            }
        }

        let consumer = Arc::new(Slow {
            concurrent: AtomicU32::new(0),
            peak: AtomicU32::new(0),
            done: AtomicU32::new(0),
        });
        broker.subscribe("payment-queue", consumer.clone()).await.unwrap();

        for _ in 0..8 {
            broker
                .publish("orders", "order.created", b"{}".to_vec())
                .await
                .unwrap();
        }

        wait_for(|| consumer.done.load(std::sync::atomic::Ordering::SeqCst) == 8).await;
        let peak = consumer.peak.load(std::sync::atomic::Ordering::SeqCst);
        assert!(peak > 1, "deliveries never overlapped");
        assert!(peak <= 4, "worker concurrency limit exceeded (peak {peak})");
    }
}
