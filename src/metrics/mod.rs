use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

// ============================================================================
// Metrics - Prometheus observability for the pipeline
// ============================================================================
//
// Covers:
// - Events published per routing key, and publish failures
// - Deliveries per queue and disposition (ack / requeue / dead_letter)
// - Handler latency per queue
// - Dead letter totals
// - Circuit breaker state
//
// Scraped via GET /metrics on the REST server.
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub events_published: IntCounterVec,
    pub publish_failures: IntCounterVec,

    pub deliveries_total: IntCounterVec,
    pub handler_duration: HistogramVec,

    pub dead_letters_total: IntCounter,
    pub dead_letters_by_routing_key: IntCounterVec,

    pub breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let events_published = IntCounterVec::new(
            Opts::new("events_published_total", "Domain events published to the bus"),
            &["routing_key"],
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let publish_failures = IntCounterVec::new(
            Opts::new(
                "publish_failures_total",
                "Publishes that failed after the whole retry budget",
            ),
            &["routing_key"],
        )?;
        registry.register(Box::new(publish_failures.clone()))?;

        let deliveries_total = IntCounterVec::new(
            Opts::new("deliveries_total", "Message deliveries by queue and disposition"),
            &["queue", "disposition"],
        )?;
        registry.register(Box::new(deliveries_total.clone()))?;

        let handler_duration = HistogramVec::new(
            HistogramOpts::new("handler_duration_seconds", "Consumer handler latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["queue"],
        )?;
        registry.register(Box::new(handler_duration.clone()))?;

        let dead_letters_total = IntCounter::new(
            "dead_letters_total",
            "Messages routed to the dead letter store",
        )?;
        registry.register(Box::new(dead_letters_total.clone()))?;

        let dead_letters_by_routing_key = IntCounterVec::new(
            Opts::new("dead_letters_by_routing_key", "Dead letters by routing key"),
            &["routing_key"],
        )?;
        registry.register(Box::new(dead_letters_by_routing_key.clone()))?;

        let breaker_state = IntGauge::new(
            "publisher_breaker_state",
            "Publish circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(breaker_state.clone()))?;

        Ok(Self {
            registry,
            events_published,
            publish_failures,
            deliveries_total,
            handler_duration,
            dead_letters_total,
            dead_letters_by_routing_key,
            breaker_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_published(&self, routing_key: &str) {
        self.events_published.with_label_values(&[routing_key]).inc();
    }

    pub fn record_publish_failure(&self, routing_key: &str) {
        self.publish_failures.with_label_values(&[routing_key]).inc();
    }

    pub fn record_delivery(&self, queue: &str, disposition: &str, seconds: f64) {
        self.deliveries_total
            .with_label_values(&[queue, disposition])
            .inc();
        self.handler_duration
            .with_label_values(&[queue])
            .observe(seconds);
    }

    pub fn record_dead_letter(&self, routing_key: &str) {
        self.dead_letters_total.inc();
        self.dead_letters_by_routing_key
            .with_label_values(&[routing_key])
            .inc();
    }

    pub fn set_breaker_state(&self, state: i64) {
        self.breaker_state.set(state);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("failed to build metrics registry")
    }
}
