use std::time::Duration;

use crate::messaging::BrokerConfig;
use crate::utils::RetryPolicy;

// ============================================================================
// Runtime Configuration
// ============================================================================
//
// Everything is env-overridable with sensible defaults, e.g.
//   ORDERS_HTTP_PORT=8080 WORKER_CONCURRENCY=8 cargo run
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct Config {
    /// REST façade bind address
    pub http_host: String,
    pub http_port: u16,

    /// Concurrent handler invocations per queue
    pub worker_concurrency: usize,
    /// Delivery attempts per message before dead-lettering
    pub max_delivery_attempts: u32,
    /// Pause before a rejected message is redelivered
    pub requeue_delay: Duration,

    /// Retry budget for event publishes
    pub publish_retry: RetryPolicy,

    /// Simulated latency of the payment provider
    pub payment_latency: Duration,
    /// Simulated latency of the carrier
    pub shipping_latency: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_host: "0.0.0.0".to_string(),
            http_port: 3000,
            worker_concurrency: 4,
            max_delivery_attempts: 3,
            requeue_delay: Duration::from_millis(250),
            publish_retry: RetryPolicy::publish(),
            payment_latency: Duration::from_secs(2),
            shipping_latency: Duration::from_secs(3),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            http_host: env_string("ORDERS_HTTP_HOST", defaults.http_host),
            http_port: env_parse("ORDERS_HTTP_PORT", defaults.http_port),
            worker_concurrency: env_parse("WORKER_CONCURRENCY", defaults.worker_concurrency),
            max_delivery_attempts: env_parse("MAX_DELIVERY_ATTEMPTS", defaults.max_delivery_attempts),
            requeue_delay: Duration::from_millis(env_parse(
                "REQUEUE_DELAY_MS",
                defaults.requeue_delay.as_millis() as u64,
            )),
            publish_retry: RetryPolicy {
                max_attempts: env_parse(
                    "PUBLISH_RETRY_ATTEMPTS",
                    defaults.publish_retry.max_attempts,
                ),
                ..defaults.publish_retry
            },
            payment_latency: Duration::from_millis(env_parse(
                "PAYMENT_LATENCY_MS",
                defaults.payment_latency.as_millis() as u64,
            )),
            shipping_latency: Duration::from_millis(env_parse(
                "SHIPPING_LATENCY_MS",
                defaults.shipping_latency.as_millis() as u64,
            )),
        }
    }

    pub fn broker(&self) -> BrokerConfig {
        BrokerConfig {
            max_delivery_attempts: self.max_delivery_attempts,
            worker_concurrency: self.worker_concurrency,
            requeue_delay: self.requeue_delay,
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Unparseable env value, using default");
            default
        }),
        Err(_) => default,
    }
}
