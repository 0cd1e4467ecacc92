use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_choreography::api::{self, AppState};
use order_choreography::config::Config;
use order_choreography::events::ORDERS_EXCHANGE;
use order_choreography::messaging::{DeadLetterStore, EventPublisher, InMemoryBroker};
use order_choreography::metrics::Metrics;
use order_choreography::pipeline::Pipeline;
use order_choreography::stages::{SimulatedCarrier, SimulatedPaymentProcessor};
use order_choreography::store::InMemoryStore;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging, overridable via RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_choreography=debug")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("🚀 Starting order choreography pipeline");

    let metrics = Arc::new(Metrics::new()?);
    let dlq = Arc::new(DeadLetterStore::new());
    let broker = Arc::new(InMemoryBroker::new(
        config.broker(),
        dlq.clone(),
        metrics.clone(),
    ));
    let store = Arc::new(InMemoryStore::new());
    let publisher = Arc::new(EventPublisher::new(
        broker.clone(),
        ORDERS_EXCHANGE,
        config.publish_retry.clone(),
        dlq.clone(),
        metrics.clone(),
    ));

    let pipeline = Pipeline::start(
        broker,
        store.clone(),
        publisher,
        Arc::new(SimulatedPaymentProcessor::new(config.payment_latency)),
        Arc::new(SimulatedCarrier::new(config.shipping_latency)),
    )
    .await?;

    let state = web::Data::new(AppState {
        intake: pipeline.intake.clone(),
        store,
        dlq,
        metrics,
    });

    tracing::info!(
        host = %config.http_host,
        port = config.http_port,
        "📡 REST facade listening"
    );
    HttpServer::new(move || App::new().app_data(state.clone()).configure(api::configure))
        .bind((config.http_host.as_str(), config.http_port))?
        .run()
        .await?;

    Ok(())
}
