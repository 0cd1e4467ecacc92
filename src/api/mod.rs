use actix_web::{web, HttpResponse, Responder};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::order::{OrderDraft, OrderError, OrderStatus, TransitionEvidence};
use crate::messaging::DeadLetterStore;
use crate::metrics::Metrics;
use crate::stages::IntakeStage;
use crate::store::OrderStore;

// ============================================================================
// REST Facade
// ============================================================================
//
// A thin collaborator over the store and the intake stage; no pipeline logic
// lives here. Routes:
//
//   POST   /orders             create an order (emits order.created)
//   GET    /orders/{id}        read one order
//   GET    /orders?status=     list orders
//   PATCH  /orders/{id}/status manual status override
//   DELETE /orders/{id}        cancel (a status change, never a removal)
//   GET    /health             liveness
//   GET    /metrics            Prometheus exposition
//   GET    /dlq                dead letter inspection
//
// ============================================================================

pub struct AppState {
    pub intake: Arc<IntakeStage>,
    pub store: Arc<dyn OrderStore>,
    pub dlq: Arc<DeadLetterStore>,
    pub metrics: Arc<Metrics>,
}

impl actix_web::ResponseError for OrderError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            OrderError::Validation(_) => StatusCode::BAD_REQUEST,
            OrderError::NotFound(_) => StatusCode::NOT_FOUND,
            OrderError::InvalidTransition { .. } => StatusCode::CONFLICT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            OrderError::Validation(violations) => serde_json::json!({
                "error": "Invalid order format",
                "details": violations,
            }),
            OrderError::NotFound(_) => serde_json::json!({
                "error": "Order not found",
            }),
            OrderError::InvalidTransition { from, to } => serde_json::json!({
                "error": "Invalid status transition",
                "from": from,
                "to": to,
            }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

#[derive(Deserialize)]
struct ListQuery {
    status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusPatch {
    status: String,
}

async fn create_order(
    state: web::Data<AppState>,
    draft: web::Json<OrderDraft>,
) -> Result<HttpResponse, OrderError> {
    let order = state.intake.submit(draft.into_inner()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Order created successfully",
        "order": order,
    })))
}

async fn get_order(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, OrderError> {
    let order = state.store.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(order))
}

async fn list_orders(
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, OrderError> {
    let status = match &query.status {
        Some(raw) => Some(raw.parse::<OrderStatus>().map_err(|message| {
            OrderError::Validation(vec![crate::domain::order::FieldViolation::new(
                "status", message,
            )])
        })?),
        None => None,
    };
    Ok(HttpResponse::Ok().json(state.store.list(status).await))
}

async fn patch_status(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    patch: web::Json<StatusPatch>,
) -> Result<HttpResponse, OrderError> {
    let target = patch.status.parse::<OrderStatus>().map_err(|message| {
        OrderError::Validation(vec![crate::domain::order::FieldViolation::new(
            "status", message,
        )])
    })?;

    let outcome = state
        .store
        .apply_transition(
            path.into_inner(),
            target,
            TransitionEvidence::ManualOverride { reason: None },
        )
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Order status updated",
        "order": outcome.into_order(),
    })))
}

async fn cancel_order(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, OrderError> {
    let outcome = state
        .store
        .apply_transition(
            path.into_inner(),
            OrderStatus::Cancelled,
            TransitionEvidence::ManualOverride {
                reason: Some("cancelled via API".to_string()),
            },
        )
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Order cancelled",
        "order": outcome.into_order(),
    })))
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "UP",
        "service": "order-choreography",
    }))
}

async fn metrics(state: web::Data<AppState>) -> HttpResponse {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry().gather();
    let mut buffer = Vec::new();
    if let Err(error) = encoder.encode(&families, &mut buffer) {
        tracing::error!(error = %error, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn dead_letters(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "stats": state.dlq.stats(),
        "messages": state.dlq.entries(100),
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/orders", web::post().to(create_order))
        .route("/orders", web::get().to(list_orders))
        .route("/orders/{id}", web::get().to(get_order))
        .route("/orders/{id}/status", web::patch().to(patch_status))
        .route("/orders/{id}", web::delete().to(cancel_order))
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics))
        .route("/dlq", web::get().to(dead_letters));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ORDERS_EXCHANGE;
    use crate::messaging::{BrokerConfig, EventBus, EventPublisher, InMemoryBroker};
    use crate::utils::RetryPolicy;
    use actix_web::{test, App};

    async fn state() -> web::Data<AppState> {
        let dlq = Arc::new(DeadLetterStore::new());
        let metrics = Arc::new(Metrics::default());
        let broker = Arc::new(InMemoryBroker::new(
            BrokerConfig::default(),
            dlq.clone(),
            metrics.clone(),
        ));
        broker.declare_exchange(ORDERS_EXCHANGE).await.unwrap();

        let store: Arc<dyn OrderStore> = Arc::new(crate::store::InMemoryStore::new());
        let publisher = Arc::new(EventPublisher::new(
            broker,
            ORDERS_EXCHANGE,
            RetryPolicy::once(),
            dlq.clone(),
            metrics.clone(),
        ));
        let intake = Arc::new(IntakeStage::new(store.clone(), publisher));

        web::Data::new(AppState {
            intake,
            store,
            dlq,
            metrics,
        })
    }

    fn draft_json() -> serde_json::Value {
        serde_json::json!({
            "customerId": "customer-1",
            "items": [{"isbn": "A", "quantity": 2, "price": 10.0}],
            "shippingAddress": {
                "street": "1 Main St", "city": "Metropolis",
                "country": "US", "zipCode": "00001"
            }
        })
    }

    #[actix_web::test]
    async fn create_then_get_round_trips() {
        let app =
            test::init_service(App::new().app_data(state().await).configure(configure)).await;

        let created: serde_json::Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::post()
                .uri("/orders")
                .set_json(draft_json())
                .to_request(),
        )
        .await;
        assert_eq!(created["order"]["status"], "PENDING");
        assert_eq!(created["order"]["total"], 20.0);

        let id = created["order"]["id"].as_str().unwrap();
        let fetched: serde_json::Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri(&format!("/orders/{id}"))
                .to_request(),
        )
        .await;
        assert_eq!(fetched["id"], created["order"]["id"]);
    }

    #[actix_web::test]
    async fn invalid_draft_returns_400_with_details() {
        let app =
            test::init_service(App::new().app_data(state().await).configure(configure)).await;

        let mut body = draft_json();
        body["items"] = serde_json::json!([]);
        body["shippingAddress"]["city"] = serde_json::json!("");

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/orders")
                .set_json(body)
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), 400);

        let payload: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(payload["details"].as_array().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn unknown_order_returns_404() {
        let app =
            test::init_service(App::new().app_data(state().await).configure(configure)).await;

        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/orders/{}", Uuid::new_v4()))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), 404);
    }

    #[actix_web::test]
    async fn cancel_is_a_status_change_and_guards_hold() {
        let app =
            test::init_service(App::new().app_data(state().await).configure(configure)).await;

        let created: serde_json::Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::post()
                .uri("/orders")
                .set_json(draft_json())
                .to_request(),
        )
        .await;
        let id = created["order"]["id"].as_str().unwrap().to_string();

        let cancelled: serde_json::Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::delete()
                .uri(&format!("/orders/{id}"))
                .to_request(),
        )
        .await;
        assert_eq!(cancelled["order"]["status"], "CANCELLED");

        // a manual override cannot resurrect the order
        let response = test::call_service(
            &app,
            test::TestRequest::patch()
                .uri(&format!("/orders/{id}/status"))
                .set_json(serde_json::json!({"status": "PAID"}))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), 409);
    }

    #[actix_web::test]
    async fn list_filters_by_status() {
        let app =
            test::init_service(App::new().app_data(state().await).configure(configure)).await;

        for _ in 0..2 {
            let _: serde_json::Value = test::call_and_read_body_json(
                &app,
                test::TestRequest::post()
                    .uri("/orders")
                    .set_json(draft_json())
                    .to_request(),
            )
            .await;
        }

        let pending: serde_json::Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/orders?status=PENDING")
                .to_request(),
        )
        .await;
        assert_eq!(pending.as_array().unwrap().len(), 2);

        let shipped: serde_json::Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/orders?status=SHIPPED")
                .to_request(),
        )
        .await;
        assert_eq!(shipped.as_array().unwrap().len(), 0);

        let bad = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/orders?status=BOGUS")
                .to_request(),
        )
        .await;
        assert_eq!(bad.status(), 400);
    }

    #[actix_web::test]
    async fn health_and_metrics_respond() {
        let app =
            test::init_service(App::new().app_data(state().await).configure(configure)).await;

        let health = test::call_service(&app, test::TestRequest::get().uri("/health").to_request())
            .await;
        assert!(health.status().is_success());

        let metrics =
            test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
        assert!(metrics.status().is_success());
    }
}
