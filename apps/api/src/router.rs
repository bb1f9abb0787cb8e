use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use appointment_cell::router::appointment_routes;
use appointment_cell::services::booking::AppointmentBookingService;
use queue_cell::{create_queue_router, QueueState};
use shared_config::AppConfig;

pub fn create_router(
    config: Arc<AppConfig>,
    booking: Arc<AppointmentBookingService>,
    queue: QueueState,
) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic queue API is running!" }))
        .route("/health", get(health))
        .merge(appointment_routes(config.clone(), booking))
        .merge(create_queue_router(config, queue))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
