use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, QueueState};

pub fn create_queue_router(config: Arc<AppConfig>, state: QueueState) -> Router {
    let protected_routes = Router::new()
        .route("/queue/check-in", post(handlers::check_in))
        .route("/queue/call-next", put(handlers::call_next))
        .route("/queue/doctors/{doctor_id}/call-next", put(handlers::call_next_for_doctor))
        .route("/queue/{queue_id}/complete", put(handlers::complete))
        .route("/queue/doctor/current", get(handlers::current_doctor_queue))
        .route("/queue/doctors/{doctor_id}", get(handlers::doctor_queue))
        .route("/queue/my-status", get(handlers::my_status))
        .route("/queue/appointments/{appointment_id}", get(handlers::appointment_queue_status))
        .route("/appointments/{appointment_id}/status", put(handlers::update_appointment_status))
        .route("/appointments/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/appointments/{appointment_id}/meeting-link", put(handlers::add_meeting_link))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
