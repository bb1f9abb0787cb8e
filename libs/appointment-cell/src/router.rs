// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::booking::AppointmentBookingService;

/// Booking and listing routes. Paths are absolute so the binary can merge
/// this router alongside the queue routes that share the `/appointments` prefix.
pub fn appointment_routes(config: Arc<AppConfig>, service: Arc<AppointmentBookingService>) -> Router {
    let protected_routes = Router::new()
        .route("/appointments", post(handlers::create_appointment))
        .route("/appointments/mine", get(handlers::get_my_appointments))
        .route("/appointments/doctors/{doctor_id}", get(handlers::get_doctor_appointments))
        .route("/appointments/clinics/{clinic_id}", get(handlers::get_clinic_appointments))
        .route("/appointments/{appointment_id}", get(handlers::get_appointment))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(service)
}
