use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use appointment_cell::models::{
    Actor, AddMeetingLinkRequest, CancelAppointmentRequest, UpdateStatusRequest,
};
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CheckInRequest, CompleteRequest};
use crate::services::engine::QueueEngine;
use crate::services::transition::StatusTransitionController;

#[derive(Clone)]
pub struct QueueState {
    pub engine: Arc<QueueEngine>,
    pub controller: Arc<StatusTransitionController>,
}

impl QueueState {
    pub fn new(engine: Arc<QueueEngine>) -> Self {
        let controller = Arc::new(StatusTransitionController::new(engine.clone()));
        Self { engine, controller }
    }
}

#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    pub date: Option<NaiveDate>,
}

fn calling_doctor(user: &User) -> Result<(Actor, Uuid), AppError> {
    match Actor::from_user(user)? {
        actor @ Actor::Doctor(id) => Ok((actor, id)),
        _ => Err(AppError::Forbidden("only doctors have their own queue".to_string())),
    }
}

// ==============================================================================
// QUEUE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn check_in(
    State(state): State<QueueState>,
    Extension(user): Extension<User>,
    Json(request): Json<CheckInRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = Actor::from_user(&user)?;
    let entry = state.engine.check_in(request.appointment_id, actor).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "queue_entry": entry,
            "message": format!("Checked in with token {}", entry.token)
        })),
    ))
}

#[axum::debug_handler]
pub async fn call_next(
    State(state): State<QueueState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let (actor, doctor_id) = calling_doctor(&user)?;
    let entry = state.engine.call_next(doctor_id, actor).await?;

    Ok(Json(json!({ "queue_entry": entry })))
}

#[axum::debug_handler]
pub async fn call_next_for_doctor(
    State(state): State<QueueState>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = Actor::from_user(&user)?;
    let entry = state.engine.call_next(doctor_id, actor).await?;

    Ok(Json(json!({ "queue_entry": entry })))
}

#[axum::debug_handler]
pub async fn complete(
    State(state): State<QueueState>,
    Path(queue_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = Actor::from_user(&user)?;
    let entry = state
        .engine
        .complete(queue_id, request.notes.as_deref(), actor)
        .await?;

    Ok(Json(json!({ "queue_entry": entry })))
}

#[axum::debug_handler]
pub async fn current_doctor_queue(
    State(state): State<QueueState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let (actor, doctor_id) = calling_doctor(&user)?;
    let snapshot = state.engine.snapshot(doctor_id, actor).await?;

    Ok(Json(json!({
        "snapshot": snapshot,
        "phase": snapshot.phase()
    })))
}

#[axum::debug_handler]
pub async fn doctor_queue(
    State(state): State<QueueState>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SnapshotQuery>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = Actor::from_user(&user)?;
    let date = query.date.unwrap_or_else(|| state.engine.today());
    let snapshot = state.engine.snapshot_for(doctor_id, date, actor).await?;

    Ok(Json(json!({
        "snapshot": snapshot,
        "phase": snapshot.phase()
    })))
}

#[axum::debug_handler]
pub async fn my_status(
    State(state): State<QueueState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = Actor::from_user(&user)?;
    let statuses = state.engine.my_status(actor).await?;

    Ok(Json(json!({ "queue": statuses })))
}

#[axum::debug_handler]
pub async fn appointment_queue_status(
    State(state): State<QueueState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = Actor::from_user(&user)?;
    let status = state.engine.patient_status(appointment_id, actor).await?;

    Ok(Json(json!({ "status": status })))
}

// ==============================================================================
// APPOINTMENT STATUS HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<QueueState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = Actor::from_user(&user)?;
    let appointment = state
        .controller
        .update_status(appointment_id, request.status, request.notes.as_deref(), actor)
        .await?;

    Ok(Json(json!({
        "appointment": appointment,
        "message": format!("Appointment is now {}", appointment.status)
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<QueueState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = Actor::from_user(&user)?;
    let appointment = state
        .controller
        .cancel(appointment_id, request.reason, actor)
        .await?;

    Ok(Json(json!({
        "appointment": appointment,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn add_meeting_link(
    State(state): State<QueueState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<AddMeetingLinkRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = Actor::from_user(&user)?;
    let appointment = state
        .controller
        .add_meeting_link(appointment_id, &request.meeting_link, request.meeting_platform, actor)
        .await?;

    Ok(Json(json!({ "appointment": appointment })))
}
