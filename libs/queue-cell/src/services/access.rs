use uuid::Uuid;

use appointment_cell::models::{Actor, Appointment};
use appointment_cell::services::booking::can_view;

use crate::error::QueueError;

fn is_owner_or_staff(actor: Actor, appointment: &Appointment) -> bool {
    match actor {
        Actor::Patient(id) => appointment.is_owned_by(id),
        Actor::Doctor(_) => false,
        Actor::Staff { .. } | Actor::Admin => actor.is_staff_of(appointment.clinic_id),
    }
}

/// The owning patient, clinic staff or an admin may check a patient in.
pub fn ensure_can_check_in(actor: Actor, appointment: &Appointment) -> Result<(), QueueError> {
    is_owner_or_staff(actor, appointment)
        .then_some(())
        .ok_or_else(|| QueueError::Forbidden("cannot check in this appointment".to_string()))
}

/// The doctor themselves or staff of their clinic. When the clinic is
/// unknown only unscoped staff and admins qualify.
pub fn ensure_can_manage_queue(
    actor: Actor,
    doctor_id: Uuid,
    clinic_id: Option<Uuid>,
) -> Result<(), QueueError> {
    let allowed = match actor {
        Actor::Doctor(id) => id == doctor_id,
        Actor::Patient(_) => false,
        Actor::Admin | Actor::Staff { clinic_id: None } => true,
        Actor::Staff { .. } => clinic_id.map_or(false, |c| actor.is_staff_of(c)),
    };
    allowed
        .then_some(())
        .ok_or_else(|| QueueError::Forbidden("not allowed to manage this doctor's queue".to_string()))
}

/// Completion and meeting details: the appointment's doctor or clinic staff.
pub fn ensure_can_treat(actor: Actor, appointment: &Appointment) -> Result<(), QueueError> {
    ensure_can_manage_queue(actor, appointment.doctor_id, Some(appointment.clinic_id))
}

/// Cancellation: the owning patient or clinic staff.
pub fn ensure_can_cancel(actor: Actor, appointment: &Appointment) -> Result<(), QueueError> {
    is_owner_or_staff(actor, appointment)
        .then_some(())
        .ok_or_else(|| QueueError::Forbidden("cannot cancel this appointment".to_string()))
}

pub fn ensure_can_view(actor: Actor, appointment: &Appointment) -> Result<(), QueueError> {
    can_view(appointment, actor)
        .then_some(())
        .ok_or_else(|| QueueError::Forbidden("not allowed to view this appointment".to_string()))
}
