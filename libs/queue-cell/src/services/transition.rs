use std::sync::Arc;

use tracing::{debug, instrument, warn};
use uuid::Uuid;

use appointment_cell::models::{Actor, Appointment, AppointmentError, AppointmentStatus, MeetingPlatform};

use crate::error::QueueError;
use crate::services::access;
use crate::services::engine::QueueEngine;

/// Applies appointment status changes requested by clients, routing each
/// through the queue engine so the appointment and its queue entry move together.
pub struct StatusTransitionController {
    engine: Arc<QueueEngine>,
}

impl StatusTransitionController {
    pub fn new(engine: Arc<QueueEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<QueueEngine> {
        &self.engine
    }

    /// Move an appointment to `target`.
    ///
    /// CHECKED_IN runs a check-in, COMPLETED completes the appointment's
    /// current queue entry and CANCELLED cancels. IN_PROGRESS is only reachable
    /// through call-next, so requesting it directly is an invalid transition.
    #[instrument(skip(self, notes))]
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        target: AppointmentStatus,
        notes: Option<&str>,
        actor: Actor,
    ) -> Result<Appointment, QueueError> {
        let appointment = self.engine.store().get(appointment_id).await?;
        access::ensure_can_view(actor, &appointment)?;

        if appointment.status.is_terminal() {
            warn!(
                "Status change to {} rejected: appointment {} is {}",
                target, appointment_id, appointment.status
            );
            return Err(AppointmentError::TerminalStateViolation(appointment.status).into());
        }

        match target {
            AppointmentStatus::CheckedIn => {
                self.engine.check_in(appointment_id, actor).await?;
            }
            AppointmentStatus::Completed => {
                access::ensure_can_treat(actor, &appointment)?;
                self.engine
                    .lifecycle()
                    .validate_status_transition(appointment.status, target)?;
                self.engine.complete_appointment(&appointment, notes).await?;
            }
            AppointmentStatus::Cancelled => {
                return self
                    .cancel(appointment_id, notes.map(str::to_string), actor)
                    .await;
            }
            AppointmentStatus::InProgress | AppointmentStatus::Booked => {
                debug!("Direct transition to {} is not allowed", target);
                return Err(AppointmentError::InvalidStatusTransition {
                    from: appointment.status,
                    to: target,
                }
                .into());
            }
        }

        Ok(self.engine.store().get(appointment_id).await?)
    }

    /// Cancel by the owning patient or clinic staff. A checked-in entry is
    /// marked CANCELLED and drops out of position counting.
    #[instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        reason: Option<String>,
        actor: Actor,
    ) -> Result<Appointment, QueueError> {
        let appointment = self.engine.store().get(appointment_id).await?;
        access::ensure_can_cancel(actor, &appointment)?;

        if appointment.status.is_terminal() {
            return Err(AppointmentError::TerminalStateViolation(appointment.status).into());
        }

        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        self.engine.cancel_appointment(&appointment, reason).await
    }

    /// Metadata only; never changes status.
    #[instrument(skip(self, link))]
    pub async fn add_meeting_link(
        &self,
        appointment_id: Uuid,
        link: &str,
        platform: Option<MeetingPlatform>,
        actor: Actor,
    ) -> Result<Appointment, QueueError> {
        let appointment = self.engine.store().get(appointment_id).await?;
        access::ensure_can_treat(actor, &appointment)?;

        self.engine.attach_meeting(&appointment, link, platform).await
    }
}
