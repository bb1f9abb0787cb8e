use chrono::NaiveTime;
use thiserror::Error;
use uuid::Uuid;

use appointment_cell::models::AppointmentError;
use shared_models::error::{AppError, ErrorKind};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    #[error("Appointment is already checked in")]
    AlreadyCheckedIn,

    #[error("Appointment cannot be checked in: {0}")]
    InvalidAppointment(String),

    #[error("Check-in opens at {opens_at}")]
    CheckInNotOpen { opens_at: NaiveTime },

    #[error("A patient is already with the doctor; complete them first")]
    CurrentPatientActive,

    #[error("No patients are waiting")]
    QueueEmpty,

    #[error("Queue entry {0} is not the current patient")]
    NotCurrentPatient(Uuid),

    #[error("Queue entry not found")]
    EntryNotFound,

    #[error("No active queue entry")]
    NoActiveQueueEntry,

    #[error("Not authorized: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Appointment(#[from] AppointmentError),
}

impl QueueError {
    pub fn code(&self) -> &'static str {
        match self {
            QueueError::AlreadyCheckedIn => "ALREADY_CHECKED_IN",
            QueueError::InvalidAppointment(_) => "INVALID_APPOINTMENT",
            QueueError::CheckInNotOpen { .. } => "CHECK_IN_NOT_OPEN",
            QueueError::CurrentPatientActive => "CURRENT_PATIENT_ACTIVE",
            QueueError::QueueEmpty => "QUEUE_EMPTY",
            QueueError::NotCurrentPatient(_) => "NOT_CURRENT_PATIENT",
            QueueError::EntryNotFound => "QUEUE_ENTRY_NOT_FOUND",
            QueueError::NoActiveQueueEntry => "NO_ACTIVE_QUEUE_ENTRY",
            QueueError::Forbidden(_) => "FORBIDDEN",
            QueueError::Appointment(e) => e.code(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            QueueError::AlreadyCheckedIn
            | QueueError::InvalidAppointment(_)
            | QueueError::CheckInNotOpen { .. }
            | QueueError::CurrentPatientActive
            | QueueError::QueueEmpty
            | QueueError::NotCurrentPatient(_) => ErrorKind::Conflict,
            QueueError::EntryNotFound | QueueError::NoActiveQueueEntry => ErrorKind::NotFound,
            QueueError::Forbidden(_) => ErrorKind::Forbidden,
            QueueError::Appointment(e) => e.kind(),
        }
    }
}

impl From<QueueError> for AppError {
    fn from(e: QueueError) -> Self {
        AppError::rejected(e.kind(), e.code(), e.to_string())
    }
}
