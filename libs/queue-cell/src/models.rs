use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use appointment_cell::models::{AppointmentStatus, AppointmentType, MeetingDetails};

// ==============================================================================
// QUEUE ENTRY
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Waiting,
    InProgress,
    Completed,
    Cancelled,
}

impl QueueStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Cancelled)
    }

    pub fn can_transition_to(&self, target: &QueueStatus) -> bool {
        use QueueStatus::*;
        matches!(
            (self, target),
            (Waiting, InProgress) | (Waiting, Cancelled) | (InProgress, Completed) | (InProgress, Cancelled)
        )
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueStatus::Waiting => write!(f, "WAITING"),
            QueueStatus::InProgress => write!(f, "IN_PROGRESS"),
            QueueStatus::Completed => write!(f, "COMPLETED"),
            QueueStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A checked-in appointment's place in its doctor's daily queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub queue_id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub date: NaiveDate,
    pub token: u32,
    pub status: QueueStatus,
    pub check_in_time: DateTime<Utc>,
    pub called_time: Option<DateTime<Utc>>,
    pub completed_time: Option<DateTime<Utc>>,
    pub cancelled_time: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(self.doctor_id, self.date)
    }
}

/// Scope of one doctor's queue: token counter and current-patient slot
/// reset every calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
}

impl SessionKey {
    pub fn new(doctor_id: Uuid, date: NaiveDate) -> Self {
        Self { doctor_id, date }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.doctor_id, self.date)
    }
}

// ==============================================================================
// READ MODELS
// ==============================================================================

/// Queue entry annotated for display. `position` and `estimated_wait_minutes`
/// are recomputed on every read and only present while WAITING.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntryView {
    pub queue_id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub token: u32,
    pub status: QueueStatus,
    pub position: Option<u32>,
    pub estimated_wait_minutes: Option<u32>,
    pub check_in_time: DateTime<Utc>,
    pub called_time: Option<DateTime<Utc>>,
    pub completed_time: Option<DateTime<Utc>>,
    pub cancelled_time: Option<DateTime<Utc>>,
    pub appointment_time: Option<NaiveTime>,
    pub appointment_type: Option<AppointmentType>,
    /// Dependant's name when booked for someone else.
    pub patient_name: Option<String>,
    pub meeting: Option<MeetingDetails>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueuePhase {
    /// A patient is with the doctor.
    Serving,
    /// Nobody is with the doctor but patients are waiting for a call.
    AwaitingCall,
    /// Nobody is with the doctor and nobody is waiting.
    Idle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorQueueSnapshot {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub current_patient: Option<QueueEntryView>,
    pub waiting_patients: Vec<QueueEntryView>,
    pub completed_patients: Vec<QueueEntryView>,
    pub total_seen_today: u32,
    pub average_consultation_minutes: u32,
    pub generated_at: DateTime<Utc>,
}

impl DoctorQueueSnapshot {
    /// `current_patient` is `None` both between calls and when the queue is
    /// empty; the waiting list tells them apart.
    pub fn phase(&self) -> QueuePhase {
        match (&self.current_patient, self.waiting_patients.is_empty()) {
            (Some(_), _) => QueuePhase::Serving,
            (None, false) => QueuePhase::AwaitingCall,
            (None, true) => QueuePhase::Idle,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientQueueStatus {
    pub appointment_id: Uuid,
    pub appointment_status: AppointmentStatus,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub entry: QueueEntryView,
    /// Token of the patient currently with the doctor, if any.
    pub now_serving_token: Option<u32>,
}

// ==============================================================================
// SETTINGS
// ==============================================================================

/// When a patient may check in on the day of their appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CheckInPolicy {
    #[default]
    AnyTimeOnDate,
    /// Check-in opens this many minutes before the appointment time.
    OpensBefore { minutes: u32 },
}

impl CheckInPolicy {
    /// Earliest local time check-in is accepted for an appointment at `appointment_time`.
    pub fn opens_at(&self, appointment_time: NaiveTime) -> Option<NaiveTime> {
        match self {
            CheckInPolicy::AnyTimeOnDate => None,
            CheckInPolicy::OpensBefore { minutes } => {
                let lead = chrono::Duration::minutes(i64::from(*minutes));
                // Saturates at midnight instead of wrapping into the previous day.
                if appointment_time.signed_duration_since(NaiveTime::MIN) <= lead {
                    Some(NaiveTime::MIN)
                } else {
                    Some(appointment_time - lead)
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub default_consultation_minutes: u32,
    pub check_in_policy: CheckInPolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            default_consultation_minutes: 15,
            check_in_policy: CheckInPolicy::AnyTimeOnDate,
        }
    }
}

impl QueueSettings {
    pub fn from_config(config: &shared_config::AppConfig) -> Self {
        Self {
            default_consultation_minutes: config.default_consultation_minutes,
            check_in_policy: match config.check_in_opens_minutes_before {
                Some(minutes) => CheckInPolicy::OpensBefore { minutes },
                None => CheckInPolicy::AnyTimeOnDate,
            },
        }
    }
}

// ==============================================================================
// REQUESTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInRequest {
    pub appointment_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompleteRequest {
    pub notes: Option<String>,
}
