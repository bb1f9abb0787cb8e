// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use shared_models::auth::User;
use shared_models::error::ErrorKind;
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub booked_by: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub appointment_type: AppointmentType,
    pub booking_for: BookingFor,
    pub payment_mode: PaymentMode,
    pub notes: Option<String>,
    pub clinical_notes: Option<String>,
    pub meeting: Option<MeetingDetails>,
    pub status: AppointmentStatus,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn is_online(&self) -> bool {
        self.appointment_type == AppointmentType::Online
    }

    /// Whether this caller booked the appointment or is the patient on it.
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.patient_id == user_id || self.booked_by == user_id
    }

    /// Name of a dependant patient; `None` when booked for the account holder.
    pub fn dependant_name(&self) -> Option<&str> {
        match &self.booking_for {
            BookingFor::Myself => None,
            BookingFor::Other(details) => Some(details.name.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Booked,
    CheckedIn,
    InProgress,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }

    /// BOOKED, CHECKED_IN and IN_PROGRESS count against the one-open-appointment
    /// per patient/doctor/day invariant.
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Booked => write!(f, "BOOKED"),
            AppointmentStatus::CheckedIn => write!(f, "CHECKED_IN"),
            AppointmentStatus::InProgress => write!(f, "IN_PROGRESS"),
            AppointmentStatus::Completed => write!(f, "COMPLETED"),
            AppointmentStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentType {
    #[serde(alias = "online")]
    Online,
    #[serde(alias = "in_person")]
    InPerson,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    Online,
    InPerson,
}

/// Who the appointment is for. A dependant carries their own details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "patient", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingFor {
    #[serde(rename = "SELF")]
    Myself,
    Other(PatientDetails),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientDetails {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeetingDetails {
    pub link: String,
    pub platform: MeetingPlatform,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeetingPlatform {
    #[default]
    GoogleMeet,
    Zoom,
    MicrosoftTeams,
    Other,
}

// ==============================================================================
// DOCTOR DIRECTORY MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorProfile {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub name: String,
    pub specialization: Option<String>,
    #[serde(default = "default_true")]
    pub is_available: bool,
    /// Daily window in `HH:MM-HH:MM` form; `None` means no restriction.
    pub available_slots: Option<String>,
    pub average_consultation_minutes: Option<u32>,
}

fn default_true() -> bool {
    true
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingForKind {
    #[serde(rename = "SELF", alias = "self")]
    Myself,
    #[serde(alias = "other")]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub appointment_type: AppointmentType,
    pub booking_for: BookingForKind,
    pub patient_details: Option<PatientDetails>,
    pub payment_mode: Option<PaymentMode>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMeetingLinkRequest {
    pub meeting_link: String,
    pub meeting_platform: Option<MeetingPlatform>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentFilter {
    pub patient_id: Option<Uuid>,
    pub booked_by: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub clinic_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub status: Option<AppointmentStatus>,
}

impl AppointmentFilter {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        // patient_id and booked_by widen each other: "mine" means either
        let owner_ok = match (self.patient_id, self.booked_by) {
            (None, None) => true,
            (Some(p), None) => appointment.patient_id == p,
            (None, Some(b)) => appointment.booked_by == b,
            (Some(p), Some(b)) => appointment.patient_id == p || appointment.booked_by == b,
        };

        owner_ok
            && self.doctor_id.map_or(true, |d| appointment.doctor_id == d)
            && self.clinic_id.map_or(true, |c| appointment.clinic_id == c)
            && self.date.map_or(true, |d| appointment.appointment_date == d)
            && self.status.map_or(true, |s| appointment.status == s)
    }
}

// ==============================================================================
// CALLER IDENTITY
// ==============================================================================

/// The authenticated party performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Patient(Uuid),
    Doctor(Uuid),
    /// Clinic staff; `None` clinic means not scoped to a single clinic.
    Staff { clinic_id: Option<Uuid> },
    Admin,
}

impl Actor {
    /// Resolve the caller from a validated token. Patients and doctors must
    /// carry a UUID subject; staff scope comes from `user_metadata.clinic_id`.
    pub fn from_user(user: &User) -> Result<Self, AppointmentError> {
        let subject = || {
            user.uuid().ok_or_else(|| {
                AppointmentError::Unauthorized("token subject is not a valid user id".to_string())
            })
        };

        match user.role.as_deref() {
            Some("patient") => Ok(Actor::Patient(subject()?)),
            Some("doctor") => Ok(Actor::Doctor(subject()?)),
            Some("staff") => Ok(Actor::Staff {
                clinic_id: user.clinic_id(),
            }),
            Some("admin") => Ok(Actor::Admin),
            other => Err(AppointmentError::Unauthorized(format!(
                "role {} cannot use this service",
                other.unwrap_or("<none>")
            ))),
        }
    }

    pub fn is_staff_of(&self, clinic_id: Uuid) -> bool {
        match self {
            Actor::Staff { clinic_id: None } | Actor::Admin => true,
            Actor::Staff { clinic_id: Some(own) } => *own == clinic_id,
            _ => false,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::Patient(id) | Actor::Doctor(id) => Some(*id),
            _ => None,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error, PartialEq)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Doctor not available: {0}")]
    DoctorUnavailable(String),

    #[error("Patient already has an open appointment with this doctor on that date")]
    DuplicateBooking,

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid meeting link: {0}")]
    InvalidMeetingLink(String),

    #[error("Clinical notes are required to complete a visit")]
    NotesRequired,

    #[error("Appointment is already {0} and cannot change")]
    TerminalStateViolation(AppointmentStatus),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Appointment store unavailable: {0}")]
    StoreUnavailable(String),
}

impl AppointmentError {
    pub fn code(&self) -> &'static str {
        match self {
            AppointmentError::NotFound => "APPOINTMENT_NOT_FOUND",
            AppointmentError::DoctorNotFound => "DOCTOR_NOT_FOUND",
            AppointmentError::DoctorUnavailable(_) => "DOCTOR_UNAVAILABLE",
            AppointmentError::DuplicateBooking => "DUPLICATE_BOOKING",
            AppointmentError::InvalidTime(_) => "INVALID_TIME",
            AppointmentError::ValidationError(_) => "VALIDATION_ERROR",
            AppointmentError::InvalidMeetingLink(_) => "INVALID_MEETING_LINK",
            AppointmentError::NotesRequired => "NOTES_REQUIRED",
            AppointmentError::TerminalStateViolation(_) => "TERMINAL_STATE_VIOLATION",
            AppointmentError::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            AppointmentError::Unauthorized(_) => "FORBIDDEN",
            AppointmentError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppointmentError::NotFound | AppointmentError::DoctorNotFound => ErrorKind::NotFound,
            AppointmentError::InvalidTime(_)
            | AppointmentError::ValidationError(_)
            | AppointmentError::InvalidMeetingLink(_)
            | AppointmentError::NotesRequired => ErrorKind::Validation,
            AppointmentError::DoctorUnavailable(_)
            | AppointmentError::DuplicateBooking
            | AppointmentError::TerminalStateViolation(_)
            | AppointmentError::InvalidStatusTransition { .. } => ErrorKind::Conflict,
            AppointmentError::Unauthorized(_) => ErrorKind::Forbidden,
            AppointmentError::StoreUnavailable(_) => ErrorKind::Unavailable,
        }
    }
}

impl From<AppointmentError> for shared_models::error::AppError {
    fn from(e: AppointmentError) -> Self {
        shared_models::error::AppError::rejected(e.kind(), e.code(), e.to_string())
    }
}

// ==============================================================================
// VALIDATION RULES
// ==============================================================================

#[derive(Debug, Clone)]
pub struct AppointmentValidationRules {
    pub max_notes_length: usize,
    pub max_advance_booking_days: i64,
    pub min_patient_name_length: usize,
    pub max_patient_name_length: usize,
    pub max_patient_age: u32,
}

impl Default for AppointmentValidationRules {
    fn default() -> Self {
        Self {
            max_notes_length: 500,
            max_advance_booking_days: 90,
            min_patient_name_length: 2,
            max_patient_name_length: 100,
            max_patient_age: 150,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_serializes_in_screaming_case() {
        assert_eq!(json!(AppointmentStatus::CheckedIn), json!("CHECKED_IN"));
        let parsed: AppointmentStatus = serde_json::from_value(json!("IN_PROGRESS")).unwrap();
        assert_eq!(parsed, AppointmentStatus::InProgress);
    }

    #[test]
    fn booking_for_round_trips_as_closed_variant() {
        let own: BookingFor = serde_json::from_value(json!({ "kind": "SELF" })).unwrap();
        assert_eq!(own, BookingFor::Myself);

        let other: BookingFor = serde_json::from_value(json!({
            "kind": "OTHER",
            "patient": { "name": "Asha", "age": 67, "gender": "Female", "phone": "9876543210" }
        }))
        .unwrap();
        assert!(matches!(other, BookingFor::Other(ref d) if d.name == "Asha"));
    }

    #[test]
    fn terminal_states() {
        assert!(AppointmentStatus::Completed.is_terminal());
        assert!(AppointmentStatus::Cancelled.is_terminal());
        assert!(AppointmentStatus::InProgress.is_open());
    }

    #[test]
    fn staff_scope() {
        let clinic = Uuid::new_v4();
        assert!(Actor::Staff { clinic_id: Some(clinic) }.is_staff_of(clinic));
        assert!(!Actor::Staff { clinic_id: Some(Uuid::new_v4()) }.is_staff_of(clinic));
        assert!(Actor::Admin.is_staff_of(clinic));
        assert!(!Actor::Patient(Uuid::new_v4()).is_staff_of(clinic));
    }

    #[test]
    fn actor_from_token_roles() {
        let id = Uuid::new_v4();
        let user = |role: &str, metadata: Option<serde_json::Value>| User {
            id: id.to_string(),
            email: None,
            role: Some(role.to_string()),
            metadata,
            created_at: None,
        };

        assert_eq!(Actor::from_user(&user("patient", None)).unwrap(), Actor::Patient(id));
        assert_eq!(Actor::from_user(&user("doctor", None)).unwrap(), Actor::Doctor(id));
        assert_eq!(
            Actor::from_user(&user("staff", Some(json!({ "clinic_id": id.to_string() })))).unwrap(),
            Actor::Staff { clinic_id: Some(id) }
        );
        assert!(Actor::from_user(&user("nurse", None)).is_err());
    }
}
