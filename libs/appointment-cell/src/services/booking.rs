// libs/appointment-cell/src/services/booking.rs
use std::sync::{Arc, LazyLock};

use chrono::{Duration as ChronoDuration, NaiveDate};
use regex::Regex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_utils::Clock;

use crate::models::{
    Actor, Appointment, AppointmentError, AppointmentFilter, AppointmentStatus,
    AppointmentValidationRules, BookingFor, BookingForKind, CreateAppointmentRequest,
    DoctorProfile, PatientDetails, PaymentMode,
};
use crate::services::directory::{AvailabilityWindow, DoctorDirectory};
use crate::services::store::AppointmentStore;

static GENDER_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(Male|Female|Other)$"));
static PHONE_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[0-9]{10,15}$"));

pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    directory: Arc<dyn DoctorDirectory>,
    clock: Arc<dyn Clock>,
    validation_rules: AppointmentValidationRules,
}

impl AppointmentBookingService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        directory: Arc<dyn DoctorDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_rules(store, directory, clock, AppointmentValidationRules::default())
    }

    pub fn with_rules(
        store: Arc<dyn AppointmentStore>,
        directory: Arc<dyn DoctorDirectory>,
        clock: Arc<dyn Clock>,
        validation_rules: AppointmentValidationRules,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            validation_rules,
        }
    }

    /// Book an appointment. The caller must be a patient; the appointment is
    /// either for themselves or for a dependant with their own details.
    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id))]
    pub async fn create(
        &self,
        request: CreateAppointmentRequest,
        actor: Actor,
    ) -> Result<Appointment, AppointmentError> {
        let booked_by = match actor {
            Actor::Patient(id) => id,
            _ => {
                return Err(AppointmentError::Unauthorized(
                    "only patients can book appointments".to_string(),
                ))
            }
        };

        self.validate_date(request.appointment_date)?;
        self.validate_notes(request.notes.as_deref())?;

        let booking_for = match request.booking_for {
            BookingForKind::Myself => BookingFor::Myself,
            BookingForKind::Other => {
                let details = request.patient_details.clone().ok_or_else(|| {
                    AppointmentError::ValidationError(
                        "patient_details are required when booking for someone else".to_string(),
                    )
                })?;
                BookingFor::Other(self.validate_patient_details(details)?)
            }
        };

        let doctor = self
            .directory
            .get_doctor(request.doctor_id)
            .await?
            .ok_or(AppointmentError::DoctorNotFound)?;
        self.check_doctor_availability(&doctor, &request)?;

        let patient_id = match booking_for {
            BookingFor::Myself => booked_by,
            BookingFor::Other(_) => Uuid::new_v4(),
        };

        let now = self.clock.now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id: doctor.id,
            clinic_id: doctor.clinic_id,
            booked_by,
            appointment_date: request.appointment_date,
            appointment_time: request.appointment_time,
            appointment_type: request.appointment_type,
            booking_for,
            payment_mode: request.payment_mode.unwrap_or(PaymentMode::InPerson),
            notes: request.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            clinical_notes: None,
            meeting: None,
            status: AppointmentStatus::Booked,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };

        let stored = self.store.insert(appointment).await.map_err(|e| {
            if e == AppointmentError::DuplicateBooking {
                warn!("Duplicate booking for patient {} with doctor {}", patient_id, doctor.id);
            }
            e
        })?;

        info!(
            "Appointment {} booked with doctor {} on {} at {}",
            stored.id, stored.doctor_id, stored.appointment_date, stored.appointment_time
        );
        Ok(stored)
    }

    /// Single appointment, visible to its owner, its doctor, clinic staff and admins.
    pub async fn get(&self, appointment_id: Uuid, actor: Actor) -> Result<Appointment, AppointmentError> {
        let appointment = self.store.get(appointment_id).await?;
        if !can_view(&appointment, actor) {
            return Err(AppointmentError::Unauthorized(
                "not allowed to view this appointment".to_string(),
            ));
        }
        Ok(appointment)
    }

    /// Appointments booked by or for the caller, newest date first.
    pub async fn list_mine(&self, actor: Actor) -> Result<Vec<Appointment>, AppointmentError> {
        let user_id = match actor {
            Actor::Patient(id) => id,
            _ => {
                return Err(AppointmentError::Unauthorized(
                    "only patients have personal bookings".to_string(),
                ))
            }
        };

        let mut appointments = self
            .store
            .list(&AppointmentFilter {
                patient_id: Some(user_id),
                booked_by: Some(user_id),
                ..Default::default()
            })
            .await?;
        appointments.reverse();
        Ok(appointments)
    }

    pub async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        date: Option<NaiveDate>,
        actor: Actor,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut filter = AppointmentFilter {
            doctor_id: Some(doctor_id),
            date,
            ..Default::default()
        };

        match actor {
            Actor::Doctor(id) if id == doctor_id => {}
            Actor::Admin | Actor::Staff { clinic_id: None } => {}
            Actor::Staff { clinic_id: Some(clinic_id) } => filter.clinic_id = Some(clinic_id),
            _ => {
                return Err(AppointmentError::Unauthorized(
                    "not allowed to view this doctor's appointments".to_string(),
                ))
            }
        }

        self.store.list(&filter).await
    }

    pub async fn list_for_clinic(
        &self,
        clinic_id: Uuid,
        date: Option<NaiveDate>,
        actor: Actor,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        if !actor.is_staff_of(clinic_id) {
            return Err(AppointmentError::Unauthorized(
                "not a member of this clinic".to_string(),
            ));
        }

        self.store
            .list(&AppointmentFilter {
                clinic_id: Some(clinic_id),
                date,
                ..Default::default()
            })
            .await
    }

    fn validate_date(&self, date: NaiveDate) -> Result<(), AppointmentError> {
        let today = self.clock.today();
        if date < today {
            return Err(AppointmentError::InvalidTime(format!(
                "{} is in the past",
                date
            )));
        }

        let horizon = today + ChronoDuration::days(self.validation_rules.max_advance_booking_days);
        if date > horizon {
            return Err(AppointmentError::InvalidTime(format!(
                "cannot book more than {} days ahead",
                self.validation_rules.max_advance_booking_days
            )));
        }

        Ok(())
    }

    fn validate_notes(&self, notes: Option<&str>) -> Result<(), AppointmentError> {
        match notes {
            Some(n) if n.chars().count() > self.validation_rules.max_notes_length => {
                Err(AppointmentError::ValidationError(format!(
                    "Notes cannot exceed {} characters",
                    self.validation_rules.max_notes_length
                )))
            }
            _ => Ok(()),
        }
    }

    fn validate_patient_details(&self, details: PatientDetails) -> Result<PatientDetails, AppointmentError> {
        let rules = &self.validation_rules;
        let name = details.name.trim().to_string();
        let name_len = name.chars().count();

        if name_len < rules.min_patient_name_length || name_len > rules.max_patient_name_length {
            return Err(AppointmentError::ValidationError(format!(
                "Patient name must be between {} and {} characters",
                rules.min_patient_name_length, rules.max_patient_name_length
            )));
        }

        if details.age == 0 || details.age > rules.max_patient_age {
            return Err(AppointmentError::ValidationError(format!(
                "Patient age must be between 1 and {}",
                rules.max_patient_age
            )));
        }

        let gender_regex = GENDER_PATTERN
            .as_ref()
            .map_err(|e| AppointmentError::ValidationError(e.to_string()))?;
        if !gender_regex.is_match(details.gender.trim()) {
            return Err(AppointmentError::ValidationError(
                "Gender must be Male, Female, or Other".to_string(),
            ));
        }

        let phone_regex = PHONE_PATTERN
            .as_ref()
            .map_err(|e| AppointmentError::ValidationError(e.to_string()))?;
        if !phone_regex.is_match(details.phone.trim()) {
            return Err(AppointmentError::ValidationError(
                "Phone number must be 10-15 digits".to_string(),
            ));
        }

        Ok(PatientDetails {
            name,
            age: details.age,
            gender: details.gender.trim().to_string(),
            phone: details.phone.trim().to_string(),
        })
    }

    fn check_doctor_availability(
        &self,
        doctor: &DoctorProfile,
        request: &CreateAppointmentRequest,
    ) -> Result<(), AppointmentError> {
        if !doctor.is_available {
            warn!("Booking rejected: doctor {} is not accepting appointments", doctor.id);
            return Err(AppointmentError::DoctorUnavailable(format!(
                "{} is not accepting appointments",
                doctor.name
            )));
        }

        if let Some(slots) = &doctor.available_slots {
            let window = AvailabilityWindow::parse(slots)?;
            if !window.contains(request.appointment_time) {
                debug!(
                    "Requested time {} outside window {} for doctor {}",
                    request.appointment_time, slots, doctor.id
                );
                return Err(AppointmentError::DoctorUnavailable(format!(
                    "{} sees patients between {} and {}",
                    doctor.name,
                    window.start.format("%H:%M"),
                    window.end.format("%H:%M")
                )));
            }
        }

        Ok(())
    }
}

pub fn can_view(appointment: &Appointment, actor: Actor) -> bool {
    match actor {
        Actor::Patient(id) => appointment.is_owned_by(id),
        Actor::Doctor(id) => appointment.doctor_id == id,
        Actor::Staff { .. } | Actor::Admin => actor.is_staff_of(appointment.clinic_id),
    }
}
