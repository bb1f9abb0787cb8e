#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use appointment_cell::models::*;
use appointment_cell::services::directory::InMemoryDoctorDirectory;
use appointment_cell::services::store::{AppointmentStore, InMemoryAppointmentStore};
use queue_cell::*;
use shared_utils::FixedClock;

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
}

pub fn at(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// Appointment store whose writes can be switched off to simulate an outage.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryAppointmentStore,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), AppointmentError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(AppointmentError::StoreUnavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AppointmentStore for FlakyStore {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        self.check()?;
        self.inner.insert(appointment).await
    }

    async fn get(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        self.inner.get(id).await
    }

    async fn update(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        self.check()?;
        self.inner.update(appointment).await
    }

    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppointmentError> {
        self.inner.list(filter).await
    }
}

pub struct QueueFixture {
    pub engine: Arc<QueueEngine>,
    pub controller: StatusTransitionController,
    pub store: Arc<FlakyStore>,
    pub directory: Arc<InMemoryDoctorDirectory>,
    pub clock: Arc<FixedClock>,
    pub doctor: DoctorProfile,
}

impl QueueFixture {
    pub fn new() -> Self {
        Self::with_settings(QueueSettings::default())
    }

    pub fn with_settings(settings: QueueSettings) -> Self {
        let doctor = DoctorProfile {
            id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            name: "Dr. Kapoor".to_string(),
            specialization: Some("General Medicine".to_string()),
            is_available: true,
            available_slots: Some("09:00-17:00".to_string()),
            average_consultation_minutes: Some(20),
        };

        let store = Arc::new(FlakyStore::default());
        let directory = Arc::new(InMemoryDoctorDirectory::with_doctors([doctor.clone()]));
        let clock = Arc::new(FixedClock::at(today(), 8, 0));
        let engine = Arc::new(QueueEngine::new(
            store.clone(),
            directory.clone(),
            clock.clone(),
            settings,
        ));

        Self {
            controller: StatusTransitionController::new(engine.clone()),
            engine,
            store,
            directory,
            clock,
            doctor,
        }
    }

    pub fn doctor_actor(&self) -> Actor {
        Actor::Doctor(self.doctor.id)
    }

    pub fn staff_actor(&self) -> Actor {
        Actor::Staff { clinic_id: Some(self.doctor.clinic_id) }
    }

    /// Book an appointment for today at 10:00.
    pub async fn book(&self, patient_id: Uuid) -> Appointment {
        self.book_on(patient_id, today(), at(10, 0), AppointmentType::InPerson).await
    }

    pub async fn book_online(&self, patient_id: Uuid) -> Appointment {
        self.book_on(patient_id, today(), at(10, 0), AppointmentType::Online).await
    }

    pub async fn book_for_doctor(&self, patient_id: Uuid, doctor: &DoctorProfile) -> Appointment {
        self.insert(patient_id, doctor, today(), at(10, 0), AppointmentType::InPerson).await
    }

    pub async fn book_on(
        &self,
        patient_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        appointment_type: AppointmentType,
    ) -> Appointment {
        self.insert(patient_id, &self.doctor, date, time, appointment_type).await
    }

    async fn insert(
        &self,
        patient_id: Uuid,
        doctor: &DoctorProfile,
        date: NaiveDate,
        time: NaiveTime,
        appointment_type: AppointmentType,
    ) -> Appointment {
        let now = Utc::now();
        self.store
            .insert(Appointment {
                id: Uuid::new_v4(),
                patient_id,
                doctor_id: doctor.id,
                clinic_id: doctor.clinic_id,
                booked_by: patient_id,
                appointment_date: date,
                appointment_time: time,
                appointment_type,
                booking_for: BookingFor::Myself,
                payment_mode: PaymentMode::InPerson,
                notes: None,
                clinical_notes: None,
                meeting: None,
                status: AppointmentStatus::Booked,
                cancellation_reason: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }

    /// Book and check in a fresh patient; returns the appointment and entry.
    pub async fn check_in_new_patient(&self) -> (Appointment, QueueEntry) {
        let patient = Uuid::new_v4();
        let appointment = self.book(patient).await;
        let entry = self
            .engine
            .check_in(appointment.id, Actor::Patient(patient))
            .await
            .unwrap();
        (appointment, entry)
    }

    pub async fn status_of(&self, appointment_id: Uuid) -> AppointmentStatus {
        self.store.get(appointment_id).await.unwrap().status
    }
}
