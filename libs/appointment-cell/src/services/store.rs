// libs/appointment-cell/src/services/store.rs
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentFilter};

/// System of record for appointments. Appointments are never deleted;
/// cancellation is a status.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Insert a new appointment. Fails with `DuplicateBooking` when the patient
    /// already holds an open appointment with the same doctor on that date;
    /// the check and the insert happen atomically.
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError>;

    async fn get(&self, id: Uuid) -> Result<Appointment, AppointmentError>;

    /// Replace a stored appointment. Fails with `NotFound` for unknown ids.
    async fn update(&self, appointment: Appointment) -> Result<Appointment, AppointmentError>;

    /// Matching appointments ordered by date, then time.
    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppointmentError>;
}

#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.write().await;

        let duplicate = appointments.values().any(|existing| {
            existing.patient_id == appointment.patient_id
                && existing.doctor_id == appointment.doctor_id
                && existing.appointment_date == appointment.appointment_date
                && existing.status.is_open()
        });
        if duplicate {
            return Err(AppointmentError::DuplicateBooking);
        }

        appointments.insert(appointment.id, appointment.clone());
        debug!("Appointment {} stored", appointment.id);
        Ok(appointment)
    }

    async fn get(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        self.appointments
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(AppointmentError::NotFound)
    }

    async fn update(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.write().await;
        match appointments.get_mut(&appointment.id) {
            Some(slot) => {
                *slot = appointment.clone();
                Ok(appointment)
            }
            None => Err(AppointmentError::NotFound),
        }
    }

    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.read().await;
        let mut matching: Vec<Appointment> = appointments
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            (a.appointment_date, a.appointment_time, a.created_at)
                .cmp(&(b.appointment_date, b.appointment_time, b.created_at))
        });
        Ok(matching)
    }
}
