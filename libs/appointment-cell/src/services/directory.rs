// libs/appointment-cell/src/services/directory.rs
use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveTime;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::models::{AppointmentError, DoctorProfile};

/// Read side of the clinic/doctor directory. Browsing and profile CRUD live
/// elsewhere; the queue only needs lookups.
#[async_trait]
pub trait DoctorDirectory: Send + Sync {
    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, AppointmentError>;
}

#[derive(Default)]
pub struct InMemoryDoctorDirectory {
    doctors: RwLock<HashMap<Uuid, DoctorProfile>>,
}

impl InMemoryDoctorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_doctors(doctors: impl IntoIterator<Item = DoctorProfile>) -> Self {
        Self {
            doctors: RwLock::new(doctors.into_iter().map(|d| (d.id, d)).collect()),
        }
    }

    /// Seed from a JSON array of doctor profiles.
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading doctor directory {}", path.display()))?;
        let doctors: Vec<DoctorProfile> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing doctor directory {}", path.display()))?;

        for doctor in &doctors {
            if let Some(slots) = &doctor.available_slots {
                AvailabilityWindow::parse(slots)
                    .map_err(|e| anyhow!("doctor {}: {}", doctor.id, e))?;
            }
        }

        info!("Loaded {} doctors from {}", doctors.len(), path.display());
        Ok(Self::with_doctors(doctors))
    }

    pub async fn upsert(&self, doctor: DoctorProfile) {
        self.doctors.write().await.insert(doctor.id, doctor);
    }
}

#[async_trait]
impl DoctorDirectory for InMemoryDoctorDirectory {
    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, AppointmentError> {
        Ok(self.doctors.read().await.get(&doctor_id).cloned())
    }
}

/// A doctor's daily bookable window, e.g. `09:00-17:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl AvailabilityWindow {
    pub fn parse(raw: &str) -> Result<Self, AppointmentError> {
        let (start, end) = raw.split_once('-').ok_or_else(|| {
            AppointmentError::ValidationError(format!("availability '{}' must look like HH:MM-HH:MM", raw))
        })?;

        let parse_time = |s: &str| {
            NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|_| {
                AppointmentError::ValidationError(format!("invalid time '{}' in availability '{}'", s.trim(), raw))
            })
        };

        let window = Self {
            start: parse_time(start)?,
            end: parse_time(end)?,
        };

        if window.start >= window.end {
            return Err(AppointmentError::ValidationError(format!(
                "availability '{}' must start before it ends",
                raw
            )));
        }

        Ok(window)
    }

    /// Start inclusive, end exclusive.
    pub fn contains(&self, time: NaiveTime) -> bool {
        time >= self.start && time < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parses_window() {
        let window = AvailabilityWindow::parse("09:00-17:00").unwrap();
        assert!(window.contains(t(9, 0)));
        assert!(window.contains(t(16, 59)));
        assert!(!window.contains(t(17, 0)));
        assert!(!window.contains(t(8, 59)));
    }

    #[test]
    fn rejects_bad_windows() {
        assert!(AvailabilityWindow::parse("9am to 5pm").is_err());
        assert!(AvailabilityWindow::parse("17:00-09:00").is_err());
        assert!(AvailabilityWindow::parse("09:00-25:00").is_err());
    }

    #[tokio::test]
    async fn directory_lookup() {
        let doctor = DoctorProfile {
            id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            name: "Dr. Rao".to_string(),
            specialization: Some("General Medicine".to_string()),
            is_available: true,
            available_slots: None,
            average_consultation_minutes: Some(12),
        };
        let directory = InMemoryDoctorDirectory::with_doctors([doctor.clone()]);

        assert_eq!(directory.get_doctor(doctor.id).await.unwrap(), Some(doctor));
        assert_eq!(directory.get_doctor(Uuid::new_v4()).await.unwrap(), None);
    }
}
