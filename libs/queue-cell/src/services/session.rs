use chrono::{DateTime, Utc};
use uuid::Uuid;

use appointment_cell::models::Appointment;

use crate::error::QueueError;
use crate::models::{QueueEntry, QueueStatus, SessionKey};

/// One doctor's queue for one calendar day.
///
/// Entries are kept in token order, so the head of line is always the first
/// WAITING entry. At most one entry is IN_PROGRESS and `current` points at it.
/// All methods are synchronous; callers serialize access per session.
#[derive(Debug, Clone)]
pub struct DoctorDailySession {
    key: SessionKey,
    entries: Vec<QueueEntry>,
    next_token: u32,
    completed_count: u32,
    current: Option<usize>,
}

impl DoctorDailySession {
    pub fn new(key: SessionKey) -> Self {
        Self {
            key,
            entries: Vec::new(),
            next_token: 1,
            completed_count: 0,
            current: None,
        }
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    pub fn next_token(&self) -> u32 {
        self.next_token
    }

    pub fn completed_count(&self) -> u32 {
        self.completed_count
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn entry(&self, queue_id: Uuid) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.queue_id == queue_id)
    }

    pub fn entry_for_appointment(&self, appointment_id: Uuid) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.appointment_id == appointment_id)
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.current.and_then(|idx| self.entries.get(idx))
    }

    /// WAITING entries, head of line first.
    pub fn waiting(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter().filter(|e| e.status == QueueStatus::Waiting)
    }

    /// Entries completed today, in the order they were served.
    pub fn completed(&self) -> Vec<&QueueEntry> {
        let mut done: Vec<&QueueEntry> = self
            .entries
            .iter()
            .filter(|e| e.status == QueueStatus::Completed)
            .collect();
        done.sort_by_key(|e| (e.completed_time, e.token));
        done
    }

    pub fn in_progress_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == QueueStatus::InProgress)
            .count()
    }

    /// 1 + number of WAITING entries with a smaller token. `None` unless WAITING.
    pub fn position_of(&self, entry: &QueueEntry) -> Option<u32> {
        if entry.status != QueueStatus::Waiting {
            return None;
        }
        let ahead = self
            .waiting()
            .take_while(|e| e.token < entry.token)
            .count();
        Some(ahead as u32 + 1)
    }

    /// Append a WAITING entry for `appointment` with the next token.
    pub fn enqueue(&mut self, appointment: &Appointment, now: DateTime<Utc>) -> Result<QueueEntry, QueueError> {
        if self.entry_for_appointment(appointment.id).is_some() {
            return Err(QueueError::AlreadyCheckedIn);
        }

        let entry = QueueEntry {
            queue_id: Uuid::new_v4(),
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            doctor_id: self.key.doctor_id,
            clinic_id: appointment.clinic_id,
            date: self.key.date,
            token: self.next_token,
            status: QueueStatus::Waiting,
            check_in_time: now,
            called_time: None,
            completed_time: None,
            cancelled_time: None,
        };

        self.next_token += 1;
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Promote the smallest-token WAITING entry to current.
    pub fn call_next(&mut self, now: DateTime<Utc>) -> Result<QueueEntry, QueueError> {
        if self.current.is_some() {
            return Err(QueueError::CurrentPatientActive);
        }

        let idx = self
            .entries
            .iter()
            .position(|e| e.status.can_transition_to(&QueueStatus::InProgress))
            .ok_or(QueueError::QueueEmpty)?;

        let entry = &mut self.entries[idx];
        entry.status = QueueStatus::InProgress;
        entry.called_time = Some(now);
        self.current = Some(idx);
        Ok(entry.clone())
    }

    /// Retire the current entry.
    pub fn complete(&mut self, queue_id: Uuid, now: DateTime<Utc>) -> Result<QueueEntry, QueueError> {
        let idx = match self.current {
            Some(idx)
                if self.entries[idx].queue_id == queue_id
                    && self.entries[idx].status.can_transition_to(&QueueStatus::Completed) =>
            {
                idx
            }
            _ => {
                return if self.entry(queue_id).is_some() {
                    Err(QueueError::NotCurrentPatient(queue_id))
                } else {
                    Err(QueueError::EntryNotFound)
                }
            }
        };

        let entry = &mut self.entries[idx];
        entry.status = QueueStatus::Completed;
        entry.completed_time = Some(now);
        self.completed_count += 1;
        self.current = None;
        Ok(entry.clone())
    }

    /// Mark the appointment's entry CANCELLED, freeing the current slot if it
    /// held it. Returns `None` when the appointment never checked in.
    pub fn cancel(&mut self, appointment_id: Uuid, now: DateTime<Utc>) -> Option<QueueEntry> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.appointment_id == appointment_id)?;

        let entry = &mut self.entries[idx];
        if entry.status.can_transition_to(&QueueStatus::Cancelled) {
            entry.status = QueueStatus::Cancelled;
            entry.cancelled_time = Some(now);
        }
        if self.current == Some(idx) {
            self.current = None;
        }
        Some(entry.clone())
    }
}
