use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use appointment_cell::models::{
    Actor, Appointment, AppointmentFilter, AppointmentStatus, DoctorProfile, MeetingPlatform,
};
use appointment_cell::services::directory::DoctorDirectory;
use appointment_cell::services::lifecycle::AppointmentLifecycleService;
use appointment_cell::services::store::AppointmentStore;
use shared_utils::Clock;

use crate::error::QueueError;
use crate::models::{
    DoctorQueueSnapshot, PatientQueueStatus, QueueEntry, QueueEntryView, QueueSettings,
    SessionKey,
};
use crate::services::access;
use crate::services::session::DoctorDailySession;

type SharedSession = Arc<RwLock<DoctorDailySession>>;

/// Owns every doctor-day queue and is the only writer of appointment status
/// once an appointment has been booked.
///
/// Each doctor-day is its own critical section: mutations take the session's
/// write lock, re-read the appointment, apply the change to the session, then
/// persist the appointment. A failed store write restores the session as it
/// was. Lock order is sessions map, then session, then store.
pub struct QueueEngine {
    store: Arc<dyn AppointmentStore>,
    directory: Arc<dyn DoctorDirectory>,
    clock: Arc<dyn Clock>,
    settings: QueueSettings,
    lifecycle: AppointmentLifecycleService,
    sessions: RwLock<HashMap<SessionKey, SharedSession>>,
    queue_index: RwLock<HashMap<Uuid, SessionKey>>,
}

impl QueueEngine {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        directory: Arc<dyn DoctorDirectory>,
        clock: Arc<dyn Clock>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            settings,
            lifecycle: AppointmentLifecycleService::new(),
            sessions: RwLock::new(HashMap::new()),
            queue_index: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn AppointmentStore> {
        &self.store
    }

    pub fn lifecycle(&self) -> &AppointmentLifecycleService {
        &self.lifecycle
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    // ==========================================================================
    // MUTATIONS
    // ==========================================================================

    #[instrument(skip(self))]
    pub async fn check_in(&self, appointment_id: Uuid, actor: Actor) -> Result<QueueEntry, QueueError> {
        let appointment = self.store.get(appointment_id).await?;
        access::ensure_can_check_in(actor, &appointment)?;

        let key = SessionKey::new(appointment.doctor_id, appointment.appointment_date);
        let session = self.session_or_create(key).await;
        let mut session = session.write().await;

        // The record may have moved while we waited for the lock.
        let appointment = self.store.get(appointment_id).await?;
        self.validate_check_in(&session, &appointment)
            .inspect_err(|e| warn!("Check-in rejected for appointment {}: {}", appointment_id, e))?;

        let now = self.clock.now();
        let before = (*session).clone();
        let entry = session.enqueue(&appointment, now)?;

        if appointment.status == AppointmentStatus::Booked {
            if let Err(e) = self
                .transition_appointment(appointment_id, AppointmentStatus::CheckedIn, now, |_| {})
                .await
            {
                warn!("Rolling back check-in of appointment {}: {}", appointment_id, e);
                *session = before;
                return Err(e);
            }
        }

        self.queue_index.write().await.insert(entry.queue_id, entry.session_key());

        info!(
            "Checked in appointment {} for doctor {} with token {} (queue {})",
            appointment_id, key.doctor_id, entry.token, entry.queue_id
        );
        Ok(entry)
    }

    #[instrument(skip(self))]
    pub async fn call_next(&self, doctor_id: Uuid, actor: Actor) -> Result<QueueEntry, QueueError> {
        let doctor = self.directory.get_doctor(doctor_id).await?;
        access::ensure_can_manage_queue(actor, doctor_id, doctor.map(|d| d.clinic_id))?;

        let key = SessionKey::new(doctor_id, self.clock.today());
        let session = self.session(key).await.ok_or(QueueError::QueueEmpty)?;
        let mut session = session.write().await;

        let now = self.clock.now();
        let before = (*session).clone();
        let entry = session
            .call_next(now)
            .inspect_err(|e| warn!("Call next rejected for doctor {}: {}", doctor_id, e))?;

        if let Err(e) = self
            .transition_appointment(entry.appointment_id, AppointmentStatus::InProgress, now, |_| {})
            .await
        {
            warn!("Rolling back call of queue entry {}: {}", entry.queue_id, e);
            *session = before;
            return Err(e);
        }

        info!(
            "Doctor {} called token {} (queue {})",
            doctor_id, entry.token, entry.queue_id
        );
        Ok(entry)
    }

    /// Retire the current patient. Notes are checked before anything else,
    /// so a missing note never changes queue or appointment state.
    #[instrument(skip(self, notes))]
    pub async fn complete(
        &self,
        queue_id: Uuid,
        notes: Option<&str>,
        actor: Actor,
    ) -> Result<QueueEntry, QueueError> {
        let key = self
            .queue_index
            .read()
            .await
            .get(&queue_id)
            .copied()
            .ok_or(QueueError::EntryNotFound)?;
        let session = self.session(key).await.ok_or(QueueError::EntryNotFound)?;

        let clinic_id = session
            .read()
            .await
            .entry(queue_id)
            .map(|e| e.clinic_id)
            .ok_or(QueueError::EntryNotFound)?;
        access::ensure_can_manage_queue(actor, key.doctor_id, Some(clinic_id))?;

        let notes = self.lifecycle.validate_completion_notes(notes)?;
        self.complete_locked(&session, queue_id, notes).await
    }

    /// Complete by appointment id. The caller has already authorized and
    /// checked the appointment-level transition.
    pub(crate) async fn complete_appointment(
        &self,
        appointment: &Appointment,
        notes: Option<&str>,
    ) -> Result<QueueEntry, QueueError> {
        let notes = self.lifecycle.validate_completion_notes(notes)?;

        let key = SessionKey::new(appointment.doctor_id, appointment.appointment_date);
        let session = self.session(key).await.ok_or(QueueError::NoActiveQueueEntry)?;
        let queue_id = session
            .read()
            .await
            .entry_for_appointment(appointment.id)
            .map(|e| e.queue_id)
            .ok_or(QueueError::NoActiveQueueEntry)?;

        self.complete_locked(&session, queue_id, notes).await
    }

    async fn complete_locked(
        &self,
        session: &SharedSession,
        queue_id: Uuid,
        notes: String,
    ) -> Result<QueueEntry, QueueError> {
        let mut session = session.write().await;

        let now = self.clock.now();
        let before = (*session).clone();
        let entry = session
            .complete(queue_id, now)
            .inspect_err(|e| warn!("Complete rejected for queue entry {}: {}", queue_id, e))?;

        if let Err(e) = self
            .transition_appointment(entry.appointment_id, AppointmentStatus::Completed, now, move |a| {
                a.clinical_notes = Some(notes)
            })
            .await
        {
            warn!("Rolling back completion of queue entry {}: {}", queue_id, e);
            *session = before;
            return Err(e);
        }

        info!(
            "Doctor {} completed token {} (queue {}), {} seen today",
            entry.doctor_id,
            entry.token,
            entry.queue_id,
            session.completed_count()
        );
        Ok(entry)
    }

    /// Cancel the appointment and, if it checked in, its queue entry. The
    /// caller has already authorized.
    pub(crate) async fn cancel_appointment(
        &self,
        appointment: &Appointment,
        reason: Option<String>,
    ) -> Result<Appointment, QueueError> {
        let key = SessionKey::new(appointment.doctor_id, appointment.appointment_date);
        let session = self.session_or_create(key).await;
        let mut session = session.write().await;

        let now = self.clock.now();
        let before = (*session).clone();
        let cancelled_entry = session.cancel(appointment.id, now);

        match self
            .transition_appointment(appointment.id, AppointmentStatus::Cancelled, now, move |a| {
                a.cancellation_reason = reason
            })
            .await
        {
            Ok(updated) => {
                match cancelled_entry {
                    Some(entry) => info!(
                        "Cancelled appointment {} and queue entry {} (token {})",
                        appointment.id, entry.queue_id, entry.token
                    ),
                    None => info!("Cancelled appointment {}", appointment.id),
                }
                Ok(updated)
            }
            Err(e) => {
                warn!("Cancel rejected for appointment {}: {}", appointment.id, e);
                *session = before;
                Err(e)
            }
        }
    }

    /// Attach meeting details. Runs inside the doctor-day critical section so
    /// it never overwrites a concurrent status change.
    pub(crate) async fn attach_meeting(
        &self,
        appointment: &Appointment,
        link: &str,
        platform: Option<MeetingPlatform>,
    ) -> Result<Appointment, QueueError> {
        let key = SessionKey::new(appointment.doctor_id, appointment.appointment_date);
        let session = self.session_or_create(key).await;
        let _session = session.write().await;

        let mut current = self.store.get(appointment.id).await?;
        let meeting = self.lifecycle.validate_meeting_link(&current, link, platform)?;
        current.meeting = Some(meeting);
        current.updated_at = self.clock.now();

        let updated = self.store.update(current).await?;
        info!("Meeting link attached to appointment {}", updated.id);
        Ok(updated)
    }

    // ==========================================================================
    // READS
    // ==========================================================================

    /// Today's queue for a doctor.
    pub async fn snapshot(&self, doctor_id: Uuid, actor: Actor) -> Result<DoctorQueueSnapshot, QueueError> {
        self.snapshot_for(doctor_id, self.clock.today(), actor).await
    }

    pub async fn snapshot_for(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        actor: Actor,
    ) -> Result<DoctorQueueSnapshot, QueueError> {
        let doctor = self.directory.get_doctor(doctor_id).await?;
        access::ensure_can_manage_queue(actor, doctor_id, doctor.as_ref().map(|d| d.clinic_id))?;
        let average = self.average_minutes(doctor.as_ref());

        let key = SessionKey::new(doctor_id, date);
        let session = self.read_session(key).await;
        let appointments = self.appointments_for(&session).await;
        let view = |entry: &QueueEntry| {
            entry_view(&session, entry, appointments.get(&entry.appointment_id), average)
        };

        let snapshot = DoctorQueueSnapshot {
            doctor_id,
            date,
            current_patient: session.current().map(view),
            waiting_patients: session.waiting().map(view).collect(),
            completed_patients: session.completed().into_iter().map(view).collect(),
            total_seen_today: session.completed_count(),
            average_consultation_minutes: average,
            generated_at: self.clock.now(),
        };

        debug!(
            "Snapshot for {}: {} waiting, {} seen",
            key,
            snapshot.waiting_patients.len(),
            snapshot.total_seen_today
        );
        Ok(snapshot)
    }

    pub async fn patient_status(
        &self,
        appointment_id: Uuid,
        actor: Actor,
    ) -> Result<PatientQueueStatus, QueueError> {
        let appointment = self.store.get(appointment_id).await?;
        access::ensure_can_view(actor, &appointment)?;

        let key = SessionKey::new(appointment.doctor_id, appointment.appointment_date);
        let session = self
            .session(key)
            .await
            .ok_or(QueueError::NoActiveQueueEntry)?;
        let session = session.read().await.clone();

        // Re-read so the status matches the session we just copied.
        let appointment = self.store.get(appointment_id).await?;
        let doctor = self.directory.get_doctor(appointment.doctor_id).await?;
        let average = self.average_minutes(doctor.as_ref());

        self.status_view(&session, &appointment, average)
            .ok_or(QueueError::NoActiveQueueEntry)
    }

    /// The caller's live queue entries for today. Only WAITING and
    /// IN_PROGRESS entries qualify; nothing from earlier days surfaces.
    pub async fn my_status(&self, actor: Actor) -> Result<Vec<PatientQueueStatus>, QueueError> {
        let user_id = match actor {
            Actor::Patient(id) => id,
            _ => return Err(QueueError::Forbidden("only patients have a queue status".to_string())),
        };

        let today = self.clock.today();
        let appointments = self
            .store
            .list(&AppointmentFilter {
                patient_id: Some(user_id),
                booked_by: Some(user_id),
                date: Some(today),
                ..Default::default()
            })
            .await?;

        let mut statuses = Vec::new();
        for appointment in appointments {
            let key = SessionKey::new(appointment.doctor_id, appointment.appointment_date);
            let Some(session) = self.session(key).await else {
                continue;
            };
            let session = session.read().await.clone();
            let doctor = self.directory.get_doctor(appointment.doctor_id).await?;
            let average = self.average_minutes(doctor.as_ref());

            if let Some(status) = self.status_view(&session, &appointment, average) {
                if !status.entry.status.is_terminal() {
                    statuses.push(status);
                }
            }
        }

        if statuses.is_empty() {
            return Err(QueueError::NoActiveQueueEntry);
        }
        Ok(statuses)
    }

    // ==========================================================================
    // HOUSEKEEPING
    // ==========================================================================

    /// Drop every doctor-day before `cutoff`. Returns how many were removed.
    pub async fn prune_sessions_before(&self, cutoff: NaiveDate) -> usize {
        let removed = {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|key, _| key.date >= cutoff);
            before - sessions.len()
        };
        self.queue_index.write().await.retain(|_, key| key.date >= cutoff);

        if removed > 0 {
            info!("Pruned {} queue sessions before {}", removed, cutoff);
        }
        removed
    }

    /// Drop every doctor-day older than `retention_days` before today.
    pub async fn prune_expired(&self, retention_days: u32) -> usize {
        let today = self.today();
        match today.checked_sub_signed(chrono::Duration::days(i64::from(retention_days))) {
            Some(cutoff) => self.prune_sessions_before(cutoff).await,
            None => {
                warn!(
                    "Retention of {} days reaches past the calendar from {}, nothing pruned",
                    retention_days, today
                );
                0
            }
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    // ==========================================================================
    // INTERNALS
    // ==========================================================================

    async fn session(&self, key: SessionKey) -> Option<SharedSession> {
        self.sessions.read().await.get(&key).cloned()
    }

    async fn session_or_create(&self, key: SessionKey) -> SharedSession {
        if let Some(session) = self.session(key).await {
            return session;
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key)
            .or_insert_with(|| {
                debug!("Opening queue session {}", key);
                Arc::new(RwLock::new(DoctorDailySession::new(key)))
            })
            .clone()
    }

    /// Point-in-time copy of a session; an empty one if none exists.
    async fn read_session(&self, key: SessionKey) -> DoctorDailySession {
        match self.session(key).await {
            Some(session) => session.read().await.clone(),
            None => DoctorDailySession::new(key),
        }
    }

    async fn appointments_for(&self, session: &DoctorDailySession) -> HashMap<Uuid, Appointment> {
        let mut appointments = HashMap::with_capacity(session.entries().len());
        for entry in session.entries() {
            match self.store.get(entry.appointment_id).await {
                Ok(appointment) => {
                    appointments.insert(appointment.id, appointment);
                }
                Err(e) => debug!("No appointment details for queue entry {}: {}", entry.queue_id, e),
            }
        }
        appointments
    }

    fn average_minutes(&self, doctor: Option<&DoctorProfile>) -> u32 {
        doctor
            .and_then(|d| d.average_consultation_minutes)
            .filter(|m| *m > 0)
            .unwrap_or(self.settings.default_consultation_minutes)
    }

    fn validate_check_in(
        &self,
        session: &DoctorDailySession,
        appointment: &Appointment,
    ) -> Result<(), QueueError> {
        if appointment.status.is_terminal() {
            return Err(QueueError::InvalidAppointment(format!(
                "appointment is {}",
                appointment.status
            )));
        }

        if session.entry_for_appointment(appointment.id).is_some() {
            return Err(QueueError::AlreadyCheckedIn);
        }

        if !matches!(appointment.status, AppointmentStatus::Booked | AppointmentStatus::CheckedIn) {
            return Err(QueueError::InvalidAppointment(format!(
                "appointment is {}",
                appointment.status
            )));
        }

        let local_now = self.clock.local_now();
        if appointment.appointment_date != local_now.date() {
            return Err(QueueError::InvalidAppointment(format!(
                "appointment is scheduled for {}, not today",
                appointment.appointment_date
            )));
        }

        if let Some(opens_at) = self.settings.check_in_policy.opens_at(appointment.appointment_time) {
            if local_now.time() < opens_at {
                return Err(QueueError::CheckInNotOpen { opens_at });
            }
        }

        Ok(())
    }

    async fn transition_appointment(
        &self,
        appointment_id: Uuid,
        to: AppointmentStatus,
        now: DateTime<Utc>,
        apply: impl FnOnce(&mut Appointment) + Send,
    ) -> Result<Appointment, QueueError> {
        let mut appointment = self.store.get(appointment_id).await?;
        self.lifecycle.validate_status_transition(appointment.status, to)?;

        appointment.status = to;
        appointment.updated_at = now;
        apply(&mut appointment);

        Ok(self.store.update(appointment).await?)
    }

    fn status_view(
        &self,
        session: &DoctorDailySession,
        appointment: &Appointment,
        average: u32,
    ) -> Option<PatientQueueStatus> {
        let entry = session.entry_for_appointment(appointment.id)?;
        Some(PatientQueueStatus {
            appointment_id: appointment.id,
            appointment_status: appointment.status,
            doctor_id: appointment.doctor_id,
            date: appointment.appointment_date,
            entry: entry_view(session, entry, Some(appointment), average),
            now_serving_token: session.current().map(|e| e.token),
        })
    }
}

fn entry_view(
    session: &DoctorDailySession,
    entry: &QueueEntry,
    appointment: Option<&Appointment>,
    average: u32,
) -> QueueEntryView {
    let position = session.position_of(entry);
    QueueEntryView {
        queue_id: entry.queue_id,
        appointment_id: entry.appointment_id,
        patient_id: entry.patient_id,
        token: entry.token,
        status: entry.status,
        position,
        estimated_wait_minutes: position.map(|p| p.saturating_mul(average)),
        check_in_time: entry.check_in_time,
        called_time: entry.called_time,
        completed_time: entry.completed_time,
        cancelled_time: entry.cancelled_time,
        appointment_time: appointment.map(|a| a.appointment_time),
        appointment_type: appointment.map(|a| a.appointment_type),
        patient_name: appointment.and_then(|a| a.dependant_name().map(str::to_string)),
        meeting: appointment.and_then(|a| a.meeting.clone()),
    }
}
