use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentStatus, MeetingPlatform};
use queue_cell::models::{DoctorQueueSnapshot, PatientQueueStatus, QueueEntry};
use shared_config::AppConfig;

use crate::client::QueueApi;
use crate::error::ClientError;

/// Whose queue a poller watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleView {
    Patient { appointment_id: Uuid },
    Doctor { doctor_id: Uuid },
    Staff { doctor_id: Uuid },
}

impl RoleView {
    pub fn doctor_id(&self) -> Option<Uuid> {
        match self {
            RoleView::Patient { .. } => None,
            RoleView::Doctor { doctor_id } | RoleView::Staff { doctor_id } => Some(*doctor_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewData {
    /// `None` until the appointment has been checked in.
    Patient(Option<PatientQueueStatus>),
    Queue(DoctorQueueSnapshot),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewPhase {
    Loading,
    Live,
    /// Last refresh failed; `data` still holds the previous result.
    Stale { error: ClientError },
    /// Polling is paused until `retry`.
    Blocked { error: ClientError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub phase: ViewPhase,
    pub data: Option<ViewData>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl ViewState {
    fn loading() -> Self {
        Self {
            phase: ViewPhase::Loading,
            data: None,
            refreshed_at: None,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self.phase, ViewPhase::Blocked { .. })
    }
}

/// Shortest accepted polling period.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct QueuePoller {
    api: Arc<dyn QueueApi>,
    view: RoleView,
    interval: Duration,
    state: watch::Sender<ViewState>,
}

impl QueuePoller {
    pub fn new(api: Arc<dyn QueueApi>, view: RoleView, interval: Duration) -> Self {
        let (state, _) = watch::channel(ViewState::loading());
        if interval < MIN_POLL_INTERVAL {
            warn!(
                "Poll interval {:?} is too short, using {:?}",
                interval, MIN_POLL_INTERVAL
            );
        }
        Self {
            api,
            view,
            interval: interval.max(MIN_POLL_INTERVAL),
            state,
        }
    }

    pub fn from_config(api: Arc<dyn QueueApi>, view: RoleView, config: &AppConfig) -> Self {
        Self::new(api, view, Duration::from_secs(config.poll_interval_seconds))
    }

    pub fn view(&self) -> RoleView {
        self.view
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ViewState {
        self.state.borrow().clone()
    }

    /// Polls every interval until `shutdown` flips to `true` or its sender
    /// is dropped. Ticks are skipped while the view is blocked.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting queue poller for {:?} every {:?}", self.view, self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.state.borrow().is_blocked() {
                        debug!("Poller blocked, skipping tick");
                        continue;
                    }
                    self.refresh().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Queue poller for {:?} stopped", self.view);
    }

    /// Fetches the view once and publishes the outcome.
    #[instrument(skip(self), fields(view = ?self.view))]
    pub async fn refresh(&self) -> ViewState {
        let result = self.fetch().await;

        self.state.send_modify(|state| match result {
            Ok(data) => {
                state.phase = ViewPhase::Live;
                state.data = Some(data);
                state.refreshed_at = Some(Utc::now());
            }
            Err(error) if error.is_fatal() => {
                error!("Queue view blocked: {}", error);
                state.phase = ViewPhase::Blocked { error };
            }
            Err(error) => {
                warn!("Queue view stale: {}", error);
                state.phase = ViewPhase::Stale { error };
            }
        });

        self.state()
    }

    /// Clears a blocked view by refreshing immediately.
    pub async fn retry(&self) -> ViewState {
        info!("Retrying queue view {:?}", self.view);
        self.refresh().await
    }

    async fn fetch(&self) -> Result<ViewData, ClientError> {
        match self.view {
            RoleView::Patient { appointment_id } => match self.api.patient_status(appointment_id).await {
                Ok(status) => Ok(ViewData::Patient(Some(status))),
                Err(e) if e.code() == Some("NO_ACTIVE_QUEUE_ENTRY") => Ok(ViewData::Patient(None)),
                Err(e) => Err(e),
            },
            RoleView::Doctor { doctor_id } | RoleView::Staff { doctor_id } => {
                self.api.doctor_snapshot(doctor_id).await.map(ViewData::Queue)
            }
        }
    }

    /// Sends a command once and refreshes the view whatever the outcome.
    async fn command<T, F>(&self, name: &str, op: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        let result = op.await;
        if let Err(e) = &result {
            warn!("{} failed: {}", name, e);
        }
        self.refresh().await;
        result
    }

    pub async fn check_in(&self, appointment_id: Uuid) -> Result<QueueEntry, ClientError> {
        self.command("check-in", self.api.check_in(appointment_id)).await
    }

    pub async fn call_next(&self) -> Result<QueueEntry, ClientError> {
        let doctor_id = self
            .view
            .doctor_id()
            .ok_or_else(|| ClientError::InvalidRequest("patient views cannot call patients".to_string()))?;
        self.command("call-next", self.api.call_next(doctor_id)).await
    }

    pub async fn complete(&self, queue_id: Uuid, notes: &str) -> Result<QueueEntry, ClientError> {
        self.command("complete", self.api.complete(queue_id, notes)).await
    }

    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
        notes: Option<&str>,
    ) -> Result<Appointment, ClientError> {
        self.command("update-status", self.api.update_status(appointment_id, status, notes))
            .await
    }

    pub async fn cancel(&self, appointment_id: Uuid, reason: Option<&str>) -> Result<Appointment, ClientError> {
        self.command("cancel", self.api.cancel(appointment_id, reason)).await
    }

    pub async fn add_meeting_link(
        &self,
        appointment_id: Uuid,
        link: &str,
        platform: Option<MeetingPlatform>,
    ) -> Result<Appointment, ClientError> {
        self.command("meeting-link", self.api.add_meeting_link(appointment_id, link, platform))
            .await
    }
}
