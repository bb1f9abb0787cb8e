use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, error, warn};
use uuid::Uuid;

use appointment_cell::models::{
    Appointment, AppointmentStatus, CreateAppointmentRequest, MeetingPlatform,
};
use queue_cell::models::{DoctorQueueSnapshot, PatientQueueStatus, QueueEntry};
use shared_config::AppConfig;
use shared_models::error::ErrorBody;

use crate::error::ClientError;

/// Operations a role view can issue against the clinic queue API.
#[async_trait]
pub trait QueueApi: Send + Sync {
    async fn create_appointment(
        &self,
        request: &CreateAppointmentRequest,
    ) -> Result<Appointment, ClientError>;

    async fn check_in(&self, appointment_id: Uuid) -> Result<QueueEntry, ClientError>;

    async fn call_next(&self, doctor_id: Uuid) -> Result<QueueEntry, ClientError>;

    async fn complete(&self, queue_id: Uuid, notes: &str) -> Result<QueueEntry, ClientError>;

    async fn update_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
        notes: Option<&str>,
    ) -> Result<Appointment, ClientError>;

    async fn cancel(
        &self,
        appointment_id: Uuid,
        reason: Option<&str>,
    ) -> Result<Appointment, ClientError>;

    async fn add_meeting_link(
        &self,
        appointment_id: Uuid,
        link: &str,
        platform: Option<MeetingPlatform>,
    ) -> Result<Appointment, ClientError>;

    async fn doctor_snapshot(&self, doctor_id: Uuid) -> Result<DoctorQueueSnapshot, ClientError>;

    async fn patient_status(&self, appointment_id: Uuid) -> Result<PatientQueueStatus, ClientError>;
}

#[derive(Deserialize)]
struct EntryEnvelope {
    queue_entry: QueueEntry,
}

#[derive(Deserialize)]
struct AppointmentEnvelope {
    appointment: Appointment,
}

#[derive(Deserialize)]
struct SnapshotEnvelope {
    snapshot: DoctorQueueSnapshot,
}

#[derive(Deserialize)]
struct StatusEnvelope {
    status: PatientQueueStatus,
}

pub struct QueueApiClient {
    client: Client,
    base_url: String,
    headers: HeaderMap,
}

impl QueueApiClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| ClientError::InvalidRequest(format!("bad token: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers,
        })
    }

    pub fn from_config(base_url: &str, token: &str, config: &AppConfig) -> Result<Self, ClientError> {
        Self::new(base_url, token, Duration::from_secs(config.client_timeout_seconds))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut req = self.client.request(method, &url).headers(self.headers.clone());
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req.send().await.map_err(|e| {
            let err = ClientError::from(e);
            warn!("Request to {} failed: {}", url, err);
            err
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = rejection(status, &text);
            if err.is_fatal() {
                error!("API error ({}): {}", status, text);
            } else {
                debug!("API rejected ({}): {}", status, text);
            }
            return Err(err);
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

fn rejection(status: StatusCode, text: &str) -> ClientError {
    let (code, message) = match serde_json::from_str::<ErrorBody>(text) {
        Ok(body) => (
            body.code.unwrap_or_else(|| format!("HTTP_{}", status.as_u16())),
            body.error,
        ),
        Err(_) => (format!("HTTP_{}", status.as_u16()), text.to_string()),
    };

    ClientError::Rejected {
        status: status.as_u16(),
        code,
        message,
    }
}

#[async_trait]
impl QueueApi for QueueApiClient {
    async fn create_appointment(
        &self,
        request: &CreateAppointmentRequest,
    ) -> Result<Appointment, ClientError> {
        let body = serde_json::to_value(request).map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        let envelope: AppointmentEnvelope = self.request(Method::POST, "/appointments", Some(body)).await?;
        Ok(envelope.appointment)
    }

    async fn check_in(&self, appointment_id: Uuid) -> Result<QueueEntry, ClientError> {
        let envelope: EntryEnvelope = self
            .request(
                Method::POST,
                "/queue/check-in",
                Some(json!({ "appointment_id": appointment_id })),
            )
            .await?;
        Ok(envelope.queue_entry)
    }

    async fn call_next(&self, doctor_id: Uuid) -> Result<QueueEntry, ClientError> {
        let path = format!("/queue/doctors/{}/call-next", doctor_id);
        let envelope: EntryEnvelope = self.request(Method::PUT, &path, None).await?;
        Ok(envelope.queue_entry)
    }

    async fn complete(&self, queue_id: Uuid, notes: &str) -> Result<QueueEntry, ClientError> {
        let path = format!("/queue/{}/complete", queue_id);
        let envelope: EntryEnvelope = self
            .request(Method::PUT, &path, Some(json!({ "notes": notes })))
            .await?;
        Ok(envelope.queue_entry)
    }

    async fn update_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
        notes: Option<&str>,
    ) -> Result<Appointment, ClientError> {
        let path = format!("/appointments/{}/status", appointment_id);
        let envelope: AppointmentEnvelope = self
            .request(
                Method::PUT,
                &path,
                Some(json!({ "status": status, "notes": notes })),
            )
            .await?;
        Ok(envelope.appointment)
    }

    async fn cancel(
        &self,
        appointment_id: Uuid,
        reason: Option<&str>,
    ) -> Result<Appointment, ClientError> {
        let path = format!("/appointments/{}/cancel", appointment_id);
        let envelope: AppointmentEnvelope = self
            .request(Method::POST, &path, Some(json!({ "reason": reason })))
            .await?;
        Ok(envelope.appointment)
    }

    async fn add_meeting_link(
        &self,
        appointment_id: Uuid,
        link: &str,
        platform: Option<MeetingPlatform>,
    ) -> Result<Appointment, ClientError> {
        let path = format!("/appointments/{}/meeting-link", appointment_id);
        let envelope: AppointmentEnvelope = self
            .request(
                Method::PUT,
                &path,
                Some(json!({ "meeting_link": link, "meeting_platform": platform })),
            )
            .await?;
        Ok(envelope.appointment)
    }

    async fn doctor_snapshot(&self, doctor_id: Uuid) -> Result<DoctorQueueSnapshot, ClientError> {
        let path = format!("/queue/doctors/{}", doctor_id);
        let envelope: SnapshotEnvelope = self.request(Method::GET, &path, None).await?;
        Ok(envelope.snapshot)
    }

    async fn patient_status(&self, appointment_id: Uuid) -> Result<PatientQueueStatus, ClientError> {
        let path = format!("/queue/appointments/{}", appointment_id);
        let envelope: StatusEnvelope = self.request(Method::GET, &path, None).await?;
        Ok(envelope.status)
    }
}
