use chrono::Offset;
use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub bind_address: String,
    pub default_consultation_minutes: u32,
    pub check_in_opens_minutes_before: Option<u32>,
    pub clinic_utc_offset_minutes: i32,
    pub session_retention_days: u32,
    pub doctor_directory_path: Option<String>,
    pub poll_interval_seconds: u64,
    pub client_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            bind_address: "0.0.0.0:3000".to_string(),
            default_consultation_minutes: 15,
            check_in_opens_minutes_before: None,
            clinic_utc_offset_minutes: 0,
            session_retention_days: 1,
            doctor_directory_path: None,
            poll_interval_seconds: 30,
            client_timeout_seconds: 10,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            jwt_secret: env::var("AUTH_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("AUTH_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            bind_address: env::var("APP_BIND_ADDRESS")
                .unwrap_or_else(|_| defaults.bind_address.clone()),
            default_consultation_minutes: parse_or(
                "QUEUE_AVG_CONSULTATION_MINUTES",
                defaults.default_consultation_minutes,
            ),
            check_in_opens_minutes_before: parse_optional("QUEUE_CHECK_IN_OPENS_MINUTES_BEFORE"),
            clinic_utc_offset_minutes: parse_or(
                "CLINIC_UTC_OFFSET_MINUTES",
                defaults.clinic_utc_offset_minutes,
            ),
            session_retention_days: parse_or(
                "QUEUE_SESSION_RETENTION_DAYS",
                defaults.session_retention_days,
            ),
            doctor_directory_path: env::var("DOCTOR_DIRECTORY_PATH").ok(),
            poll_interval_seconds: parse_positive_or(
                "QUEUE_POLL_INTERVAL_SECONDS",
                defaults.poll_interval_seconds,
            ),
            client_timeout_seconds: parse_positive_or(
                "QUEUE_CLIENT_TIMEOUT_SECONDS",
                defaults.client_timeout_seconds,
            ),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        if config.default_consultation_minutes == 0 {
            warn!("QUEUE_AVG_CONSULTATION_MINUTES is 0, wait estimates will always be zero");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.jwt_secret.is_empty()
    }

    /// Clinic-local offset used to decide which calendar day is "today".
    /// Out-of-range offsets fall back to UTC.
    pub fn clinic_offset(&self) -> chrono::FixedOffset {
        chrono::FixedOffset::east_opt(self.clinic_utc_offset_minutes * 60).unwrap_or_else(|| {
            warn!(
                "CLINIC_UTC_OFFSET_MINUTES={} is out of range, using UTC",
                self.clinic_utc_offset_minutes
            );
            chrono::Utc.fix()
        })
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

/// Like `parse_or`, but zero also counts as invalid.
fn parse_positive_or(key: &str, default: u64) -> u64 {
    match parse_or(key, default) {
        0 => {
            warn!("{} must be greater than zero, using default {}", key, default);
            default
        }
        value => value,
    }
}

fn parse_optional<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("{} has invalid value '{}', ignoring", key, raw);
            None
        }
    }
}
