// libs/appointment-cell/src/services/lifecycle.rs
use reqwest::Url;
use tracing::{debug, warn};

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, AppointmentValidationRules, MeetingDetails,
    MeetingPlatform,
};

/// Legal appointment status changes and the business rules attached to them.
#[derive(Debug, Clone, Default)]
pub struct AppointmentLifecycleService {
    rules: AppointmentValidationRules,
}

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: AppointmentValidationRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &AppointmentValidationRules {
        &self.rules
    }

    /// Validate that a status transition is allowed. A terminal source always
    /// fails with `TerminalStateViolation`, whatever the target.
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if current_status.is_terminal() {
            warn!("Transition attempted from terminal state {} to {}", current_status, new_status);
            return Err(AppointmentError::TerminalStateViolation(current_status));
        }

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Booked => vec![
                AppointmentStatus::CheckedIn,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::CheckedIn => vec![
                AppointmentStatus::InProgress,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::InProgress => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }

    /// Completion requires an outcome to be recorded. Returns the trimmed notes.
    pub fn validate_completion_notes(&self, notes: Option<&str>) -> Result<String, AppointmentError> {
        let notes = notes.map(str::trim).filter(|n| !n.is_empty());

        match notes {
            None => Err(AppointmentError::NotesRequired),
            Some(n) if n.chars().count() > self.rules.max_notes_length => {
                Err(AppointmentError::ValidationError(format!(
                    "Notes cannot exceed {} characters",
                    self.rules.max_notes_length
                )))
            }
            Some(n) => Ok(n.to_string()),
        }
    }

    /// Meeting details may be attached to an ONLINE appointment at any point
    /// before it reaches a terminal state.
    pub fn validate_meeting_link(
        &self,
        appointment: &Appointment,
        link: &str,
        platform: Option<MeetingPlatform>,
    ) -> Result<MeetingDetails, AppointmentError> {
        if appointment.status.is_terminal() {
            return Err(AppointmentError::TerminalStateViolation(appointment.status));
        }

        if !appointment.is_online() {
            return Err(AppointmentError::ValidationError(
                "Meeting link allowed only for ONLINE appointments".to_string(),
            ));
        }

        let url = parse_meeting_url(link)?;

        Ok(MeetingDetails {
            link: url.to_string(),
            platform: platform.unwrap_or_default(),
        })
    }
}

/// Absolute http(s) URL with a host.
pub fn parse_meeting_url(link: &str) -> Result<Url, AppointmentError> {
    let trimmed = link.trim();
    if trimmed.is_empty() {
        return Err(AppointmentError::InvalidMeetingLink(
            "Meeting link cannot be empty".to_string(),
        ));
    }

    let url = Url::parse(trimmed)
        .map_err(|e| AppointmentError::InvalidMeetingLink(format!("{}: {}", trimmed, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppointmentError::InvalidMeetingLink(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(AppointmentError::InvalidMeetingLink(
            "meeting link must include a host".to_string(),
        ));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn happy_path_transitions_are_legal() {
        let lifecycle = AppointmentLifecycleService::new();
        use AppointmentStatus::*;

        for (from, to) in [
            (Booked, CheckedIn),
            (CheckedIn, InProgress),
            (InProgress, Completed),
            (Booked, Cancelled),
            (CheckedIn, Cancelled),
            (InProgress, Cancelled),
        ] {
            assert!(lifecycle.validate_status_transition(from, to).is_ok(), "{} -> {}", from, to);
        }
    }

    #[test]
    fn skipping_steps_is_rejected() {
        let lifecycle = AppointmentLifecycleService::new();
        assert_matches!(
            lifecycle.validate_status_transition(AppointmentStatus::Booked, AppointmentStatus::Completed),
            Err(AppointmentError::InvalidStatusTransition { .. })
        );
        assert_matches!(
            lifecycle.validate_status_transition(AppointmentStatus::Booked, AppointmentStatus::InProgress),
            Err(AppointmentError::InvalidStatusTransition { .. })
        );
    }

    #[test]
    fn terminal_states_reject_everything() {
        let lifecycle = AppointmentLifecycleService::new();
        for target in [AppointmentStatus::Booked, AppointmentStatus::Cancelled, AppointmentStatus::Completed] {
            assert_matches!(
                lifecycle.validate_status_transition(AppointmentStatus::Completed, target),
                Err(AppointmentError::TerminalStateViolation(AppointmentStatus::Completed))
            );
            assert_matches!(
                lifecycle.validate_status_transition(AppointmentStatus::Cancelled, target),
                Err(AppointmentError::TerminalStateViolation(AppointmentStatus::Cancelled))
            );
        }
    }

    #[test]
    fn completion_notes_are_required() {
        let lifecycle = AppointmentLifecycleService::new();
        assert_matches!(lifecycle.validate_completion_notes(None), Err(AppointmentError::NotesRequired));
        assert_matches!(lifecycle.validate_completion_notes(Some("   ")), Err(AppointmentError::NotesRequired));
        assert_eq!(lifecycle.validate_completion_notes(Some(" stable ")).unwrap(), "stable");

        let long = "x".repeat(501);
        assert_matches!(
            lifecycle.validate_completion_notes(Some(&long)),
            Err(AppointmentError::ValidationError(_))
        );
    }

    #[test]
    fn meeting_urls_must_be_absolute_http() {
        assert!(parse_meeting_url("https://meet.example.com/abc").is_ok());
        assert!(parse_meeting_url("http://zoom.example.com/j/1").is_ok());
        assert_matches!(parse_meeting_url("ftp://bad"), Err(AppointmentError::InvalidMeetingLink(_)));
        assert_matches!(parse_meeting_url("meet.example.com/abc"), Err(AppointmentError::InvalidMeetingLink(_)));
        assert_matches!(parse_meeting_url(""), Err(AppointmentError::InvalidMeetingLink(_)));
    }
}
