use serde::Serialize;

use crate::{
    api::ApiError,
    models::SubmissionResult,
    wizard::WizardError,
};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Transient toast shown to the user.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message)
    }

    fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn for_submission(result: &SubmissionResult) -> Self {
        let distance = result.distance_meters.round();
        if result.is_present() {
            Self::success(format!("Attendance marked PRESENT ({distance}m from class)"))
        } else {
            Self::warning(format!(
                "Marked ABSENT: you are {distance}m from the classroom"
            ))
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NotificationLevel::Error
    }
}

impl From<&ApiError> for Notification {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::Network(_) => {
                Self::error("Cannot reach the attendance server. Check your connection and retry.")
            }
            ApiError::Service { status, message } if err.is_retryable() => Self::error(format!(
                "Server error ({status}): {message}. Please retry."
            )),
            ApiError::Service { status, message } => {
                Self::error(format!("Request failed ({status}): {message}"))
            }
            ApiError::Validation(message) => Self::error(format!("Request rejected: {message}")),
            ApiError::Auth(message) => Self::error(format!("Sign-in failed: {message}")),
            ApiError::Decode(_) => {
                Self::error("The server sent an unexpected response. Please retry.")
            }
        }
    }
}

impl From<&WizardError> for Notification {
    fn from(err: &WizardError) -> Self {
        match err {
            WizardError::NoActiveSession => {
                Self::info("No active session right now. Wait for your instructor to start one.")
            }
            WizardError::LocationRequired => Self::warning("Allow location access first."),
            WizardError::PhotoRequired => Self::warning("Take a photo before submitting."),
            WizardError::Permission { reason, .. } => Self::error(reason.clone()),
            WizardError::Capture(reason) => {
                Self::error(format!("Camera problem: {reason}. Try again."))
            }
            WizardError::Validation(reason) => Self::error(reason.clone()),
            WizardError::OutOfOrder { .. } => Self::warning(err.to_string()),
            WizardError::Abandoned => Self::info("Previous submission was discarded."),
            WizardError::Submission(api) => Self::from(api),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Verdict;

    #[test]
    fn present_verdict_mentions_distance() {
        let note = Notification::for_submission(&SubmissionResult {
            verdict: Verdict::Present,
            distance_meters: 8.0,
        });
        assert_eq!(note.level, NotificationLevel::Success);
        assert_eq!(note.message, "Attendance marked PRESENT (8m from class)");

        let note = Notification::for_submission(&SubmissionResult {
            verdict: Verdict::Absent,
            distance_meters: 412.4,
        });
        assert_eq!(note.level, NotificationLevel::Warning);
        assert!(note.message.contains("412m"));
    }

    #[test]
    fn network_failures_prompt_a_retry() {
        let note = Notification::from(&ApiError::Network("refused".into()));
        assert!(note.is_error());
        assert!(note.message.contains("retry"));
    }

    #[test]
    fn only_server_side_statuses_prompt_a_retry() {
        let unavailable = Notification::from(&ApiError::Service {
            status: 503,
            message: "Service Unavailable".into(),
        });
        assert!(unavailable.message.contains("retry"));

        let missing = Notification::from(&ApiError::Service {
            status: 404,
            message: "Not Found".into(),
        });
        assert!(missing.is_error());
        assert!(!missing.message.contains("retry"));
    }
}
