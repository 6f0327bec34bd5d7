use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to the attendance service.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    /// Service unreachable: connection refused, DNS, timeout.
    #[error("attendance service unreachable: {0}")]
    Network(String),
    #[error("attendance service returned {status}: {message}")]
    Service { status: u16, message: String },
    /// The service rejected the payload.
    #[error("request rejected: {0}")]
    Validation(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub(crate) fn from_status(status: StatusCode, body: &str) -> Self {
        let message = error_message(body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });

        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                ApiError::Validation(message)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Auth(message),
            _ => ApiError::Service {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Worth offering the user a retry without changing anything.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Decode(_) => true,
            ApiError::Service { status, .. } => *status >= 500,
            ApiError::Validation(_) | ApiError::Auth(_) => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ApiError::Decode(err.to_string());
        }
        if let Some(status) = err.status() {
            return ApiError::from_status(status, "");
        }
        ApiError::Network(err.to_string())
    }
}

/// Pulls the human readable message out of `{"error": ..}` or FastAPI's `{"detail": ..}`.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    if let Some(message) = value.get("error").and_then(|v| v.as_str()) {
        return Some(message.to_string());
    }
    match value.get("detail")? {
        serde_json::Value::String(detail) => Some(detail.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_http_statuses() {
        assert_eq!(
            ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, r#"{"detail":"latitude missing"}"#),
            ApiError::Validation("latitude missing".into())
        );
        assert_eq!(
            ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, ""),
            ApiError::Service {
                status: 500,
                message: "Internal Server Error".into()
            }
        );
        assert!(ApiError::from_status(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(!ApiError::Validation("x".into()).is_retryable());
    }

    #[test]
    fn error_message_ignores_success_bodies() {
        assert_eq!(error_message(r#"{"status":"Present"}"#), None);
        assert_eq!(error_message("not json"), None);
        assert_eq!(
            error_message(r#"{"error":"Attendance already submitted"}"#).as_deref(),
            Some("Attendance already submitted")
        );
    }
}
