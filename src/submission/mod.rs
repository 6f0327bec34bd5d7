//! Sends a finished capture to the verification service.

use log::info;

use crate::{
    api::{ApiClient, ApiError, AttendanceForm},
    models::{CaptureArtifact, SessionId, StudentIdentity, SubmissionResult},
};

/// The client does no geofence math; it only relays the service's verdict.
#[derive(Clone)]
pub struct SubmissionClient {
    api: ApiClient,
}

impl SubmissionClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn submit(
        &self,
        artifact: &CaptureArtifact,
        student: &StudentIdentity,
        session_id: SessionId,
    ) -> Result<SubmissionResult, ApiError> {
        if student.reg_no.trim().is_empty() {
            return Err(ApiError::Validation("registration number is missing".into()));
        }
        artifact
            .location
            .validate()
            .map_err(ApiError::Validation)?;
        if artifact.photo.is_empty() {
            return Err(ApiError::Validation("photo is empty".into()));
        }

        let form = AttendanceForm {
            reg_no: &student.reg_no,
            session_id,
            location: artifact.location,
            photo: &artifact.photo,
        };
        let result = self.api.submit_attendance(&form).await?;
        info!(
            "attendance for {} in session {session_id}: {:?} at {:.1}m",
            student.reg_no, result.verdict, result.distance_meters
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinates, Photo, Verdict};
    use std::time::Duration;
    use wiremock::{
        matchers::{body_string_contains, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn artifact(latitude: f64) -> CaptureArtifact {
        CaptureArtifact {
            session: serde_json::from_value(serde_json::json!({
                "session_id": 42, "course_id": "CSE3021", "block": "AB1", "room": "301"
            }))
            .unwrap(),
            location: Coordinates {
                latitude,
                longitude: 73.0243,
            },
            photo: Photo::jpeg(b"jpeg-bytes".to_vec()),
        }
    }

    fn student() -> StudentIdentity {
        StudentIdentity {
            reg_no: "21BCE1001".into(),
            name: "Asha".into(),
            section: "A1".into(),
            branch: "CSE".into(),
            teacher_id: "T01".into(),
        }
    }

    #[tokio::test]
    async fn relays_the_service_verdict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/attendance/submit"))
            .and(body_string_contains("21BCE1001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "Absent", "distance_meters": 412.5
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = SubmissionClient::new(
            ApiClient::new(server.uri(), Duration::from_secs(5)).unwrap(),
        );
        let result = client
            .submit(&artifact(26.2389), &student(), SessionId(42))
            .await
            .unwrap();
        assert_eq!(result.verdict, Verdict::Absent);
        assert_eq!(result.distance_meters, 412.5);
    }

    #[tokio::test]
    async fn rejects_bad_coordinates_before_sending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = SubmissionClient::new(
            ApiClient::new(server.uri(), Duration::from_secs(5)).unwrap(),
        );
        let err = client
            .submit(&artifact(f64::NAN), &student(), SessionId(42))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
