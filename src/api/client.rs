use std::time::Duration;

use anyhow::{bail, Result};
use log::{debug, info};
use reqwest::{
    header::CONTENT_TYPE,
    multipart::{Form, Part},
    Response, Url,
};
use serde::de::DeserializeOwned;

use super::{
    error::{error_message, ApiError},
    types::{SessionLookup, StartSessionResponse},
};
use crate::models::{
    live_session, ClassDetails, Coordinates, Photo, Session, SessionId, StudentIdentity,
    SubmissionResult, TeacherIdentity,
};

/// Multipart body of `POST /attendance/submit`.
#[derive(Debug, Clone)]
pub struct AttendanceForm<'a> {
    pub reg_no: &'a str,
    pub session_id: SessionId,
    pub location: Coordinates,
    pub photo: &'a Photo,
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut raw = base_url.into();
        while raw.ends_with('/') {
            raw.pop();
        }
        let base_url = Url::parse(&raw)?;
        if base_url.cannot_be_a_base() {
            bail!("{raw} cannot be used as an API base URL");
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, http })
    }

    /// Appends `segments` to the base path, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub async fn login_student(
        &self,
        email: &str,
        password: &str,
    ) -> Result<StudentIdentity, ApiError> {
        self.login("student", email, password).await
    }

    pub async fn login_teacher(
        &self,
        email: &str,
        password: &str,
    ) -> Result<TeacherIdentity, ApiError> {
        self.login("teacher", email, password).await
    }

    async fn login<T: DeserializeOwned>(
        &self,
        role: &str,
        email: &str,
        password: &str,
    ) -> Result<T, ApiError> {
        let url = self.url(&["login", role]);
        let res = self
            .http
            .post(url.clone())
            .query(&[("email", email), ("password", password)])
            .send()
            .await?;

        match decode_json::<T>(url.as_str(), res).await {
            Err(ApiError::Validation(message)) => Err(ApiError::Auth(message)),
            other => other,
        }
    }

    /// Active session for a student, `None` when the instructor has not opened one.
    pub async fn student_session(&self, reg_no: &str) -> Result<Option<Session>, ApiError> {
        let url = self.url(&["student", "session", reg_no]);
        let res = self.http.get(url.clone()).send().await?;

        match decode_json::<SessionLookup>(url.as_str(), res).await? {
            SessionLookup::Active(session) => Ok(live_session(Some(session))),
            SessionLookup::Empty {} => Ok(None),
            SessionLookup::Failed { error } => Err(ApiError::Validation(error)),
        }
    }

    /// Session the instructor currently has open on the server, if any.
    pub async fn current_teacher_session(
        &self,
        teacher_id: &str,
    ) -> Result<Option<Session>, ApiError> {
        let url = self.url(&["session", "current", teacher_id]);
        let res = self.http.get(url.clone()).send().await?;

        match decode_json::<SessionLookup>(url.as_str(), res).await? {
            SessionLookup::Active(session) => Ok(live_session(Some(session))),
            SessionLookup::Empty {} => Ok(None),
            SessionLookup::Failed { error } => Err(ApiError::Validation(error)),
        }
    }

    pub async fn start_session(
        &self,
        teacher_id: &str,
        details: &ClassDetails,
    ) -> Result<SessionId, ApiError> {
        let url = self.url(&["session", "start"]);
        let latitude = details.location.latitude.to_string();
        let longitude = details.location.longitude.to_string();
        let res = self
            .http
            .post(url.clone())
            .query(&[
                ("teacher_id", teacher_id),
                ("course_id", details.course_id.as_str()),
                ("block", details.block.as_str()),
                ("room", details.room.as_str()),
                ("section", details.section.as_str()),
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
            ])
            .send()
            .await?;

        let started: StartSessionResponse = decode_json(url.as_str(), res).await?;
        info!("session {} started for {}", started.session_id, details.course_id);
        Ok(started.session_id)
    }

    /// Unknown or already stopped sessions count as stopped.
    pub async fn stop_session(&self, session_id: SessionId) -> Result<(), ApiError> {
        let url = self.url(&["session", "stop", &session_id.to_string()]);
        let res = self.http.post(url.clone()).send().await?;
        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(ApiError::from_status(status, &body));
        }
        if let Some(message) = error_message(&body) {
            debug!("stop {session_id}: {message}; treating as already closed");
        }
        Ok(())
    }

    pub async fn submit_attendance(
        &self,
        form: &AttendanceForm<'_>,
    ) -> Result<SubmissionResult, ApiError> {
        let url = self.url(&["attendance", "submit"]);
        let photo = Part::bytes(form.photo.bytes.clone())
            .file_name("attendance.jpg")
            .mime_str(&form.photo.mime)
            .map_err(|err| ApiError::Validation(format!("invalid photo type: {err}")))?;
        let body = Form::new()
            .text("reg_no", form.reg_no.to_string())
            .text("session_id", form.session_id.to_string())
            .text("latitude", form.location.latitude.to_string())
            .text("longitude", form.location.longitude.to_string())
            .part("photo", photo);

        let res = self.http.post(url.clone()).multipart(body).send().await?;
        decode_json(url.as_str(), res).await
    }

    /// Spreadsheet of everyone who submitted for `session_id`.
    pub async fn export_attendance(&self, session_id: SessionId) -> Result<Vec<u8>, ApiError> {
        let url = self.url(&["attendance", "export", &session_id.to_string()]);
        let res = self.http.get(url.clone()).send().await?;
        let status = res.status();
        let is_json = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false);
        let bytes = res.bytes().await?;

        if !status.is_success() {
            return Err(ApiError::from_status(
                status,
                &String::from_utf8_lossy(&bytes),
            ));
        }
        if is_json {
            let body = String::from_utf8_lossy(&bytes);
            let message = error_message(&body).unwrap_or_else(|| body.to_string());
            return Err(ApiError::Validation(message));
        }
        Ok(bytes.to_vec())
    }
}

/// Non-2xx statuses and 2xx bodies carrying `error` both become errors.
async fn decode_json<T: DeserializeOwned>(url: &str, res: Response) -> Result<T, ApiError> {
    let status = res.status();
    let body = res.text().await?;

    if !status.is_success() {
        return Err(ApiError::from_status(status, &body));
    }
    if let Some(message) = error_message(&body) {
        return Err(ApiError::Validation(message));
    }

    serde_json::from_str::<T>(&body)
        .map_err(|err| ApiError::Decode(format!("{url}: {err}; body={body}")))
}
