use serde::Serialize;
use thiserror::Error;

use crate::{
    api::ApiError,
    models::{Session, SessionId},
};

/// What the instructor's toggle reflects.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeacherState {
    pub open_session: Option<Session>,
}

impl TeacherState {
    pub fn is_active(&self) -> bool {
        self.open_session.is_some()
    }

    pub fn open_session_id(&self) -> Option<SessionId> {
        self.open_session.as_ref().map(|session| session.id)
    }
}

#[derive(Debug, Error)]
pub enum TeacherError {
    #[error("attendance service unavailable: {0}")]
    ServiceUnavailable(#[source] ApiError),
    #[error("session {0} is still open; close it first")]
    SessionAlreadyOpen(SessionId),
    #[error("sign in as an instructor first")]
    NotSignedIn,
    #[error("failed to save export: {0}")]
    Export(#[from] std::io::Error),
}
