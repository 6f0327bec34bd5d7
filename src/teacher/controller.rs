use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use log::{info, warn};
use tokio::sync::{mpsc, Mutex};

use super::state::{TeacherError, TeacherState};
use crate::{
    api::{ApiClient, ApiError},
    cache::SessionCache,
    models::{ClassDetails, Session, SessionId, TeacherIdentity},
};

/// Opens and closes sessions for one instructor. Holds at most one open session id.
#[derive(Clone)]
pub struct TeacherSessionController {
    teacher: TeacherIdentity,
    api: ApiClient,
    cache: Option<SessionCache>,
    state: Arc<Mutex<TeacherState>>,
    listener: Option<mpsc::UnboundedSender<TeacherState>>,
}

impl TeacherSessionController {
    pub fn new(teacher: TeacherIdentity, api: ApiClient, cache: Option<SessionCache>) -> Self {
        Self {
            teacher,
            api,
            cache,
            state: Arc::new(Mutex::new(TeacherState::default())),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: mpsc::UnboundedSender<TeacherState>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn teacher(&self) -> &TeacherIdentity {
        &self.teacher
    }

    pub async fn get_state(&self) -> TeacherState {
        self.state.lock().await.clone()
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.is_active()
    }

    pub async fn open_session_id(&self) -> Option<SessionId> {
        self.state.lock().await.open_session_id()
    }

    fn publish(&self, state: &TeacherState) {
        if let Some(listener) = &self.listener {
            let _ = listener.send(state.clone());
        }
    }

    async fn mirror_to_cache(&self, session: Option<&Session>) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(err) = cache.write_active_session(session, Utc::now()).await {
            warn!("failed to mirror session to cache: {err}");
        }
    }

    pub async fn open(&self, details: ClassDetails) -> Result<Session, TeacherError> {
        let mut state = self.state.lock().await;
        if let Some(id) = state.open_session_id() {
            return Err(TeacherError::SessionAlreadyOpen(id));
        }

        let id = match self.api.start_session(&self.teacher.teacher_id, &details).await {
            Ok(id) => id,
            Err(err) => {
                warn!("could not open session for {}: {err}", details.course_id);
                self.publish(&state);
                return Err(TeacherError::ServiceUnavailable(err));
            }
        };

        let session = details.into_session(id, &self.teacher.teacher_id);
        info!(
            "{} opened session {} for {} at {}",
            self.teacher.teacher_id,
            session.id,
            session.course_id,
            session.venue()
        );
        state.open_session = Some(session.clone());
        self.mirror_to_cache(Some(&session)).await;
        self.publish(&state);
        Ok(session)
    }

    /// Safe to repeat: sessions the server no longer knows count as closed.
    /// Network failures keep the open id so the close can be retried.
    pub async fn close(&self, session_id: SessionId) -> Result<(), TeacherError> {
        let mut state = self.state.lock().await;

        match self.api.stop_session(session_id).await {
            Ok(()) => {}
            Err(ApiError::Service { status: 404, .. }) => {
                info!("session {session_id} already gone on the server");
            }
            Err(err) => {
                warn!("could not close session {session_id}: {err}");
                return Err(TeacherError::ServiceUnavailable(err));
            }
        }

        if state.open_session_id() == Some(session_id) {
            state.open_session = None;
            info!("{} closed session {session_id}", self.teacher.teacher_id);
            self.mirror_to_cache(None).await;
        }
        self.publish(&state);
        Ok(())
    }

    /// Drives the on/off switch. Returns the session now open, if any.
    pub async fn toggle(&self, details: ClassDetails) -> Result<Option<Session>, TeacherError> {
        match self.open_session_id().await {
            Some(id) => self.close(id).await.map(|_| None),
            None => self.open(details).await.map(Some),
        }
    }

    /// Adopts whatever the server still has open, e.g. after a restart.
    pub async fn recover(&self) -> Result<Option<Session>, TeacherError> {
        let remote = self
            .api
            .current_teacher_session(&self.teacher.teacher_id)
            .await
            .map_err(TeacherError::ServiceUnavailable)?;

        let mut state = self.state.lock().await;
        if state.open_session == remote {
            return Ok(remote);
        }

        match &remote {
            Some(session) => warn!("recovered open session {}", session.id),
            None => info!("no open session on the server"),
        }
        state.open_session = remote.clone();
        self.mirror_to_cache(remote.as_ref()).await;
        self.publish(&state);
        Ok(remote)
    }

    /// Downloads the attendance sheet for `session_id` into `dir`.
    pub async fn export_attendance(
        &self,
        session_id: SessionId,
        dir: &Path,
    ) -> Result<PathBuf, TeacherError> {
        let bytes = self
            .api
            .export_attendance(session_id)
            .await
            .map_err(TeacherError::ServiceUnavailable)?;

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("attendance_session_{session_id}.xlsx"));
        tokio::fs::write(&path, &bytes).await?;
        info!("exported {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }
}
