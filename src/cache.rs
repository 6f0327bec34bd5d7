//! Advisory cache shared by every running context (window or process) on this machine.
//!
//! Holds the last known active session, the session id the student is submitting for,
//! and the signed-in user. Nothing here outranks a fresh remote read; writes are
//! last-writer-wins with no locking.

use std::fmt;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    db::{CacheEntry, Database},
    models::{live_session, Identity, Session, SessionId},
};

pub const ACTIVE_SESSION_KEY: &str = "active_session";
pub const SUBMISSION_SESSION_KEY: &str = "submission_session_id";
pub const USER_KEY: &str = "user";

/// Identifies the context that wrote a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CacheError {
    /// Malformed payload. Dropped silently by every consumer.
    #[error("stale cache entry '{key}': {reason}")]
    Stale { key: String, reason: String },
    #[error("cache storage failed: {0}")]
    Storage(String),
}

impl CacheError {
    fn storage(err: anyhow::Error) -> Self {
        CacheError::Storage(format!("{err:#}"))
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, CacheError::Stale { .. })
    }
}

/// The cached active session together with its row metadata.
#[derive(Debug, Clone)]
pub struct CachedSession {
    pub revision: i64,
    pub writer: String,
    pub updated_at: DateTime<Utc>,
    pub session: Result<Option<Session>, CacheError>,
}

#[derive(Clone)]
pub struct SessionCache {
    db: Database,
    context: ContextId,
}

impl SessionCache {
    pub fn new(db: Database, context: ContextId) -> Self {
        Self { db, context }
    }

    pub fn is_own_write(&self, writer: &str) -> bool {
        writer == self.context.to_string()
    }

    /// `Ok(None)` when the key was never written.
    pub async fn active_session_entry(&self) -> Result<Option<CachedSession>, CacheError> {
        let entry = self
            .db
            .get_cache_entry(ACTIVE_SESSION_KEY)
            .await
            .map_err(CacheError::storage)?;

        Ok(entry.map(|entry| CachedSession {
            session: decode_value::<Session>(&entry).map(live_session),
            revision: entry.revision,
            writer: entry.writer,
            updated_at: entry.updated_at,
        }))
    }

    pub async fn write_active_session(
        &self,
        session: Option<&Session>,
        observed_at: DateTime<Utc>,
    ) -> Result<i64, CacheError> {
        let entry = match session {
            Some(session) => self.put(ACTIVE_SESSION_KEY, session, observed_at).await?,
            None => self.clear(ACTIVE_SESSION_KEY, observed_at).await?,
        };
        Ok(entry.revision)
    }

    pub async fn submission_session_id(&self) -> Result<Option<SessionId>, CacheError> {
        self.get(SUBMISSION_SESSION_KEY).await
    }

    pub async fn set_submission_session_id(&self, id: SessionId) -> Result<(), CacheError> {
        self.put(SUBMISSION_SESSION_KEY, &id, Utc::now()).await?;
        Ok(())
    }

    pub async fn clear_submission_session_id(&self) -> Result<(), CacheError> {
        self.clear(SUBMISSION_SESSION_KEY, Utc::now()).await?;
        Ok(())
    }

    pub async fn user(&self) -> Result<Option<Identity>, CacheError> {
        self.get(USER_KEY).await
    }

    pub async fn set_user(&self, identity: &Identity) -> Result<(), CacheError> {
        self.put(USER_KEY, identity, Utc::now()).await?;
        Ok(())
    }

    pub async fn clear_user(&self) -> Result<(), CacheError> {
        self.clear(USER_KEY, Utc::now()).await?;
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let entry = self
            .db
            .get_cache_entry(key)
            .await
            .map_err(CacheError::storage)?;

        match entry {
            Some(entry) => decode_value(&entry),
            None => Ok(None),
        }
    }

    async fn put<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        updated_at: DateTime<Utc>,
    ) -> Result<CacheEntry, CacheError> {
        let raw = serde_json::to_string(value)
            .map_err(|err| CacheError::Storage(format!("failed to encode {key}: {err}")))?;
        self.db
            .put_cache_entry(key, raw, &self.context.to_string(), updated_at)
            .await
            .map_err(CacheError::storage)
    }

    async fn clear(&self, key: &str, updated_at: DateTime<Utc>) -> Result<CacheEntry, CacheError> {
        self.db
            .clear_cache_entry(key, &self.context.to_string(), updated_at)
            .await
            .map_err(CacheError::storage)
    }
}

fn decode_value<T: DeserializeOwned>(entry: &CacheEntry) -> Result<Option<T>, CacheError> {
    let Some(raw) = entry.value.as_deref() else {
        return Ok(None);
    };

    serde_json::from_str::<T>(raw).map(Some).map_err(|err| {
        debug!("discarding malformed cache entry {}: {err}", entry.key);
        CacheError::Stale {
            key: entry.key.clone(),
            reason: err.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudentIdentity;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn session(id: i64) -> Session {
        serde_json::from_value(serde_json::json!({
            "session_id": id,
            "course_id": "CSE3021",
            "block": "AB1",
            "room": "301",
            "section": "A1",
            "teacher_id": "T01",
        }))
        .unwrap()
    }

    fn open_cache(dir: &TempDir) -> SessionCache {
        let db = Database::new(dir.path().join("attendance.sqlite3")).unwrap();
        SessionCache::new(db, ContextId::new())
    }

    #[tokio::test]
    async fn round_trips_active_session_and_tombstone() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);

        assert!(cache.active_session_entry().await.unwrap().is_none());

        let revision = cache
            .write_active_session(Some(&session(42)), Utc::now())
            .await
            .unwrap();
        let entry = cache.active_session_entry().await.unwrap().unwrap();
        assert_eq!(entry.revision, revision);
        assert!(cache.is_own_write(&entry.writer));
        assert_eq!(entry.session, Ok(Some(session(42))));

        cache.write_active_session(None, Utc::now()).await.unwrap();
        let entry = cache.active_session_entry().await.unwrap().unwrap();
        assert_eq!(entry.revision, revision + 1);
        assert_eq!(entry.session, Ok(None));
    }

    #[tokio::test]
    async fn malformed_payload_is_reported_as_stale() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);
        cache
            .db
            .put_cache_entry(ACTIVE_SESSION_KEY, "{not json".into(), "other", Utc::now())
            .await
            .unwrap();

        let entry = cache.active_session_entry().await.unwrap().unwrap();
        assert!(entry.session.unwrap_err().is_stale());
    }

    #[tokio::test]
    async fn contexts_sharing_a_file_see_each_other() {
        let dir = TempDir::new().unwrap();
        let first = open_cache(&dir);
        let second = open_cache(&dir);

        first.set_submission_session_id(SessionId(9)).await.unwrap();
        assert_eq!(second.submission_session_id().await.unwrap(), Some(SessionId(9)));

        let identity = Identity::Student(StudentIdentity {
            reg_no: "230905001".into(),
            name: "Asha".into(),
            section: "A1".into(),
            branch: "CSE".into(),
            teacher_id: "T01".into(),
        });
        second.set_user(&identity).await.unwrap();
        assert_eq!(first.user().await.unwrap(), Some(identity));

        first.clear_user().await.unwrap();
        assert_eq!(second.user().await.unwrap(), None);
    }
}
