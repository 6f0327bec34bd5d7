use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{cache::CacheError, models::Session};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Poll,
    Push,
    Cache,
}

impl SourceKind {
    /// Only the remote poll reflects the server directly; its changes are written through
    /// to the shared cache.
    pub fn is_authoritative(self) -> bool {
        matches!(self, SourceKind::Poll)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("remote session lookup failed: {0}")]
    Remote(String),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl SourceError {
    pub fn is_stale_cache(&self) -> bool {
        matches!(self, SourceError::Cache(err) if err.is_stale())
    }
}

/// One observation from one channel.
#[derive(Debug, Clone)]
pub struct SourceUpdate {
    pub source: SourceKind,
    pub observed_at: DateTime<Utc>,
    pub result: Result<Option<Session>, SourceError>,
}

impl SourceUpdate {
    pub fn observed(source: SourceKind, session: Option<Session>) -> Self {
        Self {
            source,
            observed_at: Utc::now(),
            result: Ok(session),
        }
    }

    pub fn failed(source: SourceKind, err: SourceError) -> Self {
        Self {
            source,
            observed_at: Utc::now(),
            result: Err(err),
        }
    }
}

/// A channel that can report the currently active session.
///
/// `spawn` starts a producer task that forwards observations in arrival order until the
/// token is cancelled or the receiver goes away. It may be called again after a previous
/// task was torn down.
pub trait SessionSource: Send + Sync + 'static {
    fn kind(&self) -> SourceKind;

    fn spawn(
        &self,
        tx: mpsc::Sender<SourceUpdate>,
        cancel: CancellationToken,
    ) -> JoinHandle<()>;
}
