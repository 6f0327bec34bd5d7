use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Duration, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::source::{SessionSource, SourceError, SourceKind, SourceUpdate};
use crate::cache::SessionCache;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Reports `active_session` writes made by other contexts sharing the cache file.
///
/// The revision present when the watcher starts is taken as the baseline; only later
/// revisions are forwarded. Own writes are skipped.
#[derive(Clone)]
pub struct CacheSource {
    cache: SessionCache,
    interval: Duration,
}

impl CacheSource {
    pub fn new(cache: SessionCache, interval: Duration) -> Self {
        Self { cache, interval }
    }
}

impl SessionSource for CacheSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Cache
    }

    fn spawn(
        &self,
        tx: mpsc::Sender<SourceUpdate>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let source = self.clone();
        tokio::spawn(async move { watch_loop(source, tx, cancel).await })
    }
}

async fn watch_loop(
    source: CacheSource,
    tx: mpsc::Sender<SourceUpdate>,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(source.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut seen_revision: Option<i64> = None;
    let mut baseline_taken = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => {
                log_info!("cache watcher shutting down");
                break;
            }
        }

        let entry = match source.cache.active_session_entry().await {
            Ok(entry) => entry,
            Err(err) => {
                log_warn!("cache watcher read failed: {err}");
                if tx
                    .send(SourceUpdate::failed(SourceKind::Cache, SourceError::Cache(err)))
                    .await
                    .is_err()
                {
                    break;
                }
                continue;
            }
        };

        let revision = entry.as_ref().map(|e| e.revision);
        if !baseline_taken {
            baseline_taken = true;
            seen_revision = revision;
            continue;
        }
        if revision == seen_revision {
            continue;
        }
        seen_revision = revision;

        let Some(entry) = entry else {
            continue;
        };
        if source.cache.is_own_write(&entry.writer) {
            continue;
        }

        let update = SourceUpdate {
            source: SourceKind::Cache,
            observed_at: entry.updated_at,
            result: entry.session.map_err(SourceError::Cache),
        };
        if tx.send(update).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    use crate::cache::ContextId;
    use crate::db::Database;
    use crate::models::{Session, SessionId};

    fn session(id: i64) -> Session {
        serde_json::from_value(serde_json::json!({
            "session_id": id, "course_id": "CSE3021", "block": "AB1", "room": "301"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn forwards_foreign_writes_only() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("attendance.sqlite3")).unwrap();
        let ours = SessionCache::new(db.clone(), ContextId::new());
        let theirs = SessionCache::new(db, ContextId::new());

        let source = CacheSource::new(ours.clone(), Duration::from_millis(10));
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let _handle = source.spawn(tx, cancel.clone());
        time::sleep(Duration::from_millis(40)).await;

        ours.write_active_session(Some(&session(1)), Utc::now())
            .await
            .unwrap();
        time::sleep(Duration::from_millis(40)).await;
        theirs
            .write_active_session(Some(&session(2)), Utc::now())
            .await
            .unwrap();

        let update = time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.source, SourceKind::Cache);
        assert_eq!(update.result.unwrap().unwrap().id, SessionId(2));
        cancel.cancel();
    }
}
