use chrono::{DateTime, Utc};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use super::source::{SessionSource, SourceKind, SourceUpdate};
use crate::models::Session;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_warn;

#[derive(Debug, Clone)]
pub struct PushedSession {
    pub session: Option<Session>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Server-push channel. Whatever receives pushes (a subscription socket, a desktop
/// event listener) publishes through a [`PushPublisher`].
#[derive(Clone)]
pub struct PushSource {
    sender: broadcast::Sender<PushedSession>,
}

/// Publishing half of a [`PushSource`]. Pushes made while nobody listens are dropped;
/// the poll channel covers the gap.
#[derive(Clone)]
pub struct PushPublisher {
    sender: broadcast::Sender<PushedSession>,
}

impl PushPublisher {
    pub fn publish(&self, session: Option<Session>, sent_at: Option<DateTime<Utc>>) -> bool {
        self.sender
            .send(PushedSession { session, sent_at })
            .is_ok()
    }
}

impl PushSource {
    pub fn new(capacity: usize) -> (Self, PushPublisher) {
        let (sender, _) = broadcast::channel(capacity.max(1));
        (
            Self {
                sender: sender.clone(),
            },
            PushPublisher { sender },
        )
    }
}

impl SessionSource for PushSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Push
    }

    fn spawn(
        &self,
        tx: mpsc::Sender<SourceUpdate>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        // Subscribe before returning so nothing published after `spawn` is missed.
        let mut rx = self.sender.subscribe();
        tokio::spawn(async move {
            loop {
                let pushed = tokio::select! {
                    received = rx.recv() => received,
                    _ = cancel.cancelled() => break,
                };

                let pushed = match pushed {
                    Ok(pushed) => pushed,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log_warn!("push channel lagged, {skipped} updates skipped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                // The sender's clock may run ahead of ours; never stamp past arrival.
                let arrived = Utc::now();
                let update = SourceUpdate {
                    source: SourceKind::Push,
                    observed_at: pushed.sent_at.map_or(arrived, |sent| sent.min(arrived)),
                    result: Ok(pushed.session),
                };
                if tx.send(update).await.is_err() {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;
    use tokio::time;

    use crate::models::SessionId;

    fn session(id: i64) -> Session {
        serde_json::from_value(serde_json::json!({
            "session_id": id, "course_id": "CSE3021", "block": "AB1", "room": "301"
        }))
        .unwrap()
    }

    async fn next(rx: &mut mpsc::Receiver<SourceUpdate>) -> SourceUpdate {
        time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn stamps_are_clamped_to_arrival() {
        let (source, publisher) = PushSource::new(4);
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let _handle = source.spawn(tx, cancel.clone());

        let ahead = Utc::now() + ChronoDuration::seconds(30);
        assert!(publisher.publish(Some(session(42)), Some(ahead)));
        let update = next(&mut rx).await;
        assert!(update.observed_at <= Utc::now());

        let behind = Utc::now() - ChronoDuration::seconds(5);
        publisher.publish(None, Some(behind));
        assert_eq!(next(&mut rx).await.observed_at, behind);
        cancel.cancel();
    }

    #[tokio::test]
    async fn lagging_listener_skips_to_newest() {
        let (source, publisher) = PushSource::new(1);
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let _handle = source.spawn(tx, cancel.clone());

        for id in 1..=3 {
            publisher.publish(Some(session(id)), None);
        }
        let update = next(&mut rx).await;
        assert_eq!(update.source, SourceKind::Push);
        assert_eq!(update.result.unwrap().map(|s| s.id), Some(SessionId(3)));
        cancel.cancel();
    }
}
