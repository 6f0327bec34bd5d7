use rand::Rng;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Duration},
};
use tokio_util::sync::CancellationToken;

use super::source::{SessionSource, SourceError, SourceKind, SourceUpdate};
use crate::api::ApiClient;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Polls `GET /student/session/{reg_no}`. The first request goes out immediately.
#[derive(Clone)]
pub struct PollSource {
    api: ApiClient,
    reg_no: String,
    interval: Duration,
    jitter: Duration,
}

impl PollSource {
    pub fn new(api: ApiClient, reg_no: impl Into<String>, interval: Duration) -> Self {
        Self {
            api,
            reg_no: reg_no.into(),
            interval,
            jitter: Duration::ZERO,
        }
    }

    /// Spreads polls from many clients so they don't hit the server in lockstep.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    fn next_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.interval;
        }
        let extra = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        self.interval + Duration::from_millis(extra)
    }
}

impl SessionSource for PollSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Poll
    }

    fn spawn(
        &self,
        tx: mpsc::Sender<SourceUpdate>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let source = self.clone();
        tokio::spawn(async move { poll_loop(source, tx, cancel).await })
    }
}

async fn poll_loop(
    source: PollSource,
    tx: mpsc::Sender<SourceUpdate>,
    cancel: CancellationToken,
) {
    log_info!(
        "session poll started for {} every {:?}",
        source.reg_no,
        source.interval
    );

    loop {
        let fetched = tokio::select! {
            result = source.api.student_session(&source.reg_no) => result,
            _ = cancel.cancelled() => break,
        };

        let update = match fetched {
            Ok(session) => SourceUpdate::observed(SourceKind::Poll, session),
            Err(err) => {
                log_warn!("session poll for {} failed: {err}", source.reg_no);
                SourceUpdate::failed(SourceKind::Poll, SourceError::Remote(err.to_string()))
            }
        };

        if tx.send(update).await.is_err() {
            break;
        }

        tokio::select! {
            _ = time::sleep(source.next_delay()) => {}
            _ = cancel.cancelled() => break,
        }
    }

    log_info!("session poll for {} shutting down", source.reg_no);
}
