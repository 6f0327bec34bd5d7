use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use super::{
    reconciler::{Outcome, Reconciler},
    source::{SessionSource, SourceKind, SourceUpdate},
};
use crate::{cache::SessionCache, models::Session};

const UPDATE_CHANNEL_CAPACITY: usize = 32;

pub type SessionHandler = Arc<dyn Fn(Option<&Session>) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct Running {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Running {
    fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            task.abort();
        }
    }
}

#[derive(Default)]
struct Handlers {
    next_id: u64,
    entries: Vec<(u64, SessionHandler)>,
}

struct StoreInner {
    sources: Vec<Arc<dyn SessionSource>>,
    cache: Option<SessionCache>,
    state: watch::Sender<Option<Session>>,
    reconciler: Mutex<Reconciler>,
    /// What the shared cache is believed to hold. `None` until known.
    cached: tokio::sync::Mutex<Option<Option<Session>>>,
    handlers: Mutex<Handlers>,
    running: Mutex<Option<Running>>,
}

/// Single authoritative view of "is there an active session, and which one".
///
/// Sources run only while someone is subscribed: the first [`subscribe`](Self::subscribe)
/// starts every source plus the reconcile task, dropping the last [`Subscription`]
/// cancels them. Subscribing must happen inside a Tokio runtime.
#[derive(Clone)]
pub struct SessionStateStore {
    inner: Arc<StoreInner>,
}

/// Keeps a handler registered. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    inner: Arc<StoreInner>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Taken under the handlers lock so a concurrent first subscribe starts fresh
        // sources instead of adopting ones about to be stopped.
        let running = {
            let mut handlers = lock(&self.inner.handlers);
            handlers.entries.retain(|(id, _)| *id != self.id);
            if handlers.entries.is_empty() {
                lock(&self.inner.running).take()
            } else {
                None
            }
        };
        if let Some(running) = running {
            running.stop();
            info!("session store stopped");
        }
    }
}

impl SessionStateStore {
    /// Builds the store and seeds it from the local cache before any remote channel runs.
    pub async fn open(sources: Vec<Arc<dyn SessionSource>>, cache: Option<SessionCache>) -> Self {
        let (state, _) = watch::channel(None);
        let store = Self {
            inner: Arc::new(StoreInner {
                sources,
                cache,
                state,
                reconciler: Mutex::new(Reconciler::new()),
                cached: tokio::sync::Mutex::new(None),
                handlers: Mutex::new(Handlers::default()),
                running: Mutex::new(None),
            }),
        };
        store.inner.seed_from_cache().await;
        store
    }

    pub fn current_session(&self) -> Option<Session> {
        self.inner.state.borrow().clone()
    }

    /// Receiver that always holds the last emitted value.
    pub fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.inner.state.subscribe()
    }

    /// Registers `handler` for every change. It is not called with the current value.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(Option<&Session>) + Send + Sync + 'static,
    {
        let handler: SessionHandler = Arc::new(handler);
        let id = {
            let mut handlers = lock(&self.inner.handlers);
            let id = handlers.next_id;
            handlers.next_id += 1;
            handlers.entries.push((id, handler));
            if handlers.entries.len() == 1 {
                self.inner.start();
            }
            id
        };

        Subscription {
            id,
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.running).is_some()
    }

    /// Stops every source regardless of live subscriptions.
    pub fn shutdown(&self) {
        self.inner.stop();
    }

    /// Feeds one update through the same path the sources use.
    pub async fn ingest(&self, update: SourceUpdate) {
        self.inner.handle_update(update).await;
    }
}

impl StoreInner {
    fn start(self: &Arc<Self>) {
        let mut running = lock(&self.running);
        if running.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);

        let mut tasks: Vec<JoinHandle<()>> = self
            .sources
            .iter()
            .map(|source| source.spawn(tx.clone(), cancel.child_token()))
            .collect();
        drop(tx);

        let inner = Arc::clone(self);
        let token = cancel.clone();
        tasks.push(tokio::spawn(async move {
            inner.reconcile_loop(rx, token).await;
        }));

        let kinds: Vec<SourceKind> = self.sources.iter().map(|source| source.kind()).collect();
        info!("session store started with sources {kinds:?}");
        *running = Some(Running { cancel, tasks });
    }

    fn stop(&self) {
        if let Some(running) = lock(&self.running).take() {
            running.stop();
            info!("session store stopped");
        }
    }

    async fn reconcile_loop(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<SourceUpdate>,
        cancel: CancellationToken,
    ) {
        loop {
            let update = tokio::select! {
                update = rx.recv() => update,
                _ = cancel.cancelled() => break,
            };
            let Some(update) = update else {
                break;
            };
            self.handle_update(update).await;
        }
    }

    async fn seed_from_cache(&self) {
        let Some(cache) = &self.cache else {
            return;
        };

        match cache.active_session_entry().await {
            Ok(Some(entry)) => match entry.session {
                Ok(session) => {
                    *self.cached.lock().await = Some(session.clone());
                    self.handle_update(SourceUpdate {
                        source: SourceKind::Cache,
                        observed_at: entry.updated_at,
                        result: Ok(session),
                    })
                    .await;
                }
                Err(err) => debug!("ignoring cached session: {err}"),
            },
            Ok(None) => {}
            Err(err) => warn!("could not read cached session: {err}"),
        }
    }

    async fn handle_update(&self, update: SourceUpdate) {
        let (outcome, current, last_observed) = {
            let mut reconciler = lock(&self.reconciler);
            let outcome = reconciler.apply(&update);
            (
                outcome,
                reconciler.current().cloned(),
                reconciler.last_observed(),
            )
        };

        match (&outcome, &update.result) {
            (Outcome::Failed, Err(err)) if err.is_stale_cache() => {
                debug!("dropped stale cache payload: {err}");
            }
            (Outcome::Failed, Err(err)) => {
                warn!("{:?} source failed, keeping current session: {err}", update.source);
            }
            (Outcome::Stale, _) => {
                debug!(
                    "dropped {:?} update observed at {}, last applied {:?}",
                    update.source, update.observed_at, last_observed
                );
            }
            (Outcome::Changed, _) => self.emit(current.as_ref()),
            _ => {}
        }

        if let Ok(observed) = &update.result {
            if update.source == SourceKind::Cache {
                *self.cached.lock().await = Some(observed.clone());
            } else if update.source.is_authoritative() && outcome != Outcome::Stale {
                self.write_through(current, update.observed_at).await;
            }
        }
    }

    fn emit(&self, session: Option<&Session>) {
        match session {
            Some(session) => info!(
                "active session is now {} ({} {})",
                session.id,
                session.course_id,
                session.venue()
            ),
            None => info!("no active session"),
        }

        self.state.send_replace(session.cloned());

        let handlers: Vec<SessionHandler> = lock(&self.handlers)
            .entries
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(session);
        }
    }

    async fn write_through(&self, session: Option<Session>, observed_at: DateTime<Utc>) {
        let Some(cache) = &self.cache else {
            return;
        };

        let mut cached = self.cached.lock().await;
        if cached.as_ref() == Some(&session) {
            return;
        }

        match cache.write_active_session(session.as_ref(), observed_at).await {
            Ok(revision) => {
                debug!("cached active session at revision {revision}");
                *cached = Some(session);
            }
            Err(err) => warn!("failed to write active session to cache: {err}"),
        }
    }
}
