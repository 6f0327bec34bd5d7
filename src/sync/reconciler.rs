use chrono::{DateTime, Utc};

use super::source::SourceUpdate;
use crate::models::{live_session, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Changed,
    Unchanged,
    /// A non-poll update observed before the last applied one.
    Stale,
    /// The source errored. Never read as "no session".
    Failed,
}

/// Folds updates from every source into one value. The most recently observed successful
/// update wins, except that a poll result is never treated as stale.
#[derive(Debug, Default, Clone)]
pub struct Reconciler {
    current: Option<Session>,
    last_observed: Option<DateTime<Utc>>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn last_observed(&self) -> Option<DateTime<Utc>> {
        self.last_observed
    }

    pub fn apply(&mut self, update: &SourceUpdate) -> Outcome {
        let Ok(observed) = &update.result else {
            return Outcome::Failed;
        };

        // The poll reflects the server directly, so other channels' timestamps
        // never hold it back.
        let authoritative = update.source.is_authoritative();
        if !authoritative && matches!(self.last_observed, Some(last) if update.observed_at < last)
        {
            return Outcome::Stale;
        }
        self.last_observed = match self.last_observed {
            Some(last) if authoritative => Some(last.max(update.observed_at)),
            _ => Some(update.observed_at),
        };

        let next = live_session(observed.clone());
        if next == self.current {
            Outcome::Unchanged
        } else {
            self.current = next;
            Outcome::Changed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheError;
    use crate::sync::source::{SourceError, SourceKind};
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn session(id: i64) -> Session {
        serde_json::from_value(serde_json::json!({
            "session_id": id,
            "course_id": "CSE3021",
            "block": "AB1",
            "room": "301",
        }))
        .unwrap()
    }

    fn at(
        base: DateTime<Utc>,
        offset_ms: i64,
        source: SourceKind,
        value: Option<Session>,
    ) -> SourceUpdate {
        SourceUpdate {
            source,
            observed_at: base + Duration::milliseconds(offset_ms),
            result: Ok(value),
        }
    }

    #[test]
    fn identical_update_does_not_change() {
        let base = Utc::now();
        let mut reconciler = Reconciler::new();

        assert_eq!(
            reconciler.apply(&at(base, 0, SourceKind::Push, Some(session(42)))),
            Outcome::Changed
        );
        assert_eq!(
            reconciler.apply(&at(base, 10, SourceKind::Poll, Some(session(42)))),
            Outcome::Unchanged
        );
        assert_eq!(reconciler.current(), Some(&session(42)));
    }

    #[test]
    fn failure_never_clears_a_good_value() {
        let base = Utc::now();
        let mut reconciler = Reconciler::new();
        reconciler.apply(&at(base, 0, SourceKind::Poll, Some(session(1))));

        let failed = SourceUpdate {
            source: SourceKind::Cache,
            observed_at: base + Duration::milliseconds(5),
            result: Err(SourceError::Cache(CacheError::Stale {
                key: "active_session".into(),
                reason: "eof".into(),
            })),
        };
        assert_eq!(reconciler.apply(&failed), Outcome::Failed);
        assert_eq!(reconciler.current(), Some(&session(1)));
    }

    #[test]
    fn older_observation_arriving_late_is_stale() {
        let base = Utc::now();
        let mut reconciler = Reconciler::new();
        reconciler.apply(&at(base, 100, SourceKind::Poll, None));

        assert_eq!(
            reconciler.apply(&at(base, 50, SourceKind::Cache, Some(session(3)))),
            Outcome::Stale
        );
        assert_eq!(reconciler.current(), None);
    }

    #[test]
    fn poll_is_not_held_back_by_a_future_stamp() {
        let base = Utc::now();
        let mut reconciler = Reconciler::new();
        reconciler.apply(&at(base, 30_000, SourceKind::Cache, Some(session(42))));

        assert_eq!(
            reconciler.apply(&at(base, 0, SourceKind::Poll, None)),
            Outcome::Changed
        );
        assert_eq!(reconciler.current(), None);
        assert_eq!(
            reconciler.last_observed(),
            Some(base + Duration::milliseconds(30_000))
        );
        assert_eq!(
            reconciler.apply(&at(base, 10, SourceKind::Push, Some(session(42)))),
            Outcome::Stale
        );
    }

    #[test]
    fn inactive_session_counts_as_none() {
        let base = Utc::now();
        let mut reconciler = Reconciler::new();
        reconciler.apply(&at(base, 0, SourceKind::Poll, Some(session(5))));

        let mut closed = session(5);
        closed.active = false;
        assert_eq!(
            reconciler.apply(&at(base, 1, SourceKind::Push, Some(closed))),
            Outcome::Changed
        );
        assert_eq!(reconciler.current(), None);
    }

    #[test]
    fn converges_on_latest_successful_update() {
        let mut rng = StdRng::seed_from_u64(0x5E55_10);
        let sources = [SourceKind::Poll, SourceKind::Push, SourceKind::Cache];

        for _ in 0..200 {
            let base = Utc::now();
            let mut reconciler = Reconciler::new();
            let mut expected: Option<Session> = None;

            for step in 0..rng.gen_range(1..40) {
                let source = sources[rng.gen_range(0..sources.len())];
                let update = if rng.gen_bool(0.2) {
                    SourceUpdate {
                        source,
                        observed_at: base + Duration::milliseconds(step),
                        result: Err(SourceError::Remote("offline".into())),
                    }
                } else {
                    let value = match rng.gen_range(0..4) {
                        0 => None,
                        id => Some(session(id)),
                    };
                    expected = value.clone();
                    at(base, step, source, value)
                };
                reconciler.apply(&update);
                assert_eq!(reconciler.current(), expected.as_ref());
            }
        }
    }
}
