use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::Record;
use crate::sync::{ReadFailure, SyncOrchestrator};

/// Backoff ceiling so a misconfigured base cannot stall a read for minutes.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryState {
    Normal,
    Retrying,
    Fallback,
}

/// What the consumer gets to render. Never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Data(Vec<Record>),
    /// Retries exhausted; the last data known to be intact, possibly old.
    LastKnownGood(Vec<Record>),
    /// Retries exhausted with nothing to fall back on.
    Empty { reason: String },
}

impl Rendered {
    pub fn records(&self) -> &[Record] {
        match self {
            Rendered::Data(records) | Rendered::LastKnownGood(records) => records,
            Rendered::Empty { .. } => &[],
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            Rendered::Data(records) | Rendered::LastKnownGood(records) => records,
            Rendered::Empty { .. } => Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        !matches!(self, Rendered::Data(_))
    }
}

/// Wraps the orchestrator's read path with a bounded retry-then-fallback
/// sequence per table key.
pub struct RecoveryBoundary {
    orchestrator: SyncOrchestrator,
    retry_budget: u32,
    base_backoff: Duration,
    states: Mutex<HashMap<String, RecoveryState>>,
    last_good: Mutex<HashMap<String, Vec<Record>>>,
}

impl RecoveryBoundary {
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        let policy = orchestrator.policy();
        let retry_budget = policy.retry_budget;
        let base_backoff = policy.retry_base_backoff();
        Self {
            orchestrator,
            retry_budget,
            base_backoff,
            states: Mutex::new(HashMap::new()),
            last_good: Mutex::new(HashMap::new()),
        }
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    pub fn state(&self, key: &str) -> RecoveryState {
        lock(&self.states)
            .get(key)
            .copied()
            .unwrap_or(RecoveryState::Normal)
    }

    /// Drop retained fallback data and recovery state for `key`, or for
    /// every key when `None`. Called after an explicit cache clear so cleared
    /// data is never served as a fallback.
    pub fn forget(&self, key: Option<&str>) {
        match key {
            Some(key) => {
                lock(&self.last_good).remove(key);
                lock(&self.states).remove(key);
            }
            None => {
                lock(&self.last_good).clear();
                lock(&self.states).clear();
            }
        }
    }

    /// Read `key`, retrying up to the budget on failure before degrading.
    pub async fn read(&self, key: &str) -> Rendered {
        let mut attempt: u32 = 0;
        let failure = loop {
            match self.orchestrator.read_table(key).await {
                Ok(read) => {
                    if attempt > 0 {
                        info!(table = %key, attempt, "Read recovered");
                    }
                    self.set_state(key, RecoveryState::Normal);
                    lock(&self.last_good).insert(key.to_string(), read.records.clone());
                    return Rendered::Data(read.records);
                }
                Err(failure) if attempt < self.retry_budget => {
                    attempt += 1;
                    debug!(table = %key, error = %failure, "Read failed");
                    self.set_state(key, RecoveryState::Retrying);
                    self.orchestrator.health().record_retry(key, attempt);
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
                Err(failure) => break failure,
            }
        };

        self.fall_back(key, failure).await
    }

    async fn fall_back(&self, key: &str, failure: ReadFailure) -> Rendered {
        self.set_state(key, RecoveryState::Fallback);
        warn!(table = %key, error = %failure, "Read retries exhausted");

        let stored = self.orchestrator.last_known_good(key).await;
        let fallback = stored.or_else(|| lock(&self.last_good).get(key).cloned());

        match fallback {
            Some(records) => {
                self.orchestrator
                    .health()
                    .record_fallback(key, Some(records.len()));
                Rendered::LastKnownGood(records)
            }
            None => {
                self.orchestrator.health().record_fallback(key, None);
                Rendered::Empty {
                    reason: failure.to_string(),
                }
            }
        }
    }

    /// Exponential backoff for the given retry (1-based) plus up to 50% jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .min(MAX_BACKOFF);
        let jitter_cap = exp.as_millis() as u64 / 2;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        exp + Duration::from_millis(jitter)
    }

    fn set_state(&self, key: &str, state: RecoveryState) {
        let previous = lock(&self.states).insert(key.to_string(), state);
        if previous.unwrap_or(RecoveryState::Normal) != state {
            debug!(table = %key, from = ?previous, to = ?state, "Recovery state changed");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, EntryCodec};
    use crate::config::SyncPolicy;
    use crate::test_support::{records, Harness, ScriptedRemote};
    use crate::validation::SessionContext;

    const AGENDA: &str = "agenda_items";

    fn boundary(remote: ScriptedRemote) -> (Harness, RecoveryBoundary) {
        let policy = SyncPolicy::default().with_retry_budget(3, 1);
        let h = Harness::new(&[AGENDA], remote, policy);
        let boundary = RecoveryBoundary::new(h.orchestrator.clone());
        (h, boundary)
    }

    async fn corrupt(h: &Harness) {
        let codec = EntryCodec::default();
        let mut entry = codec.encode_at(AGENDA, records("old", 1), h.session.now());
        entry.checksum = "0".repeat(64);
        h.store.set(AGENDA, codec.to_raw(&entry).unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_successful_read_stays_normal() {
        let remote = ScriptedRemote::new();
        remote.set_table(AGENDA, records("a", 2));
        let (h, boundary) = boundary(remote);

        let rendered = boundary.read(AGENDA).await;
        assert_eq!(rendered, Rendered::Data(records("a", 2)));
        assert!(!rendered.is_degraded());
        assert_eq!(boundary.state(AGENDA), RecoveryState::Normal);
        assert_eq!(h.remote.calls(AGENDA), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_render_last_known_good() {
        let remote = ScriptedRemote::new();
        remote.set_table(AGENDA, records("good", 3));
        let (h, boundary) = boundary(remote);

        assert_eq!(boundary.read(AGENDA).await.records().len(), 3);

        corrupt(&h).await;
        h.remote.fail_table(AGENDA, "connection reset");

        let rendered = boundary.read(AGENDA).await;
        assert_eq!(rendered, Rendered::LastKnownGood(records("good", 3)));
        assert_eq!(boundary.state(AGENDA), RecoveryState::Fallback);
        // Initial fetch, then the first attempt plus three retries
        assert_eq!(h.remote.calls(AGENDA), 5);

        let health = h.health.snapshot();
        assert_eq!(health.tables[AGENDA].retries, 3);
        assert_eq!(health.tables[AGENDA].fallbacks, 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_without_history_render_empty() {
        let remote = ScriptedRemote::new();
        remote.fail_table(AGENDA, "503");
        let (_h, boundary) = boundary(remote);

        let rendered = boundary.read(AGENDA).await;
        match &rendered {
            Rendered::Empty { reason } => assert!(reason.contains("503")),
            other => panic!("expected empty state, got {:?}", other),
        }
        assert!(rendered.records().is_empty());
        assert_eq!(boundary.state(AGENDA), RecoveryState::Fallback);
    }

    #[tokio::test]
    async fn test_recovers_after_fallback() {
        let remote = ScriptedRemote::new();
        remote.fail_table(AGENDA, "503");
        let (h, boundary) = boundary(remote);

        assert!(boundary.read(AGENDA).await.is_degraded());
        h.remote.set_table(AGENDA, records("a", 1));
        assert_eq!(boundary.read(AGENDA).await, Rendered::Data(records("a", 1)));
        assert_eq!(boundary.state(AGENDA), RecoveryState::Normal);
    }

    #[tokio::test]
    async fn test_forget_drops_retained_fallback() {
        let remote = ScriptedRemote::new();
        remote.set_table(AGENDA, records("good", 2));
        let (h, boundary) = boundary(remote);

        assert!(!boundary.read(AGENDA).await.is_degraded());
        h.orchestrator.clear_cache().await.unwrap();
        boundary.forget(None);
        h.remote.fail_table(AGENDA, "503");

        let rendered = boundary.read(AGENDA).await;
        assert!(matches!(rendered, Rendered::Empty { .. }));
        assert!(rendered.records().is_empty());
    }

    #[tokio::test]
    async fn test_forget_single_key_resets_state() {
        let remote = ScriptedRemote::new();
        remote.fail_table(AGENDA, "503");
        let (_h, boundary) = boundary(remote);

        boundary.read(AGENDA).await;
        assert_eq!(boundary.state(AGENDA), RecoveryState::Fallback);
        boundary.forget(Some(AGENDA));
        assert_eq!(boundary.state(AGENDA), RecoveryState::Normal);
    }

    #[tokio::test]
    async fn test_zero_budget_falls_back_immediately() {
        let remote = ScriptedRemote::new();
        remote.set_online(false);
        let policy = SyncPolicy::default().with_retry_budget(0, 1);
        let h = Harness::new(&[AGENDA], remote, policy);
        let boundary = RecoveryBoundary::new(h.orchestrator.clone());

        assert!(matches!(boundary.read(AGENDA).await, Rendered::Empty { .. }));
        assert_eq!(h.health.snapshot().tables[AGENDA].retries, 0);
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let policy = SyncPolicy::default().with_retry_budget(3, 100);
        let h = Harness::new(&[AGENDA], ScriptedRemote::new(), policy);
        let boundary = RecoveryBoundary::new(h.orchestrator.clone());

        let first = boundary.backoff(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));
        let third = boundary.backoff(3);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(600));
        assert!(boundary.backoff(30) <= MAX_BACKOFF + MAX_BACKOFF / 2);
    }
}
