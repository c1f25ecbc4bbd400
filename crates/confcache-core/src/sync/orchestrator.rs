//! Sync orchestration: pulls authoritative tables into the cache and serves
//! validated cache reads.
//!
//! At most one sync per table key is outstanding at any time. A caller that
//! asks for a table already being synced attaches to the pending result
//! instead of issuing a second remote fetch. Pending syncs run as their own
//! Tokio tasks and are never cancelled by callers going away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::{ReadFailure, SyncError, SyncResult};
use crate::api::{ApiError, RemoteSource};
use crate::cache::{CacheEntry, CacheStore, EntryCodec, Record, StoreError};
use crate::config::SyncPolicy;
use crate::health::HealthMonitor;
use crate::validation::{
    Classification, ConsistencyValidator, SessionContext, ValidationContext, ValidationOutcome,
};

/// Everything the orchestrator needs, constructed explicitly by the caller.
pub struct SyncContext {
    pub store: Arc<dyn CacheStore>,
    pub remote: Arc<dyn RemoteSource>,
    pub session: Arc<dyn SessionContext>,
    pub health: Arc<HealthMonitor>,
    pub policy: SyncPolicy,
    pub tables: Vec<String>,
}

/// Data produced by one table sync, shared by every attached caller.
#[derive(Debug, Clone)]
pub struct TableSync {
    pub records: Arc<Vec<Record>>,
    /// False when the fetched payload matched the stored entry and the
    /// store was left untouched.
    pub written: bool,
}

pub type PendingSync = Shared<BoxFuture<'static, Result<TableSync, SyncError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadSource {
    Cache,
    Remote,
    /// A refresh was preferred but failed; the cached value was served.
    CacheAfterFailedRefresh,
}

/// A usable read. Records are a fresh copy owned by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRead {
    pub records: Vec<Record>,
    pub outcome: Option<ValidationOutcome>,
    pub source: ReadSource,
}

impl TableRead {
    fn cached(records: Vec<Record>, outcome: ValidationOutcome) -> Self {
        Self {
            records,
            outcome: Some(outcome),
            source: ReadSource::Cache,
        }
    }

    fn remote(sync: &TableSync, outcome: Option<ValidationOutcome>) -> Self {
        Self {
            records: sync.records.as_ref().clone(),
            outcome,
            source: ReadSource::Remote,
        }
    }
}

/// Cache state of one table for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStatus {
    pub table: String,
    pub present: bool,
    pub records: Option<usize>,
    pub cached_at: Option<DateTime<Utc>>,
    pub age: Option<String>,
    pub outcome: Option<ValidationOutcome>,
}

struct Inner {
    store: Arc<dyn CacheStore>,
    remote: Arc<dyn RemoteSource>,
    session: Arc<dyn SessionContext>,
    health: Arc<HealthMonitor>,
    codec: EntryCodec,
    validator: ConsistencyValidator,
    policy: SyncPolicy,
    tables: Vec<String>,
    in_flight: Mutex<HashMap<String, PendingSync>>,
}

/// Clears the in-flight marker when the sync task finishes or unwinds.
struct InFlightGuard {
    inner: Arc<Inner>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.lock_in_flight().remove(&self.key);
    }
}

impl Inner {
    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<String, PendingSync>> {
        self.in_flight.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Fetch one table and persist it. A failed fetch leaves the previous
    /// entry untouched.
    async fn fetch_and_store(&self, key: &str) -> Result<TableSync, SyncError> {
        let started = Instant::now();

        if !self.remote.is_online() {
            self.health.record_table_sync(key, false, 0, started.elapsed());
            return Err(SyncError::remote(key, &ApiError::Offline));
        }

        let records = match self.remote.fetch_table(key).await {
            Ok(records) => records,
            Err(e) => {
                warn!(table = %key, error = %e, "Remote fetch failed, keeping cached entry");
                self.health.record_table_sync(key, false, 0, started.elapsed());
                return Err(SyncError::remote(key, &e));
            }
        };

        let now = self.session.now();
        let fresh = self.codec.encode_at(key, records, now);

        let written = if self.is_unchanged(key, &fresh, now).await {
            debug!(table = %key, "Fetched payload unchanged, keeping stored entry");
            false
        } else {
            if let Err(e) = self.persist(key, &fresh).await {
                warn!(table = %key, error = %e, "Failed to write cache entry");
                self.health.record_table_sync(key, false, 0, started.elapsed());
                return Err(SyncError::store(key, &e));
            }
            true
        };

        let count = fresh.record_count();
        self.health
            .record_table_sync(key, true, count, started.elapsed());
        Ok(TableSync {
            records: Arc::new(fresh.data),
            written,
        })
    }

    async fn persist(&self, key: &str, entry: &CacheEntry) -> Result<(), StoreError> {
        let raw = self.codec.to_raw(entry)?;
        self.store.set(key, raw).await
    }

    /// The stored entry is intact, fresh and carries the same payload.
    async fn is_unchanged(&self, key: &str, fresh: &CacheEntry, now: DateTime<Utc>) -> bool {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            _ => return false,
        };
        let existing = match self.codec.decode_for(key, &raw) {
            Ok(entry) => entry,
            Err(_) => return false,
        };
        let age = existing.age_at(now);
        existing.checksum == fresh.checksum
            && existing.checksum_matches()
            && age >= Duration::zero()
            && age <= self.validator.freshness_window(key)
    }
}

/// Mirrors remote tables into the cache and serves validated reads.
///
/// Cheap to clone; clones share the in-flight registry. Must be used from
/// within a Tokio runtime.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    pub fn new(ctx: SyncContext) -> Self {
        let mut tables: Vec<String> = Vec::with_capacity(ctx.tables.len());
        for table in ctx.tables {
            if !tables.contains(&table) {
                tables.push(table);
            }
        }

        Self {
            inner: Arc::new(Inner {
                store: ctx.store,
                remote: ctx.remote,
                session: ctx.session,
                health: ctx.health,
                codec: EntryCodec::new(ctx.policy.schema_version.clone()),
                validator: ConsistencyValidator::new(ctx.policy.clone()),
                policy: ctx.policy,
                tables,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn tables(&self) -> &[String] {
        &self.inner.tables
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.inner.policy
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.inner.health
    }

    pub fn is_online(&self) -> bool {
        self.inner.remote.is_online()
    }

    /// Sync every configured table. Tables succeed or fail independently.
    pub async fn sync_all_data(&self) -> SyncResult {
        let started = Instant::now();
        info!(tables = self.inner.tables.len(), "Starting sync of all tables");

        let pending = self.inner.tables.iter().map(|table| async move {
            let outcome = self
                .sync_table(table)
                .await
                .map(|sync| sync.records.len());
            (table.clone(), outcome)
        });
        let outcomes = join_all(pending).await;

        let result = SyncResult::from_outcomes(outcomes);
        self.inner.health.record_sync(&result, started.elapsed());
        result
    }

    /// Sync one table, joining the outstanding sync for `key` if any.
    pub async fn sync_table(&self, key: &str) -> Result<TableSync, SyncError> {
        self.start_sync(key).await
    }

    /// Register (or join) the sync for `key` without waiting for it.
    pub fn start_sync(&self, key: &str) -> PendingSync {
        let mut in_flight = self.inner.lock_in_flight();
        if let Some(pending) = in_flight.get(key) {
            debug!(table = %key, "Joining in-flight sync");
            return pending.clone();
        }

        let inner = Arc::clone(&self.inner);
        let owned = key.to_string();
        let handle = tokio::spawn(async move {
            let _guard = InFlightGuard {
                inner: Arc::clone(&inner),
                key: owned.clone(),
            };
            inner.fetch_and_store(&owned).await
        });

        let table = key.to_string();
        let pending = handle
            .map(move |joined| {
                joined.unwrap_or_else(|e| {
                    error!(table = %table, error = %e, "Sync task did not complete");
                    Err(SyncError::TaskAborted {
                        table,
                        reason: e.to_string(),
                    })
                })
            })
            .boxed()
            .shared();

        in_flight.insert(key.to_string(), pending.clone());
        pending
    }

    /// Number of syncs currently outstanding.
    pub fn in_flight_count(&self) -> usize {
        self.inner.lock_in_flight().len()
    }

    /// Cached records for `key`; empty when nothing usable can be produced.
    pub async fn get_cached_table_data(&self, key: &str) -> Vec<Record> {
        match self.read_table(key).await {
            Ok(read) => read.records,
            Err(failure) => {
                warn!(table = %key, error = %failure, "No usable data, returning empty");
                Vec::new()
            }
        }
    }

    /// Validated read with the detail the recovery boundary needs.
    pub async fn read_table(&self, key: &str) -> Result<TableRead, ReadFailure> {
        let started = Instant::now();
        let ctx = ValidationContext::capture(self.inner.session.as_ref());

        let raw = match self.inner.store.get(key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(table = %key, error = %e, "Cache read failed");
                None
            }
        };
        let Some(raw) = raw else {
            debug!(table = %key, "Cache miss");
            return self.fetch_for_read(key, None).await;
        };

        let entry = match self.inner.codec.decode_for(key, &raw) {
            Ok(entry) => entry,
            Err(e) => {
                let outcome = ConsistencyValidator::malformed(key, &e);
                self.inner.health.record_validation(key, &outcome, started.elapsed());
                self.discard(key).await;
                return self.fetch_for_read(key, Some(outcome)).await;
            }
        };

        let outcome = self.inner.validator.validate(&entry, &ctx);
        self.inner.health.record_validation(key, &outcome, started.elapsed());

        match outcome.classification {
            Classification::Valid => Ok(TableRead::cached(entry.data, outcome)),
            Classification::Stale => {
                if self.is_online() {
                    // Stale while revalidate
                    drop(self.start_sync(key));
                    debug!(table = %key, "Background refresh scheduled");
                }
                Ok(TableRead::cached(entry.data, outcome))
            }
            Classification::Corrupted => {
                self.discard(key).await;
                self.fetch_for_read(key, Some(outcome)).await
            }
            Classification::ClockAnomalous | Classification::EmptyWhenActiveSession => {
                if !self.is_online() {
                    warn!(table = %key, reason = %outcome.reason, "Offline, serving cached entry");
                    return Ok(TableRead::cached(entry.data, outcome));
                }
                match self.sync_table(key).await {
                    Ok(sync) => Ok(TableRead::remote(&sync, Some(outcome))),
                    Err(e) => {
                        warn!(table = %key, error = %e, "Refresh failed, serving cached entry");
                        Ok(TableRead {
                            records: entry.data,
                            outcome: Some(outcome),
                            source: ReadSource::CacheAfterFailedRefresh,
                        })
                    }
                }
            }
        }
    }

    /// One synchronous fetch for a read that has nothing usable cached.
    async fn fetch_for_read(
        &self,
        key: &str,
        discarded: Option<ValidationOutcome>,
    ) -> Result<TableRead, ReadFailure> {
        if !self.is_online() {
            return Err(match discarded {
                Some(outcome) => ReadFailure::Corrupted {
                    table: key.to_string(),
                    reason: outcome.reason,
                    fetch: SyncError::remote(key, &ApiError::Offline),
                },
                None => ReadFailure::Offline {
                    table: key.to_string(),
                },
            });
        }

        match self.sync_table(key).await {
            Ok(sync) => Ok(TableRead::remote(&sync, discarded)),
            Err(fetch) => Err(match discarded {
                Some(outcome) => ReadFailure::Corrupted {
                    table: key.to_string(),
                    reason: outcome.reason,
                    fetch,
                },
                None => ReadFailure::Unavailable {
                    table: key.to_string(),
                    fetch,
                },
            }),
        }
    }

    async fn discard(&self, key: &str) {
        match self.inner.store.remove(key).await {
            Ok(()) => warn!(table = %key, "Discarded unusable cache entry"),
            Err(e) => error!(table = %key, error = %e, "Failed to discard cache entry"),
        }
    }

    /// Intact cached records regardless of age or clock state, without
    /// triggering any fetch.
    pub async fn last_known_good(&self, key: &str) -> Option<Vec<Record>> {
        let raw = self.inner.store.get(key).await.ok().flatten()?;
        let entry = self.inner.codec.decode_for(key, &raw).ok()?;
        entry.checksum_matches().then_some(entry.data)
    }

    /// Describe the cached state of `key` without fetching or recording.
    pub async fn inspect_table(&self, key: &str) -> TableStatus {
        let mut status = TableStatus {
            table: key.to_string(),
            present: false,
            records: None,
            cached_at: None,
            age: None,
            outcome: None,
        };

        let raw = match self.inner.store.get(key).await {
            Ok(Some(raw)) => raw,
            _ => return status,
        };
        status.present = true;

        match self.inner.codec.decode_for(key, &raw) {
            Ok(entry) => {
                let ctx = ValidationContext::capture(self.inner.session.as_ref());
                status.records = Some(entry.record_count());
                status.cached_at = Some(entry.timestamp);
                status.age = Some(crate::cache::entry::age_display(
                    entry.age_at(ctx.now).num_minutes(),
                ));
                status.outcome = Some(self.inner.validator.validate(&entry, &ctx));
            }
            Err(e) => status.outcome = Some(ConsistencyValidator::malformed(key, &e)),
        }
        status
    }

    /// Remove every cache entry. May race an in-flight sync; whichever
    /// write lands last wins.
    pub async fn clear_cache(&self) -> Result<(), StoreError> {
        self.inner.store.clear().await?;
        info!("Cache cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::test_support::{records, seed, Harness, ScriptedRemote};
    use serde_json::json;

    const AGENDA: &str = "agenda_items";
    const ATTENDEES: &str = "attendees";

    fn harness(remote: ScriptedRemote) -> Harness {
        Harness::new(&[AGENDA, ATTENDEES], remote, SyncPolicy::default())
    }

    fn codec() -> EntryCodec {
        EntryCodec::default()
    }

    #[tokio::test]
    async fn test_sync_all_writes_every_table() {
        let remote = ScriptedRemote::new();
        remote.set_table(AGENDA, records("a", 3));
        remote.set_table(ATTENDEES, records("u", 2));
        let h = harness(remote);

        let result = h.orchestrator.sync_all_data().await;
        assert!(result.success());
        assert_eq!(result.synced_tables(), [AGENDA, ATTENDEES]);
        assert_eq!(result.total_records(), 5);

        let stored = codec().decode(&h.raw(AGENDA).await.unwrap()).unwrap();
        assert_eq!(stored.data, records("a", 3));
        assert!(stored.checksum_matches());
        assert_eq!(h.health.snapshot().sync_runs, 1);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_previous_entry() {
        let remote = ScriptedRemote::new();
        remote.set_table(AGENDA, records("a", 4));
        remote.fail_table(ATTENDEES, "upstream timeout");
        let h = harness(remote);

        let old_at = h.session.now() - Duration::hours(3);
        seed(&h.store, ATTENDEES, records("old", 2), old_at).await;
        let before = h.raw(ATTENDEES).await;

        let result = h.orchestrator.sync_all_data().await;
        assert!(!result.success());
        assert_eq!(result.synced_tables(), [AGENDA]);
        assert_eq!(result.errors().len(), 1);
        assert!(result.errors()[0].starts_with("attendees: "));
        assert!(result.errors()[0].contains("upstream timeout"));
        assert_eq!(result.total_records(), 4);

        assert_eq!(h.raw(ATTENDEES).await, before);
        let agenda = codec().decode(&h.raw(AGENDA).await.unwrap()).unwrap();
        assert_eq!(agenda.data, records("a", 4));
    }

    #[tokio::test]
    async fn test_sync_twice_is_idempotent() {
        let remote = ScriptedRemote::new();
        remote.set_table(AGENDA, records("a", 3));
        remote.set_table(ATTENDEES, records("u", 1));
        let h = harness(remote);

        let first = h.orchestrator.sync_all_data().await;
        let after_first = (h.raw(AGENDA).await, h.raw(ATTENDEES).await);

        let second = h.orchestrator.sync_all_data().await;
        let after_second = (h.raw(AGENDA).await, h.raw(ATTENDEES).await);

        assert_eq!(first.synced_tables(), second.synced_tables());
        assert_eq!(first.total_records(), second.total_records());
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn test_changed_payload_is_rewritten() {
        let remote = ScriptedRemote::new();
        remote.set_table(AGENDA, records("a", 1));
        let h = Harness::new(&[AGENDA], remote, SyncPolicy::default());

        assert!(h.orchestrator.sync_table(AGENDA).await.unwrap().written);
        h.remote.set_table(AGENDA, records("a", 2));
        let sync = h.orchestrator.sync_table(AGENDA).await.unwrap();
        assert!(sync.written);
        assert_eq!(sync.records.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_reads_share_one_fetch() {
        let remote = ScriptedRemote::gated();
        remote.set_table(AGENDA, records("a", 2));
        let h = harness(remote);

        let release = async {
            tokio::task::yield_now().await;
            h.remote.release();
        };
        let (a, b, _) = tokio::join!(
            h.orchestrator.get_cached_table_data(AGENDA),
            h.orchestrator.get_cached_table_data(AGENDA),
            release
        );

        assert_eq!(h.remote.calls(AGENDA), 1);
        assert_eq!(a, records("a", 2));
        assert_eq!(b, records("a", 2));
    }

    #[tokio::test]
    async fn test_reads_join_sync_already_in_flight() {
        let remote = ScriptedRemote::gated();
        remote.set_table(AGENDA, records("a", 2));
        let h = harness(remote);

        let pending = h.orchestrator.start_sync(AGENDA);
        assert_eq!(h.orchestrator.in_flight_count(), 1);

        let release = async {
            tokio::task::yield_now().await;
            h.remote.release();
        };
        let (sync, a, b, _) = tokio::join!(
            pending,
            h.orchestrator.get_cached_table_data(AGENDA),
            h.orchestrator.get_cached_table_data(AGENDA),
            release
        );

        assert!(sync.is_ok());
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        assert_eq!(h.remote.calls(AGENDA), 1);
        assert_eq!(h.orchestrator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_entry_served_then_refreshed_in_background() {
        let remote = ScriptedRemote::new();
        remote.set_table(AGENDA, records("new", 5));
        let h = harness(remote);
        h.session.set_active(true);

        let cached = records("old", 2);
        seed(&h.store, AGENDA, cached.clone(), h.session.now() - Duration::hours(1)).await;

        let read = h.orchestrator.read_table(AGENDA).await.unwrap();
        assert_eq!(read.records, cached);
        assert_eq!(read.source, ReadSource::Cache);
        assert_eq!(read.outcome.unwrap().classification, Classification::Stale);

        // The refresh is already registered; joining it must not fetch again
        let sync = h.orchestrator.sync_table(AGENDA).await.unwrap();
        assert_eq!(sync.records.len(), 5);
        assert_eq!(h.remote.calls(AGENDA), 1);

        let stored = codec().decode(&h.raw(AGENDA).await.unwrap()).unwrap();
        assert_eq!(stored.data, records("new", 5));
    }

    #[tokio::test]
    async fn test_corrupted_entry_replaced_by_fresh_fetch() {
        let remote = ScriptedRemote::new();
        remote.set_table(AGENDA, records("fresh", 3));
        let h = harness(remote);

        let mut entry = codec().encode_at(AGENDA, records("old", 2), h.session.now());
        entry.checksum = "f".repeat(64);
        h.store.set(AGENDA, codec().to_raw(&entry).unwrap()).await.unwrap();

        let data = h.orchestrator.get_cached_table_data(AGENDA).await;
        assert_eq!(data, records("fresh", 3));

        let stored = codec().decode(&h.raw(AGENDA).await.unwrap()).unwrap();
        assert!(stored.checksum_matches());
        assert_eq!(stored.data, records("fresh", 3));
        assert_eq!(h.health.classification_count(Classification::Corrupted), 1);
    }

    #[tokio::test]
    async fn test_corrupted_entry_and_failed_fetch_yields_empty() {
        let remote = ScriptedRemote::new();
        remote.fail_table(AGENDA, "503");
        let h = harness(remote);

        let mut entry = codec().encode_at(AGENDA, records("old", 2), h.session.now());
        entry.data.push(json!({"id": "injected"}));
        h.store.set(AGENDA, codec().to_raw(&entry).unwrap()).await.unwrap();

        let failure = h.orchestrator.read_table(AGENDA).await.unwrap_err();
        assert!(matches!(failure, ReadFailure::Corrupted { .. }));
        assert!(h.raw(AGENDA).await.is_none());
        assert!(h.orchestrator.get_cached_table_data(AGENDA).await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_entry_is_discarded_and_refetched() {
        let remote = ScriptedRemote::new();
        remote.set_table(ATTENDEES, records("u", 1));
        let h = harness(remote);
        h.store.set(ATTENDEES, "{not json".to_string()).await.unwrap();

        let read = h.orchestrator.read_table(ATTENDEES).await.unwrap();
        assert_eq!(read.source, ReadSource::Remote);
        assert_eq!(read.outcome.unwrap().classification, Classification::Corrupted);
        assert!(codec().decode(&h.raw(ATTENDEES).await.unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_no_session_serves_cache_without_fetch() {
        let remote = ScriptedRemote::new();
        remote.set_table(AGENDA, records("remote", 9));
        let h = harness(remote);
        h.session.set_active(false);

        let cached = records("cached", 4);
        seed(&h.store, AGENDA, cached.clone(), h.session.now() - Duration::minutes(5)).await;

        assert_eq!(h.orchestrator.get_cached_table_data(AGENDA).await, cached);
        tokio::task::yield_now().await;
        assert_eq!(h.remote.calls(AGENDA), 0);
        assert_eq!(h.orchestrator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_no_session_keeps_days_old_cache() {
        let h = harness(ScriptedRemote::new());
        let cached = records("cached", 2);
        seed(&h.store, AGENDA, cached.clone(), h.session.now() - Duration::days(10)).await;

        let read = h.orchestrator.read_table(AGENDA).await.unwrap();
        assert_eq!(read.records, cached);
        assert_eq!(read.outcome.unwrap().classification, Classification::Valid);
        assert_eq!(h.remote.calls(AGENDA), 0);
    }

    #[tokio::test]
    async fn test_clock_anomaly_prefers_remote() {
        let remote = ScriptedRemote::new();
        remote.set_table(AGENDA, records("remote", 2));
        let h = harness(remote);
        seed(&h.store, AGENDA, records("future", 1), h.session.now() + Duration::hours(2)).await;

        let read = h.orchestrator.read_table(AGENDA).await.unwrap();
        assert_eq!(read.source, ReadSource::Remote);
        assert_eq!(read.records, records("remote", 2));

        let stored = codec().decode(&h.raw(AGENDA).await.unwrap()).unwrap();
        assert_eq!(stored.timestamp, h.session.now());
    }

    #[tokio::test]
    async fn test_clock_anomaly_offline_serves_cache() {
        let remote = ScriptedRemote::new();
        remote.set_online(false);
        let h = harness(remote);
        seed(&h.store, AGENDA, records("future", 1), h.session.now() + Duration::hours(2)).await;

        let read = h.orchestrator.read_table(AGENDA).await.unwrap();
        assert_eq!(read.source, ReadSource::Cache);
        assert_eq!(read.records, records("future", 1));
        assert_eq!(h.remote.calls(AGENDA), 0);
    }

    #[tokio::test]
    async fn test_clock_anomaly_with_failed_fetch_serves_cache() {
        let remote = ScriptedRemote::new();
        remote.fail_table(AGENDA, "timeout");
        let h = harness(remote);
        seed(&h.store, AGENDA, records("future", 1), h.session.now() + Duration::hours(2)).await;

        let read = h.orchestrator.read_table(AGENDA).await.unwrap();
        assert_eq!(read.source, ReadSource::CacheAfterFailedRefresh);
        assert_eq!(read.records, records("future", 1));
    }

    #[tokio::test]
    async fn test_cold_cache_fetches_synchronously() {
        let remote = ScriptedRemote::new();
        remote.set_table(ATTENDEES, records("u", 3));
        let h = harness(remote);

        assert_eq!(h.orchestrator.get_cached_table_data(ATTENDEES).await.len(), 3);
        assert!(h.store.has(ATTENDEES).await.unwrap());
    }

    #[tokio::test]
    async fn test_cold_cache_offline_is_empty() {
        let remote = ScriptedRemote::new();
        remote.set_online(false);
        let h = harness(remote);

        assert!(matches!(
            h.orchestrator.read_table(ATTENDEES).await,
            Err(ReadFailure::Offline { .. })
        ));
        assert!(h.orchestrator.get_cached_table_data(ATTENDEES).await.is_empty());
    }

    #[tokio::test]
    async fn test_offline_sync_reports_errors_without_fetching() {
        let remote = ScriptedRemote::new();
        remote.set_online(false);
        let h = harness(remote);

        let result = h.orchestrator.sync_all_data().await;
        assert!(!result.success());
        assert_eq!(result.errors().len(), 2);
        assert_eq!(h.remote.calls(AGENDA), 0);
    }

    #[tokio::test]
    async fn test_empty_table_during_session_refetches_once_stale() {
        let remote = ScriptedRemote::new();
        remote.set_table(AGENDA, records("a", 2));
        let h = harness(remote);
        h.session.set_active(true);
        seed(&h.store, AGENDA, vec![], h.session.now() - Duration::hours(2)).await;

        let read = h.orchestrator.read_table(AGENDA).await.unwrap();
        assert_eq!(read.source, ReadSource::Remote);
        assert_eq!(read.records.len(), 2);
    }

    #[tokio::test]
    async fn test_recent_empty_table_is_not_refetched() {
        let h = harness(ScriptedRemote::new());
        h.session.set_active(true);
        seed(&h.store, AGENDA, vec![], h.session.now()).await;

        assert!(h.orchestrator.get_cached_table_data(AGENDA).await.is_empty());
        assert!(h.orchestrator.get_cached_table_data(AGENDA).await.is_empty());
        assert_eq!(h.remote.calls(AGENDA), 0);
    }

    #[tokio::test]
    async fn test_reads_return_independent_copies() {
        let h = harness(ScriptedRemote::new());
        seed(&h.store, AGENDA, records("a", 1), h.session.now()).await;

        let mut first = h.orchestrator.get_cached_table_data(AGENDA).await;
        first[0] = json!({"id": "mutated"});
        let second = h.orchestrator.get_cached_table_data(AGENDA).await;
        assert_eq!(second, records("a", 1));
    }

    #[tokio::test]
    async fn test_clear_cache_and_last_known_good() {
        let remote = ScriptedRemote::new();
        remote.set_table(AGENDA, records("a", 2));
        let h = harness(remote);
        h.orchestrator.sync_table(AGENDA).await.unwrap();

        assert_eq!(h.orchestrator.last_known_good(AGENDA).await, Some(records("a", 2)));
        h.orchestrator.clear_cache().await.unwrap();
        assert_eq!(h.orchestrator.last_known_good(AGENDA).await, None);
    }

    #[tokio::test]
    async fn test_sync_after_clear_writes_fresh_entry() {
        let remote = ScriptedRemote::gated();
        remote.set_table(AGENDA, records("a", 2));
        let h = harness(remote);

        let pending = h.orchestrator.start_sync(AGENDA);
        h.orchestrator.clear_cache().await.unwrap();
        h.remote.release();
        assert!(pending.await.unwrap().written);
        assert!(h.store.has(AGENDA).await.unwrap());
    }

    #[tokio::test]
    async fn test_inspect_table() {
        let h = harness(ScriptedRemote::new());
        seed(&h.store, AGENDA, records("a", 3), h.session.now() - Duration::minutes(5)).await;
        h.store.set(ATTENDEES, "garbage".to_string()).await.unwrap();

        let agenda = h.orchestrator.inspect_table(AGENDA).await;
        assert!(agenda.present);
        assert_eq!(agenda.records, Some(3));
        assert_eq!(agenda.age.as_deref(), Some("5m ago"));
        assert_eq!(agenda.outcome.unwrap().classification, Classification::Valid);

        let attendees = h.orchestrator.inspect_table(ATTENDEES).await;
        assert!(attendees.present);
        assert_eq!(attendees.outcome.unwrap().classification, Classification::Corrupted);

        let sessions = h.orchestrator.inspect_table("sessions").await;
        assert!(!sessions.present);
        assert_eq!(h.health.snapshot().tables.len(), 0);
    }

    #[test]
    fn test_duplicate_tables_are_collapsed() {
        let h = Harness::new(&[AGENDA, AGENDA, ATTENDEES], ScriptedRemote::new(), SyncPolicy::default());
        assert_eq!(h.orchestrator.tables(), [AGENDA, ATTENDEES]);
    }
}
