use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::sync::SyncResult;
use crate::validation::{Classification, Severity, ValidationOutcome};

/// Number of recent sync runs the rolling success rate covers.
const DEFAULT_ROLLING_WINDOW: usize = 20;

/// Per-table counters and the latest observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableHealth {
    pub validations: u64,
    pub syncs_ok: u64,
    pub syncs_failed: u64,
    pub retries: u64,
    pub fallbacks: u64,
    pub last_classification: Option<Classification>,
    pub last_severity: Option<Severity>,
    pub last_reason: Option<String>,
    pub last_sync_ok: Option<bool>,
    pub last_record_count: Option<usize>,
    pub last_latency_ms: Option<u64>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Read-only diagnostics view. Never contains record contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub started_at: DateTime<Utc>,
    pub classification_counts: BTreeMap<String, u64>,
    pub tables: BTreeMap<String, TableHealth>,
    pub sync_runs: u64,
    pub sync_failures: u64,
    /// Share of successful runs among the most recent ones; `None` before
    /// the first run.
    pub rolling_success_rate: Option<f64>,
    pub last_sync: Option<LastSync>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSync {
    pub at: DateTime<Utc>,
    pub success: bool,
    pub synced_tables: usize,
    pub error_count: usize,
    pub total_records: usize,
    pub latency_ms: u64,
}

#[derive(Debug)]
struct HealthState {
    started_at: DateTime<Utc>,
    classification_counts: BTreeMap<Classification, u64>,
    tables: BTreeMap<String, TableHealth>,
    recent_runs: VecDeque<bool>,
    sync_runs: u64,
    sync_failures: u64,
    last_sync: Option<LastSync>,
}

/// Observes validator, orchestrator and recovery outcomes.
///
/// Recording only updates counters and emits a log event; it never feeds
/// back into control flow.
#[derive(Debug)]
pub struct HealthMonitor {
    state: Mutex<HealthState>,
    window: usize,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn millis(latency: Duration) -> u64 {
    latency.as_millis().min(u64::MAX as u128) as u64
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_ROLLING_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            state: Mutex::new(HealthState {
                started_at: Utc::now(),
                classification_counts: BTreeMap::new(),
                tables: BTreeMap::new(),
                recent_runs: VecDeque::with_capacity(window.max(1)),
                sync_runs: 0,
                sync_failures: 0,
                last_sync: None,
            }),
            window: window.max(1),
        }
    }

    // A panic elsewhere must not take diagnostics down with it
    fn lock(&self) -> MutexGuard<'_, HealthState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn record_validation(&self, table: &str, outcome: &ValidationOutcome, latency: Duration) {
        let latency_ms = millis(latency);
        match outcome.severity {
            Severity::Info => debug!(
                table = %table,
                classification = %outcome.classification,
                latency_ms,
                reason = %outcome.reason,
                "Cache entry validated"
            ),
            Severity::Warning => warn!(
                table = %table,
                classification = %outcome.classification,
                latency_ms,
                reason = %outcome.reason,
                "Cache entry needs attention"
            ),
            Severity::Critical => error!(
                table = %table,
                classification = %outcome.classification,
                latency_ms,
                reason = %outcome.reason,
                "Cache entry rejected"
            ),
        }

        let mut state = self.lock();
        *state.classification_counts.entry(outcome.classification).or_insert(0) += 1;
        let t = state.tables.entry(table.to_string()).or_default();
        t.validations += 1;
        t.last_classification = Some(outcome.classification);
        t.last_severity = Some(outcome.severity);
        t.last_reason = Some(outcome.reason.clone());
        t.last_latency_ms = Some(latency_ms);
        t.last_updated = Some(Utc::now());
    }

    pub fn record_table_sync(&self, table: &str, ok: bool, records: usize, latency: Duration) {
        let latency_ms = millis(latency);
        if ok {
            debug!(table = %table, records, latency_ms, "Table sync succeeded");
        } else {
            warn!(table = %table, latency_ms, "Table sync failed");
        }

        let mut state = self.lock();
        let t = state.tables.entry(table.to_string()).or_default();
        if ok {
            t.syncs_ok += 1;
            t.last_record_count = Some(records);
        } else {
            t.syncs_failed += 1;
        }
        t.last_sync_ok = Some(ok);
        t.last_latency_ms = Some(latency_ms);
        t.last_updated = Some(Utc::now());
    }

    pub fn record_sync(&self, result: &SyncResult, latency: Duration) {
        let latency_ms = millis(latency);
        if result.success() {
            info!(
                synced = result.synced_tables().len(),
                records = result.total_records(),
                latency_ms,
                "Sync completed"
            );
        } else {
            warn!(
                synced = result.synced_tables().len(),
                errors = result.errors().len(),
                records = result.total_records(),
                latency_ms,
                "Sync completed with failures"
            );
        }

        let mut state = self.lock();
        state.sync_runs += 1;
        if !result.success() {
            state.sync_failures += 1;
        }
        if state.recent_runs.len() == self.window {
            state.recent_runs.pop_front();
        }
        state.recent_runs.push_back(result.success());
        state.last_sync = Some(LastSync {
            at: Utc::now(),
            success: result.success(),
            synced_tables: result.synced_tables().len(),
            error_count: result.errors().len(),
            total_records: result.total_records(),
            latency_ms,
        });
    }

    pub fn record_retry(&self, table: &str, attempt: u32) {
        warn!(table = %table, attempt, "Retrying read");
        self.lock().tables.entry(table.to_string()).or_default().retries += 1;
    }

    pub fn record_fallback(&self, table: &str, served_records: Option<usize>) {
        error!(table = %table, served_records = ?served_records, "Retry budget exhausted, serving fallback");
        self.lock().tables.entry(table.to_string()).or_default().fallbacks += 1;
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let state = self.lock();
        let rolling_success_rate = if state.recent_runs.is_empty() {
            None
        } else {
            let ok = state.recent_runs.iter().filter(|ok| **ok).count();
            Some(ok as f64 / state.recent_runs.len() as f64)
        };

        HealthSnapshot {
            started_at: state.started_at,
            // Every classification is listed, zero or not
            classification_counts: Classification::ALL
                .iter()
                .map(|c| {
                    let n = state.classification_counts.get(c).copied().unwrap_or(0);
                    (c.to_string(), n)
                })
                .collect(),
            tables: state.tables.clone(),
            sync_runs: state.sync_runs,
            sync_failures: state.sync_failures,
            rolling_success_rate,
            last_sync: state.last_sync.clone(),
        }
    }

    pub fn classification_count(&self, classification: Classification) -> u64 {
        self.lock()
            .classification_counts
            .get(&classification)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncError;

    fn outcome(c: Classification, s: Severity) -> ValidationOutcome {
        ValidationOutcome::new(c, s, "agenda_items: 3 records")
    }

    #[test]
    fn test_counts_per_classification_and_table() {
        let monitor = HealthMonitor::new();
        monitor.record_validation("agenda_items", &outcome(Classification::Valid, Severity::Info), Duration::from_millis(2));
        monitor.record_validation("agenda_items", &outcome(Classification::Stale, Severity::Info), Duration::from_millis(3));
        monitor.record_validation("attendees", &outcome(Classification::Corrupted, Severity::Critical), Duration::ZERO);

        assert_eq!(monitor.classification_count(Classification::Valid), 1);
        assert_eq!(monitor.classification_count(Classification::Corrupted), 1);
        assert_eq!(monitor.classification_count(Classification::ClockAnomalous), 0);

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.classification_counts.get("stale"), Some(&1));
        assert_eq!(snapshot.classification_counts.get("clock-anomalous"), Some(&0));
        assert_eq!(snapshot.classification_counts.len(), Classification::ALL.len());
        let agenda = &snapshot.tables["agenda_items"];
        assert_eq!(agenda.validations, 2);
        assert_eq!(agenda.last_classification, Some(Classification::Stale));
        assert_eq!(agenda.last_latency_ms, Some(3));
    }

    #[test]
    fn test_rolling_success_rate_window() {
        let monitor = HealthMonitor::with_window(2);
        assert_eq!(monitor.snapshot().rolling_success_rate, None);

        let failed = SyncResult::from_outcomes(vec![(
            "attendees".to_string(),
            Err(SyncError::RemoteFetch {
                table: "attendees".to_string(),
                reason: "timeout".to_string(),
            }),
        )]);
        let ok = SyncResult::from_outcomes(vec![("agenda_items".to_string(), Ok(4))]);

        monitor.record_sync(&failed, Duration::from_millis(10));
        monitor.record_sync(&ok, Duration::from_millis(10));
        assert_eq!(monitor.snapshot().rolling_success_rate, Some(0.5));

        monitor.record_sync(&ok, Duration::from_millis(10));
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.rolling_success_rate, Some(1.0));
        assert_eq!(snapshot.sync_runs, 3);
        assert_eq!(snapshot.sync_failures, 1);
        assert_eq!(snapshot.last_sync.unwrap().total_records, 4);
    }

    #[test]
    fn test_table_sync_retry_and_fallback_counters() {
        let monitor = HealthMonitor::new();
        monitor.record_table_sync("sessions", true, 12, Duration::from_millis(40));
        monitor.record_table_sync("sessions", false, 0, Duration::from_millis(5));
        monitor.record_retry("sessions", 1);
        monitor.record_fallback("sessions", Some(12));

        let t = &monitor.snapshot().tables["sessions"];
        assert_eq!((t.syncs_ok, t.syncs_failed, t.retries, t.fallbacks), (1, 1, 1, 1));
        assert_eq!(t.last_record_count, Some(12));
        assert_eq!(t.last_sync_ok, Some(false));
    }

    #[test]
    fn test_snapshot_serializes_without_payloads() {
        let monitor = HealthMonitor::new();
        monitor.record_validation("agenda_items", &outcome(Classification::Valid, Severity::Info), Duration::ZERO);
        let json = serde_json::to_string(&monitor.snapshot()).unwrap();
        assert!(json.contains("\"classificationCounts\":{\"valid\":1}"));
        assert!(json.contains("\"rollingSuccessRate\":null"));
    }
}
