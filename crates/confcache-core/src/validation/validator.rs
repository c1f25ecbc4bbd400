use chrono::{DateTime, Duration, Utc};

use super::{Classification, SessionContext, Severity, ValidationOutcome};
use crate::cache::{CacheEntry, DecodeError};
use crate::config::SyncPolicy;

/// Point-in-time inputs for one validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationContext {
    pub now: DateTime<Utc>,
    pub session_active: bool,
}

impl ValidationContext {
    pub fn capture(ctx: &dyn SessionContext) -> Self {
        Self {
            now: ctx.now(),
            session_active: ctx.session_active(),
        }
    }
}

/// Classifies decoded entries as valid, stale, corrupted, clock-anomalous
/// or empty-when-active-session.
#[derive(Debug, Clone)]
pub struct ConsistencyValidator {
    policy: SyncPolicy,
}

impl ConsistencyValidator {
    pub fn new(policy: SyncPolicy) -> Self {
        Self { policy }
    }

    pub fn freshness_window(&self, key: &str) -> Duration {
        self.policy.freshness_window(key)
    }

    /// Rules are checked in priority order; the first match wins.
    ///
    /// 1. checksum mismatch: corrupted, critical
    /// 2. timestamp ahead of the clock beyond tolerance: clock-anomalous, warning
    /// 3. no active session: valid. Between sessions cached data is kept
    ///    regardless of age, empty or not.
    /// 4. active session, empty data, older than the window:
    ///    empty-when-active-session, warning
    /// 5. active session, older than the window: stale, info
    /// 6. otherwise valid
    pub fn validate(&self, entry: &CacheEntry, ctx: &ValidationContext) -> ValidationOutcome {
        let key = entry.key.as_str();
        let records = entry.record_count();

        if !entry.checksum_matches() {
            return ValidationOutcome::new(
                Classification::Corrupted,
                Severity::Critical,
                format!("{}: checksum mismatch over {} records", key, records),
            );
        }

        let age = entry.age_at(ctx.now);
        let tolerance = self.policy.clock_skew_tolerance();
        if -age > tolerance {
            return ValidationOutcome::new(
                Classification::ClockAnomalous,
                Severity::Warning,
                format!(
                    "{}: timestamp {}s ahead of device clock (tolerance {}s)",
                    key,
                    (-age).num_seconds(),
                    tolerance.num_seconds()
                ),
            );
        }

        if !ctx.session_active {
            let reason = if records == 0 {
                format!("{}: empty, no active session", key)
            } else {
                format!("{}: no active session, keeping {} records", key, records)
            };
            return ValidationOutcome::new(Classification::Valid, Severity::Info, reason);
        }

        let window = self.freshness_window(key);
        if age > window {
            if records == 0 {
                return ValidationOutcome::new(
                    Classification::EmptyWhenActiveSession,
                    Severity::Warning,
                    format!(
                        "{}: empty during active session, age {}s exceeds window {}s",
                        key,
                        age.num_seconds(),
                        window.num_seconds()
                    ),
                );
            }
            return ValidationOutcome::new(
                Classification::Stale,
                Severity::Info,
                format!(
                    "{}: age {}s exceeds window {}s ({} records)",
                    key,
                    age.num_seconds(),
                    window.num_seconds(),
                    records
                ),
            );
        }

        ValidationOutcome::new(
            Classification::Valid,
            Severity::Info,
            format!("{}: fresh, age {}s, {} records", key, age.num_seconds().max(0), records),
        )
    }

    /// Outcome for an entry that could not be decoded at all.
    pub fn malformed(key: &str, err: &DecodeError) -> ValidationOutcome {
        let detail = match err {
            DecodeError::Malformed(_) => "malformed entry".to_string(),
            DecodeError::KeyMismatch { found, .. } => format!("entry belongs to {}", found),
            DecodeError::UnsupportedVersion { found, expected } => {
                format!("entry version {} (expected {})", found, expected)
            }
        };
        ValidationOutcome::new(
            Classification::Corrupted,
            Severity::Critical,
            format!("{}: {}", key, detail),
        )
    }
}
