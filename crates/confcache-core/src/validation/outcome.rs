use std::fmt;

use serde::{Deserialize, Serialize};

/// What the validator concluded about a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    Valid,
    Stale,
    Corrupted,
    ClockAnomalous,
    EmptyWhenActiveSession,
}

impl Classification {
    pub const ALL: [Classification; 5] = [
        Classification::Valid,
        Classification::Stale,
        Classification::Corrupted,
        Classification::ClockAnomalous,
        Classification::EmptyWhenActiveSession,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Valid => "valid",
            Classification::Stale => "stale",
            Classification::Corrupted => "corrupted",
            Classification::ClockAnomalous => "clock-anomalous",
            Classification::EmptyWhenActiveSession => "empty-when-active-session",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered from least to most serious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Result of validating one entry. `reason` only ever carries structural
/// facts (key, record count, time deltas), never record contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub classification: Classification,
    pub severity: Severity,
    pub reason: String,
}

impl ValidationOutcome {
    pub fn new(classification: Classification, severity: Severity, reason: impl Into<String>) -> Self {
        Self {
            classification,
            severity,
            reason: reason.into(),
        }
    }
}
