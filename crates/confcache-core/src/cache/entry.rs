use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A single domain record as delivered by the remote source.
pub type Record = serde_json::Value;

/// A versioned, checksummed, timestamped snapshot of one logical table.
///
/// Entries are replaced wholesale on every successful sync and are never
/// mutated in place once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub data: Vec<Record>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub checksum: String,
}

impl CacheEntry {
    /// Build an entry stamped with the current time.
    pub fn new(key: &str, data: Vec<Record>, version: &str) -> Self {
        Self::new_at(key, data, version, Utc::now())
    }

    pub fn new_at(key: &str, data: Vec<Record>, version: &str, timestamp: DateTime<Utc>) -> Self {
        let checksum = checksum(&data);
        Self {
            key: key.to_string(),
            data,
            timestamp,
            version: version.to_string(),
            checksum,
        }
    }

    /// True when the stored checksum still matches the payload.
    pub fn checksum_matches(&self) -> bool {
        checksum(&self.data) == self.checksum
    }

    pub fn record_count(&self) -> usize {
        self.data.len()
    }

    /// Age relative to `now`. Negative when the timestamp is in the future.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    pub fn age_minutes(&self) -> i64 {
        self.age_at(Utc::now()).num_minutes()
    }

    pub fn age_display(&self) -> String {
        age_display(self.age_minutes())
    }
}

/// Deterministic SHA-256 over the canonical JSON encoding of `data`.
///
/// `serde_json::Value` objects keep their keys sorted, so two payloads that
/// compare equal always hash equal.
pub fn checksum(data: &[Record]) -> String {
    let mut hasher = Sha256::new();
    match serde_json::to_vec(data) {
        Ok(bytes) => hasher.update(&bytes),
        // Serializing a Value tree cannot fail; hash the debug form just in case
        Err(_) => hasher.update(format!("{:?}", data).as_bytes()),
    }
    hex::encode(hasher.finalize())
}

/// Human-readable age used by status displays.
pub fn age_display(minutes: i64) -> String {
    if minutes < 1 {
        // Covers clock skew too
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        let remaining_mins = minutes % 60;
        if remaining_mins >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        let remaining_hours = (minutes % 1440) / 60;
        if remaining_hours >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}
