use chrono::{DateTime, Utc};

use super::{CacheEntry, DecodeError, Record};

/// Entry format generation written by this build.
pub const CODEC_VERSION: &str = "1";

/// Wraps payloads with metadata before they reach the store, and parses
/// them back out.
#[derive(Debug, Clone)]
pub struct EntryCodec {
    version: String,
}

impl Default for EntryCodec {
    fn default() -> Self {
        Self::new(CODEC_VERSION)
    }
}

impl EntryCodec {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Stamp the current time and checksum `data`.
    pub fn encode(&self, key: &str, data: Vec<Record>) -> CacheEntry {
        CacheEntry::new(key, data, &self.version)
    }

    pub fn encode_at(&self, key: &str, data: Vec<Record>, now: DateTime<Utc>) -> CacheEntry {
        CacheEntry::new_at(key, data, &self.version, now)
    }

    pub fn to_raw(&self, entry: &CacheEntry) -> Result<String, serde_json::Error> {
        serde_json::to_string(entry)
    }

    /// Parse raw bytes into an entry.
    ///
    /// Only the shape is checked here. The checksum is left for the
    /// validator so structural and content corruption stay distinguishable.
    pub fn decode(&self, raw: &str) -> Result<CacheEntry, DecodeError> {
        let entry: CacheEntry =
            serde_json::from_str(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        if entry.key.is_empty() {
            return Err(DecodeError::Malformed("empty key".to_string()));
        }
        if entry.version != self.version {
            return Err(DecodeError::UnsupportedVersion {
                expected: self.version.clone(),
                found: entry.version,
            });
        }
        Ok(entry)
    }

    /// Decode and check the entry belongs to `key`.
    pub fn decode_for(&self, key: &str, raw: &str) -> Result<CacheEntry, DecodeError> {
        let entry = self.decode(raw)?;
        if entry.key != key {
            return Err(DecodeError::KeyMismatch {
                expected: key.to_string(),
                found: entry.key,
            });
        }
        Ok(entry)
    }
}
