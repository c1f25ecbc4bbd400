//! Application configuration management.
//!
//! This module handles loading and saving the engine configuration: the
//! remote endpoint, the tables to mirror, offline mode and the sync policy
//! constants (freshness windows, clock-skew tolerance, retry budget).
//!
//! Configuration is stored at `~/.config/confcache/config.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::CODEC_VERSION;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "confcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Tables mirrored when the config does not list any.
pub const DEFAULT_TABLES: [&str; 3] = ["agenda_items", "attendees", "sessions"];

/// Env var overriding `api_base_url`
pub const ENV_API_URL: &str = "CONFCACHE_API_URL";
/// Env var overriding `api_key`
pub const ENV_API_KEY: &str = "CONFCACHE_API_KEY";
/// Env var overriding `offline_mode` ("1"/"true"/"yes")
pub const ENV_OFFLINE: &str = "CONFCACHE_OFFLINE";
/// Env var overriding the cache directory
pub const ENV_CACHE_DIR: &str = "CONFCACHE_CACHE_DIR";

/// Agenda data goes stale after 30 minutes during a live session.
const DEFAULT_FRESHNESS_WINDOW_MS: u64 = 30 * 60 * 1000;

/// Future timestamps within 5 minutes are treated as ordinary clock drift.
const DEFAULT_CLOCK_SKEW_TOLERANCE_MS: u64 = 5 * 60 * 1000;

const DEFAULT_RETRY_BUDGET: u32 = 3;

const DEFAULT_RETRY_BASE_BACKOFF_MS: u64 = 250;

/// Policy constants for validation, sync and recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncPolicy {
    /// Per-table staleness thresholds, keyed by table.
    pub freshness_window_ms: BTreeMap<String, u64>,
    /// Threshold for tables missing from `freshness_window_ms`.
    pub default_freshness_window_ms: u64,
    /// Max acceptable future-timestamp drift.
    pub clock_skew_tolerance_ms: u64,
    /// Max Recovery Boundary attempts.
    pub retry_budget: u32,
    /// First retry delay; doubles on every attempt.
    pub retry_base_backoff_ms: u64,
    /// Cache entry format generation.
    pub schema_version: String,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            freshness_window_ms: BTreeMap::new(),
            default_freshness_window_ms: DEFAULT_FRESHNESS_WINDOW_MS,
            clock_skew_tolerance_ms: DEFAULT_CLOCK_SKEW_TOLERANCE_MS,
            retry_budget: DEFAULT_RETRY_BUDGET,
            retry_base_backoff_ms: DEFAULT_RETRY_BASE_BACKOFF_MS,
            schema_version: CODEC_VERSION.to_string(),
        }
    }
}

impl SyncPolicy {
    pub fn freshness_window(&self, table: &str) -> chrono::Duration {
        let ms = self
            .freshness_window_ms
            .get(table)
            .copied()
            .unwrap_or(self.default_freshness_window_ms);
        chrono::Duration::milliseconds(ms.min(i64::MAX as u64) as i64)
    }

    pub fn clock_skew_tolerance(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.clock_skew_tolerance_ms.min(i64::MAX as u64) as i64)
    }

    pub fn retry_base_backoff(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_base_backoff_ms)
    }

    pub fn with_freshness_window(mut self, table: &str, ms: u64) -> Self {
        self.freshness_window_ms.insert(table.to_string(), ms);
        self
    }

    pub fn with_clock_skew_tolerance(mut self, ms: u64) -> Self {
        self.clock_skew_tolerance_ms = ms;
        self
    }

    pub fn with_retry_budget(mut self, budget: u32, base_backoff_ms: u64) -> Self {
        self.retry_budget = budget;
        self.retry_base_backoff_ms = base_backoff_ms;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub api_key: Option<String>,
    pub offline_mode: bool,
    /// Cache location; the platform cache directory when unset.
    #[serde(rename = "cacheDir", skip_serializing_if = "Option::is_none")]
    pub cache_dir_override: Option<PathBuf>,
    pub tables: Vec<String>,
    pub policy: SyncPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            api_key: None,
            offline_mode: false,
            cache_dir_override: None,
            tables: DEFAULT_TABLES.iter().map(|t| t.to_string()).collect(),
            policy: SyncPolicy::default(),
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `CONFCACHE_*` overrides from `lookup` (normally the process env).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|s| !s.is_empty()) {
            self.api_base_url = Some(url);
        }
        if let Some(key) = lookup(ENV_API_KEY).filter(|s| !s.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|s| !s.is_empty()) {
            self.cache_dir_override = Some(PathBuf::from(dir));
        }
        if let Some(flag) = lookup(ENV_OFFLINE) {
            self.offline_mode = matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir_override {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
