//! confcache - offline-first cache for conference data.
//!
//! Mirrors remote tables (agenda items, attendees, sessions) into a local
//! cache and serves them with integrity and freshness checks:
//!
//! - `cache`: key/value stores and the checksummed entry codec
//! - `validation`: classifies decoded entries before they are served
//! - `sync`: single-flight table syncs and the validated read path
//! - `health`: counters and sanitized diagnostics
//! - `recovery`: bounded retry and fallback for consumer reads
//! - `service`: typed consumer APIs returning `ServiceResult`

pub mod api;
pub mod cache;
pub mod config;
pub mod health;
pub mod models;
pub mod recovery;
pub mod service;
pub mod sync;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{Config, SyncPolicy};
pub use service::{ConferenceService, ServiceResult};
pub use sync::{SyncOrchestrator, SyncResult};
