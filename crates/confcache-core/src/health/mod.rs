//! Health monitoring and sanitized diagnostics.
//!
//! The `HealthMonitor` aggregates validation, sync and recovery outcomes
//! into process-lifetime counters and exposes them as a `HealthSnapshot`
//! for telemetry collectors.

pub mod monitor;

pub use monitor::{HealthMonitor, HealthSnapshot, LastSync, TableHealth};
