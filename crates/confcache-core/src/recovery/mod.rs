//! Consumer-facing recovery: bounded retries, then a degraded render.

pub mod boundary;

pub use boundary::{RecoveryBoundary, RecoveryState, Rendered};
