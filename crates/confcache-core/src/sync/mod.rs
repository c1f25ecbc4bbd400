//! Sync orchestration between the remote source and the local cache.
//!
//! `SyncOrchestrator` owns the single-flight registry, the read path and
//! full syncs. `SyncResult` summarizes one full sync pass.

pub mod error;
pub mod orchestrator;
pub mod result;

pub use error::{ReadFailure, SyncError};
pub use orchestrator::{
    PendingSync, ReadSource, SyncContext, SyncOrchestrator, TableRead, TableStatus, TableSync,
};
pub use result::SyncResult;
