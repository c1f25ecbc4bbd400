//! Remote data source module.
//!
//! This module provides the `RemoteSource` contract the sync orchestrator
//! fetches through, and `ApiClient`, its implementation over the managed
//! database's REST interface.

pub mod client;
pub mod error;
pub mod remote;

pub use client::ApiClient;
pub use error::ApiError;
pub use remote::{OfflineSource, RemoteSource};
