use async_trait::async_trait;

use super::ApiError;
use crate::cache::Record;

/// Authoritative source of table data.
///
/// The orchestrator depends only on this contract; transport and
/// authentication belong to the implementation.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch every record of `table`.
    async fn fetch_table(&self, table: &str) -> Result<Vec<Record>, ApiError>;

    /// Whether a network path is believed to exist. When false the
    /// orchestrator serves from cache without attempting a fetch.
    fn is_online(&self) -> bool {
        true
    }
}

/// Source used when no remote endpoint is configured: cache-only operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineSource;

#[async_trait]
impl RemoteSource for OfflineSource {
    async fn fetch_table(&self, _table: &str) -> Result<Vec<Record>, ApiError> {
        Err(ApiError::Offline)
    }

    fn is_online(&self) -> bool {
        false
    }
}
