use std::sync::Arc;

use anyhow::Context;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use super::ServiceResult;
use crate::api::{ApiClient, OfflineSource, RemoteSource};
use crate::cache::{FileStore, Record};
use crate::config::Config;
use crate::health::{HealthMonitor, HealthSnapshot};
use crate::models::{sort_agenda, tables, AgendaItem, Attendee, ConferenceSession};
use crate::recovery::{RecoveryBoundary, Rendered};
use crate::sync::{SyncContext, SyncOrchestrator, SyncResult, TableStatus};
use crate::validation::LiveSessionContext;

/// Read APIs for the conference front end.
///
/// Reads go through the recovery boundary, so they never fail with a raw
/// error: callers get data, last known-good data, or an error envelope.
pub struct ConferenceService {
    boundary: RecoveryBoundary,
    sessions: Option<Arc<LiveSessionContext>>,
}

impl ConferenceService {
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        Self {
            boundary: RecoveryBoundary::new(orchestrator),
            sessions: None,
        }
    }

    /// Like `new`, keeping `sessions` in step with the `sessions` table.
    /// `sessions` should be the context the orchestrator validates with.
    pub fn with_live_sessions(
        orchestrator: SyncOrchestrator,
        sessions: Arc<LiveSessionContext>,
    ) -> Self {
        Self {
            boundary: RecoveryBoundary::new(orchestrator),
            sessions: Some(sessions),
        }
    }

    /// File-backed cache under the configured cache directory, fetching
    /// from the configured API or running cache-only when none is set.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let cache_dir = config.cache_dir()?;
        let store = FileStore::new(cache_dir.clone())
            .with_context(|| format!("Failed to open cache at {}", cache_dir.display()))?;

        let remote: Arc<dyn RemoteSource> = match config.api_base_url {
            Some(_) => Arc::new(ApiClient::from_config(config)?),
            None => {
                info!("No API URL configured, running cache-only");
                Arc::new(OfflineSource)
            }
        };

        let sessions = Arc::new(LiveSessionContext::new());
        let orchestrator = SyncOrchestrator::new(SyncContext {
            store: Arc::new(store),
            remote,
            session: sessions.clone(),
            health: Arc::new(HealthMonitor::new()),
            policy: config.policy.clone(),
            tables: config.tables.clone(),
        });

        Ok(Self::with_live_sessions(orchestrator, sessions))
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        self.boundary.orchestrator()
    }

    pub fn boundary(&self) -> &RecoveryBoundary {
        &self.boundary
    }

    pub async fn get_agenda_items(&self) -> ServiceResult<Vec<AgendaItem>> {
        self.read_typed::<AgendaItem>(tables::AGENDA_ITEMS)
            .await
            .map(|mut items| {
                sort_agenda(&mut items);
                items
            })
    }

    pub async fn get_active_agenda_items(&self) -> ServiceResult<Vec<AgendaItem>> {
        self.get_agenda_items()
            .await
            .map(|items| items.into_iter().filter(|item| item.is_active).collect())
    }

    pub async fn get_attendees(&self) -> ServiceResult<Vec<Attendee>> {
        self.read_typed::<Attendee>(tables::ATTENDEES)
            .await
            .map(|mut attendees| {
                attendees.sort_by(|a, b| {
                    a.last_name
                        .to_lowercase()
                        .cmp(&b.last_name.to_lowercase())
                        .then_with(|| a.first_name.to_lowercase().cmp(&b.first_name.to_lowercase()))
                });
                attendees
            })
    }

    pub async fn get_sessions(&self) -> ServiceResult<Vec<ConferenceSession>> {
        let result = self
            .read_typed::<ConferenceSession>(tables::SESSIONS)
            .await
            .map(|mut sessions| {
                sessions.sort_by_key(|s| s.start_time);
                sessions
            });
        if let (Some(live), Some(sessions)) = (&self.sessions, result.data()) {
            live.update_schedule(sessions);
        }
        result
    }

    /// Raw records of any configured table.
    pub async fn get_records(&self, table: &str) -> ServiceResult<Vec<Record>> {
        match self.boundary.read(table).await {
            Rendered::Empty { reason } => ServiceResult::err(reason),
            rendered => ServiceResult::ok(rendered.into_records()),
        }
    }

    /// Re-sync the agenda now, bypassing the cache.
    pub async fn refresh_agenda_items(&self) -> ServiceResult<Vec<AgendaItem>> {
        match self.orchestrator().sync_table(tables::AGENDA_ITEMS).await {
            Ok(sync) => {
                let mut items = decode_records::<AgendaItem>(tables::AGENDA_ITEMS, &sync.records);
                sort_agenda(&mut items);
                ServiceResult::ok(items)
            }
            Err(e) => ServiceResult::err(e.to_string()),
        }
    }

    pub async fn sync_all(&self) -> SyncResult {
        let result = self.orchestrator().sync_all_data().await;
        if let Some(live) = &self.sessions {
            if let Some(records) = self.orchestrator().last_known_good(tables::SESSIONS).await {
                live.update_schedule(&decode_records::<ConferenceSession>(tables::SESSIONS, &records));
            }
        }
        result
    }

    /// Remove every cached entry and any fallback data held for reads.
    pub async fn clear_cache(&self) -> ServiceResult<()> {
        let cleared = self.orchestrator().clear_cache().await;
        self.boundary.forget(None);
        cleared.into()
    }

    /// Cache state of every configured table.
    pub async fn status(&self) -> Vec<TableStatus> {
        let mut statuses = Vec::new();
        for table in self.orchestrator().tables() {
            statuses.push(self.orchestrator().inspect_table(table).await);
        }
        statuses
    }

    pub fn diagnostics(&self) -> HealthSnapshot {
        self.orchestrator().health().snapshot()
    }

    async fn read_typed<T: DeserializeOwned>(&self, table: &str) -> ServiceResult<Vec<T>> {
        self.get_records(table)
            .await
            .map(|records| decode_records(table, &records))
    }
}

/// Decode records into `T`, skipping those that do not match the model.
fn decode_records<T: DeserializeOwned>(table: &str, records: &[Record]) -> Vec<T> {
    let mut skipped = 0usize;
    let decoded: Vec<T> = records
        .iter()
        .filter_map(|record| match serde_json::from_value(record.clone()) {
            Ok(item) => Some(item),
            Err(_) => {
                skipped += 1;
                None
            }
        })
        .collect();
    if skipped > 0 {
        warn!(table = %table, skipped, "Skipped records not matching model");
    }
    decoded
}
