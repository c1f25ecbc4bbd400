//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::Semaphore;

use crate::api::{ApiError, RemoteSource};
use crate::cache::{CacheStore, EntryCodec, MemoryStore, Record};
use crate::config::SyncPolicy;
use crate::health::HealthMonitor;
use crate::sync::{SyncContext, SyncOrchestrator};
use crate::validation::ManualSessionContext;

/// Remote whose per-table responses are set by the test.
pub struct ScriptedRemote {
    responses: Mutex<HashMap<String, Result<Vec<Record>, String>>>,
    calls: Mutex<HashMap<String, usize>>,
    online: AtomicBool,
    gate: Option<Semaphore>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            gate: None,
        }
    }

    /// Fetches block until `release` is called.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1024);
        }
    }

    pub fn set_table(&self, table: &str, records: Vec<Record>) {
        self.responses.lock().unwrap().insert(table.to_string(), Ok(records));
    }

    pub fn fail_table(&self, table: &str, reason: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(table.to_string(), Err(reason.to_string()));
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn calls(&self, table: &str) -> usize {
        self.calls.lock().unwrap().get(table).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RemoteSource for ScriptedRemote {
    async fn fetch_table(&self, table: &str) -> Result<Vec<Record>, ApiError> {
        *self.calls.lock().unwrap().entry(table.to_string()).or_insert(0) += 1;
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        let response = self.responses.lock().unwrap().get(table).cloned();
        match response {
            Some(Ok(records)) => Ok(records),
            Some(Err(reason)) => Err(ApiError::ServerError(reason)),
            None => Err(ApiError::NotFound(table.to_string())),
        }
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

pub fn records(prefix: &str, n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| json!({"id": format!("{}{}", prefix, i), "title": format!("Item {}", i)}))
        .collect()
}

/// Write an entry straight into the store with the given timestamp.
pub async fn seed(store: &MemoryStore, table: &str, data: Vec<Record>, at: DateTime<Utc>) {
    let codec = EntryCodec::default();
    let raw = codec.to_raw(&codec.encode_at(table, data, at)).unwrap();
    store.set(table, raw).await.unwrap();
}

pub struct Harness {
    pub orchestrator: SyncOrchestrator,
    pub store: Arc<MemoryStore>,
    pub remote: Arc<ScriptedRemote>,
    pub session: Arc<ManualSessionContext>,
    pub health: Arc<HealthMonitor>,
}

impl Harness {
    pub fn new(tables: &[&str], remote: ScriptedRemote, policy: SyncPolicy) -> Self {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(remote);
        let session = Arc::new(ManualSessionContext::new(Utc::now(), false));
        let health = Arc::new(HealthMonitor::new());
        let orchestrator = SyncOrchestrator::new(SyncContext {
            store: store.clone(),
            remote: remote.clone(),
            session: session.clone(),
            health: health.clone(),
            policy,
            tables: tables.iter().map(|t| t.to_string()).collect(),
        });
        Self {
            orchestrator,
            store,
            remote,
            session,
            health,
        }
    }

    pub async fn raw(&self, table: &str) -> Option<String> {
        self.store.get(table).await.unwrap()
    }
}
