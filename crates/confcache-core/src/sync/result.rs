use serde::Serialize;

use super::SyncError;

/// Summary of one orchestrated sync pass. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    success: bool,
    synced_tables: Vec<String>,
    errors: Vec<String>,
    total_records: usize,
}

impl SyncResult {
    /// Build from per-table outcomes, keeping their order. `Ok` carries the
    /// number of records written for that table.
    pub fn from_outcomes(outcomes: Vec<(String, Result<usize, SyncError>)>) -> Self {
        let mut synced_tables = Vec::new();
        let mut errors = Vec::new();
        let mut total_records = 0;

        for (table, outcome) in outcomes {
            match outcome {
                Ok(records) => {
                    if !synced_tables.contains(&table) {
                        synced_tables.push(table);
                    }
                    total_records += records;
                }
                Err(e) => errors.push(e.to_string()),
            }
        }

        Self {
            success: errors.is_empty(),
            synced_tables,
            errors,
            total_records,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn synced_tables(&self) -> &[String] {
        &self.synced_tables
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn total_records(&self) -> usize {
        self.total_records
    }
}
