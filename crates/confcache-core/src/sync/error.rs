use thiserror::Error;

/// Longest error text carried into results and logs.
const MAX_REASON_LENGTH: usize = 200;

/// Failure of one table's sync. Cloneable so every caller attached to a
/// coalesced sync receives the same error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("{table}: {reason}")]
    RemoteFetch { table: String, reason: String },

    #[error("{table}: cache write failed: {reason}")]
    StoreWrite { table: String, reason: String },

    #[error("{table}: sync task aborted: {reason}")]
    TaskAborted { table: String, reason: String },
}

impl SyncError {
    pub fn table(&self) -> &str {
        match self {
            SyncError::RemoteFetch { table, .. }
            | SyncError::StoreWrite { table, .. }
            | SyncError::TaskAborted { table, .. } => table,
        }
    }

    pub(crate) fn remote(table: &str, err: &dyn std::fmt::Display) -> Self {
        SyncError::RemoteFetch {
            table: table.to_string(),
            reason: sanitize_reason(&err.to_string()),
        }
    }

    pub(crate) fn store(table: &str, err: &dyn std::fmt::Display) -> Self {
        SyncError::StoreWrite {
            table: table.to_string(),
            reason: sanitize_reason(&err.to_string()),
        }
    }
}

/// Why the read path produced no usable data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadFailure {
    /// The entry was discarded and the replacement fetch failed.
    #[error("{table}: cached entry discarded ({reason}) and re-fetch failed: {fetch}")]
    Corrupted {
        table: String,
        reason: String,
        fetch: SyncError,
    },

    /// Nothing cached and nothing fetched.
    #[error("{table}: no cached data and fetch failed: {fetch}")]
    Unavailable { table: String, fetch: SyncError },

    #[error("{table}: no cached data while offline")]
    Offline { table: String },
}

/// Single-line, length-bounded error text.
pub(crate) fn sanitize_reason(text: &str) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let flat = flat.trim();
    if flat.chars().count() <= MAX_REASON_LENGTH {
        flat.to_string()
    } else {
        let cut: String = flat.chars().take(MAX_REASON_LENGTH).collect();
        format!("{}...", cut)
    }
}
