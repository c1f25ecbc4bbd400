use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Structural corruption of a stored entry.
///
/// Content corruption (a checksum that no longer matches `data`) is not a
/// decode failure; the entry decodes fine and the validator flags it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed cache entry: {0}")]
    Malformed(String),

    #[error("Cache entry key mismatch: expected {expected}, found {found}")]
    KeyMismatch { expected: String, found: String },

    #[error("Unsupported cache entry version {found} (codec writes {expected})")]
    UnsupportedVersion { expected: String, found: String },
}
