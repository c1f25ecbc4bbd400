use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::store::validate_key;
use super::{CacheStore, StoreError};

/// File extension for persisted entries
const ENTRY_EXTENSION: &str = "json";

/// File extension for in-progress writes
const TMP_EXTENSION: &str = "tmp";

/// Temp files untouched for this long are leftovers of interrupted writes.
const ORPHAN_TMP_AGE: Duration = Duration::from_secs(10 * 60);

/// Stores each entry as `<key>.json` inside a cache directory.
///
/// Writes land in a uniquely named temp file which is then renamed over the
/// target, so a concurrent reader sees either the old file or the new one.
pub struct FileStore {
    cache_dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileStore {
    /// Open (creating if needed) the cache directory and sweep temp files
    /// left behind by interrupted writes.
    pub fn new(cache_dir: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&cache_dir)?;
        let swept = sweep_orphaned_tmp(&cache_dir, ORPHAN_TMP_AGE)?;
        if swept > 0 {
            debug!(swept, "Removed orphaned temp files");
        }
        Ok(Self {
            cache_dir,
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.{}", key, ENTRY_EXTENSION))
    }

    fn tmp_path(&self, key: &str) -> PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        self.cache_dir
            .join(format!(".{}.{}.{}.{}", key, std::process::id(), n, TMP_EXTENSION))
    }
}

fn is_tmp_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'));
    hidden && path.extension().and_then(|e| e.to_str()) == Some(TMP_EXTENSION)
}

/// Remove temp files older than `min_age`. Younger ones may belong to a
/// write still in progress in another process.
fn sweep_orphaned_tmp(dir: &Path, min_age: Duration) -> Result<usize, StoreError> {
    let now = SystemTime::now();
    let mut removed = 0;
    for item in std::fs::read_dir(dir)? {
        let path = item?.path();
        if !is_tmp_file(&path) {
            continue;
        }
        let age = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age >= min_age) {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temp file"),
            }
        }
    }
    Ok(removed)
}

#[async_trait]
impl CacheStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        match tokio::fs::read_to_string(self.cache_path(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, raw: String) -> Result<(), StoreError> {
        validate_key(key)?;
        let tmp = self.tmp_path(key);
        tokio::fs::write(&tmp, raw.as_bytes()).await?;
        if let Err(e) = tokio::fs::rename(&tmp, self.cache_path(key)).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(cache = key, bytes = raw.len(), "Cache entry written");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        match tokio::fs::remove_file(self.cache_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut dir = match tokio::fs::read_dir(&self.cache_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0usize;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(removed, "Cache directory cleared");
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        Ok(tokio::fs::try_exists(self.cache_path(key)).await?)
    }
}
