//! Device cache backed by a directory of JSON files, one per player.
//!
//! Files are named after the tag body (`QLR2.json` for `#QLR2`) and hold the
//! camelCase local shape. A file that is not valid JSON (or not even UTF-8) is
//! still listed, so the orchestrator reports it as malformed instead of
//! silently skipping it.

use async_trait::async_trait;
use roster_history::shape::to_local_shape;
use roster_history::store::{CachedRecord, LocalCache, Result, StoreError};
use roster_history::PlayerHistoryRecord;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

const EXTENSION: &str = "json";

/// JSON-file cache for the sync host
pub struct JsonDirCache {
    base_path: PathBuf,
}

impl JsonDirCache {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let stem = key.trim_start_matches('#');
        self.base_path.join(format!("{}.{}", stem, EXTENSION))
    }

    /// Write `record` into the cache in local shape.
    pub async fn write_record(&self, record: &PlayerHistoryRecord) -> Result<()> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;

        let contents = serde_json::to_string_pretty(&to_local_shape(record))
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fs::write(self.entry_path(record.tag.as_str()), contents)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }
}

#[async_trait]
impl LocalCache for JsonDirCache {
    async fn read_all(&self) -> Result<Vec<CachedRecord>> {
        let mut dir = match fs::read_dir(&self.base_path).await {
            Ok(dir) => dir,
            // Nothing cached yet
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!("Skipping cache file with non UTF-8 name: {:?}", path);
                continue;
            };

            let bytes = fs::read(&path)
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;
            // Unparseable contents are kept as a string so the entry fails as malformed
            let payload = serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

            entries.push(CachedRecord {
                key: key.to_string(),
                payload,
            });
        }

        // read_dir order is platform dependent
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }
}
