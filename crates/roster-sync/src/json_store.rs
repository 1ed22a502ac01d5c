//! Remote store backed by a single JSON file.
//!
//! Rows are grouped by clan, then by player tag:
//! `{ "#CLAN": { "#TAG": { ...snake_case row... } } }`.
//! Writes go to a temporary file first and are renamed into place.

use async_trait::async_trait;
use chrono::Utc;
use roster_history::store::{RemoteStore, Result, StoreError};
use roster_history::{PlayerTag, RemoteShape};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

type Rows = BTreeMap<String, BTreeMap<String, RemoteShape>>;

/// JSON-file remote store for the sync host
pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Rows> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Rows::new()),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        serde_json::from_str(&contents).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    async fn save(&self, rows: &Rows) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let contents = serde_json::to_string_pretty(rows)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }
}

#[async_trait]
impl RemoteStore for JsonFileStore {
    async fn read_by_key(&self, clan_key: &str, tag: &PlayerTag) -> Result<Option<RemoteShape>> {
        let rows = self.load().await?;
        Ok(rows
            .get(clan_key)
            .and_then(|clan| clan.get(&tag.to_string()))
            .cloned())
    }

    async fn upsert(&self, mut record: RemoteShape) -> Result<RemoteShape> {
        let clan_key = record
            .clan_tag
            .clone()
            .ok_or_else(|| StoreError::Rejected(format!("{} has no clan_tag", record.tag)))?;

        let _guard = self.write_lock.lock().await;
        let mut rows = self.load().await?;
        record.updated_at = Some(Utc::now());
        rows.entry(clan_key)
            .or_default()
            .insert(record.tag.to_string(), record.clone());
        self.save(&rows).await?;
        Ok(record)
    }
}
