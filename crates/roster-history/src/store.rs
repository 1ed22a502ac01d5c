//! Collaborator traits for the device cache and the remote record store.
//!
//! Implementations:
//! - `InMemoryCache` / `InMemoryRemote` - For testing and embedding
//! - `JsonDirCache` / `JsonFileStore` (in roster-sync) - JSON files via tokio::fs

use crate::record::PlayerHistoryRecord;
use crate::shape::{to_local_shape, RemoteShape};
use crate::tag::PlayerTag;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Write rejected: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// One entry of the device cache, still in its stored (unvalidated) form.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRecord {
    /// Key the cache stores the entry under (normally the player tag).
    pub key: String,
    /// Local-shape JSON payload.
    pub payload: Value,
}

/// Device-side cache of history records awaiting sync.
#[async_trait]
pub trait LocalCache: Send + Sync {
    /// Read every cached entry.
    async fn read_all(&self) -> Result<Vec<CachedRecord>>;

    /// Remove the entry stored under `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Shared store holding the durable copy of every history record.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch a record. `Ok(None)` means the store has never seen this player.
    async fn read_by_key(&self, clan_key: &str, tag: &PlayerTag) -> Result<Option<RemoteShape>>;

    /// Insert or replace a record, returning the persisted form.
    async fn upsert(&self, record: RemoteShape) -> Result<RemoteShape>;
}

/// In-memory cache for testing
pub struct InMemoryCache {
    entries: RwLock<BTreeMap<String, Value>>,
    unavailable: RwLock<bool>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            unavailable: RwLock::new(false),
        }
    }

    /// Store a raw payload under `key`
    pub fn insert(&self, key: impl Into<String>, payload: Value) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), payload);
    }

    /// Store a record in local shape, keyed by its tag
    pub fn insert_record(&self, record: &PlayerHistoryRecord) -> Result<()> {
        let payload = serde_json::to_value(to_local_shape(record))
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.insert(record.tag.to_string(), payload);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every call fail, as if device storage were locked
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().unwrap_or_else(|e| e.into_inner()) = unavailable;
    }

    fn check_available(&self) -> Result<()> {
        if *self.unavailable.read().unwrap_or_else(|e| e.into_inner()) {
            return Err(StoreError::Unavailable("local cache".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalCache for InMemoryCache {
    async fn read_all(&self) -> Result<Vec<CachedRecord>> {
        self.check_available()?;
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .iter()
            .map(|(key, payload)| CachedRecord {
                key: key.clone(),
                payload: payload.clone(),
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

/// In-memory remote store for testing
pub struct InMemoryRemote {
    rows: RwLock<HashMap<(String, PlayerTag), RemoteShape>>,
    /// Tags whose reads fail
    failing_reads: RwLock<HashSet<PlayerTag>>,
    /// Tags whose upserts fail
    failing_upserts: RwLock<HashSet<PlayerTag>>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            failing_reads: RwLock::new(HashSet::new()),
            failing_upserts: RwLock::new(HashSet::new()),
        }
    }

    /// Seed a row directly, bypassing failure injection
    pub fn insert(&self, clan_key: &str, row: RemoteShape) {
        self.rows
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((clan_key.to_string(), row.tag.clone()), row);
    }

    pub fn get(&self, clan_key: &str, tag: &PlayerTag) -> Option<RemoteShape> {
        self.rows
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(clan_key.to_string(), tag.clone()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make reads of `tag` fail with `Unavailable`
    pub fn fail_reads_for(&self, tag: PlayerTag) {
        self.failing_reads
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tag);
    }

    /// Make upserts of `tag` fail with `Unavailable`
    pub fn fail_upserts_for(&self, tag: PlayerTag) {
        self.failing_upserts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tag);
    }

    fn is_failing(set: &RwLock<HashSet<PlayerTag>>, tag: &PlayerTag) -> bool {
        set.read().unwrap_or_else(|e| e.into_inner()).contains(tag)
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn read_by_key(&self, clan_key: &str, tag: &PlayerTag) -> Result<Option<RemoteShape>> {
        if Self::is_failing(&self.failing_reads, tag) {
            return Err(StoreError::Unavailable(format!("read of {}", tag)));
        }
        Ok(self.get(clan_key, tag))
    }

    async fn upsert(&self, mut record: RemoteShape) -> Result<RemoteShape> {
        if Self::is_failing(&self.failing_upserts, &record.tag) {
            return Err(StoreError::Unavailable(format!("upsert of {}", record.tag)));
        }
        let clan_key = record
            .clan_tag
            .clone()
            .ok_or_else(|| StoreError::Rejected(format!("{} has no clan_tag", record.tag)))?;

        record.updated_at = Some(Utc::now());
        self.insert(&clan_key, record.clone());
        Ok(record)
    }
}

// Implement the collaborator traits for Arc<T>
// This lets tests keep a handle on the stores they hand to an orchestrator
#[async_trait]
impl<T: LocalCache> LocalCache for std::sync::Arc<T> {
    async fn read_all(&self) -> Result<Vec<CachedRecord>> {
        (**self).read_all().await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }
}

#[async_trait]
impl<T: RemoteStore> RemoteStore for std::sync::Arc<T> {
    async fn read_by_key(&self, clan_key: &str, tag: &PlayerTag) -> Result<Option<RemoteShape>> {
        (**self).read_by_key(clan_key, tag).await
    }

    async fn upsert(&self, record: RemoteShape) -> Result<RemoteShape> {
        (**self).upsert(record).await
    }
}
