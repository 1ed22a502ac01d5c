//! SyncOrchestrator: Folds cached records into the remote store.
//!
//! For every cached entry, one at a time:
//!
//! 1. Deserialize the local shape and normalize it
//! 2. Fetch the remote copy (absent just means "not synced yet")
//! 3. Merge the two
//! 4. Upsert the merged record remotely
//! 5. Only once the upsert succeeded, delete the cache entry
//!
//! A failure at any step is confined to that entry: it is reported, its cache
//! entry stays put, and the run moves on. Re-running is always safe since
//! merging is idempotent.

use crate::events::{EventBus, SyncEvent};
use crate::merge::{merge_remote_row, MergeError};
use crate::record::PlayerHistoryRecord;
use crate::shape::{from_local_shape, to_remote_shape, LocalShape};
use crate::store::{CachedRecord, LocalCache, RemoteStore, StoreError};
use crate::tag::PlayerTag;

use serde::{Serialize, Serializer};
use std::fmt::Display;
use thiserror::Error;
use tracing::{debug, info, warn};
use web_time::Instant;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Malformed cache entry {key}: {reason}")]
    Malformed { key: String, reason: String },

    #[error("Cache key {key} holds the record for {tag}")]
    KeyMismatch { key: String, tag: PlayerTag },

    #[error("No cached record for {0}")]
    NotCached(PlayerTag),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// A cache entry that could not be synced.
#[derive(Debug, Serialize)]
pub struct SyncFailure {
    /// Cache key of the entry, normally the player tag.
    pub tag: String,
    #[serde(serialize_with = "serialize_display")]
    pub error: SyncError,
}

/// Outcome of one `sync_all` run.
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub succeeded: Vec<PlayerTag>,
    pub failed: Vec<SyncFailure>,
    pub elapsed_ms: u64,
}

impl SyncReport {
    /// True when every cached record made it to the remote store.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of cache entries this run looked at.
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

fn serialize_display<T: Display, S: Serializer>(
    value: &T,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(value)
}

/// Drives reconciliation between a device cache and the remote store.
///
/// Callers must not run two orchestrators against the same clan at once:
/// an upsert from one could race a cache delete from the other.
pub struct SyncOrchestrator<L: LocalCache, R: RemoteStore> {
    local: L,
    remote: R,
    events: EventBus,
}

impl<L: LocalCache, R: RemoteStore> SyncOrchestrator<L, R> {
    pub fn new(local: L, remote: R) -> Self {
        Self {
            local,
            remote,
            events: EventBus::new(),
        }
    }

    /// Publish progress events to the listeners registered on `bus`.
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = bus;
        self
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Sync every cached record for `clan_key`.
    ///
    /// Only a failure to list the cache aborts the run; per-record failures
    /// land in the report.
    pub async fn sync_all(&self, clan_key: &str) -> Result<SyncReport> {
        let started = Instant::now();
        let entries = self.local.read_all().await?;
        debug!("Syncing {} cached record(s) for clan {}", entries.len(), clan_key);

        let mut report = SyncReport::default();
        for entry in entries {
            let key = entry.key.clone();
            match self.sync_entry(clan_key, entry).await {
                Ok((tag, had_remote)) => {
                    debug!("Synced {} (remote copy existed: {})", tag, had_remote);
                    self.emit(SyncEvent::RecordSynced {
                        tag: tag.clone(),
                        had_remote,
                    });
                    report.succeeded.push(tag);
                }
                Err(e) => {
                    warn!("Failed to sync {}: {}", key, e);
                    self.emit(SyncEvent::RecordFailed {
                        key: key.clone(),
                        error: e.to_string(),
                    });
                    report.failed.push(SyncFailure { tag: key, error: e });
                }
            }
        }

        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            "Sync for clan {} finished: {} succeeded, {} failed",
            clan_key,
            report.succeeded.len(),
            report.failed.len()
        );
        self.emit(SyncEvent::SyncFinished {
            succeeded: report.succeeded.len(),
            failed: report.failed.len(),
            elapsed_ms: report.elapsed_ms,
        });
        Ok(report)
    }

    /// Merge the cached record for `tag` with its remote copy without writing
    /// anything.
    pub async fn preview(&self, clan_key: &str, tag: &PlayerTag) -> Result<PlayerHistoryRecord> {
        for entry in self.local.read_all().await? {
            let Ok(local) = normalize_entry(&entry) else {
                continue;
            };
            if &local.tag == tag {
                return self.merge_with_remote(clan_key, &local).await.map(|(merged, _)| merged);
            }
        }
        Err(SyncError::NotCached(tag.clone()))
    }

    async fn sync_entry(&self, clan_key: &str, entry: CachedRecord) -> Result<(PlayerTag, bool)> {
        let local = normalize_entry(&entry)?;
        let (merged, had_remote) = self.merge_with_remote(clan_key, &local).await?;

        self.remote.upsert(to_remote_shape(&merged, clan_key)).await?;
        // The merged record is durable now; clearing the cache entry is safe
        self.local.delete(&entry.key).await?;

        Ok((merged.tag, had_remote))
    }

    async fn merge_with_remote(
        &self,
        clan_key: &str,
        local: &PlayerHistoryRecord,
    ) -> Result<(PlayerHistoryRecord, bool)> {
        let row = self.remote.read_by_key(clan_key, &local.tag).await?;
        let had_remote = row.is_some();
        let merged = merge_remote_row(local, row)?;
        Ok((merged, had_remote))
    }

    fn emit(&self, event: SyncEvent) {
        self.events.emit(&event);
    }
}

/// Deserialize and normalize a cache entry, checking it sits under its own tag.
fn normalize_entry(entry: &CachedRecord) -> Result<PlayerHistoryRecord> {
    let shape: LocalShape =
        serde_json::from_value(entry.payload.clone()).map_err(|e| SyncError::Malformed {
            key: entry.key.clone(),
            reason: e.to_string(),
        })?;

    match entry.key.parse::<PlayerTag>() {
        Ok(key_tag) if key_tag == shape.tag => Ok(from_local_shape(shape)),
        _ => Err(SyncError::KeyMismatch {
            key: entry.key.clone(),
            tag: shape.tag,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{record_departure, DepartureDetails};
    use crate::record::{Alias, MemberStatus};
    use crate::shape::{from_remote_shape, to_remote_shape, RemoteShape};
    use crate::store::{InMemoryCache, InMemoryRemote};
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    const CLAN: &str = "#2PR8R8V8P";

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap()
    }

    fn tag(s: &str) -> PlayerTag {
        s.parse().unwrap()
    }

    fn player(s: &str, name: &str) -> PlayerHistoryRecord {
        PlayerHistoryRecord::joined(tag(s), name, t(1))
    }

    fn orchestrator() -> SyncOrchestrator<Arc<InMemoryCache>, Arc<InMemoryRemote>> {
        SyncOrchestrator::new(Arc::new(InMemoryCache::new()), Arc::new(InMemoryRemote::new()))
    }

    #[tokio::test]
    async fn test_sync_with_one_failing_record() {
        let sync = orchestrator();
        let a = player("#QLR2", "Alpha");
        let b = player("#YYY", "Bravo");
        sync.local().insert_record(&a).unwrap();
        sync.local().insert_record(&b).unwrap();
        sync.remote().fail_upserts_for(b.tag.clone());

        let report = sync.sync_all(CLAN).await.unwrap();

        assert_eq!(report.succeeded, vec![a.tag.clone()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].tag, "#YYY");
        assert!(matches!(report.failed[0].error, SyncError::Store(_)));
        assert!(!sync.local().contains("#QLR2"));
        assert!(sync.local().contains("#YYY"));
        assert!(sync.remote().get(CLAN, &a.tag).is_some());
        assert!(sync.remote().get(CLAN, &b.tag).is_none());
    }

    #[tokio::test]
    async fn test_sync_merges_with_existing_remote() {
        let sync = orchestrator();
        let remote =
            record_departure(&player("#QLR2", "Alpha"), DepartureDetails::default(), t(5))
                .unwrap();
        sync.remote().insert(CLAN, to_remote_shape(&remote, CLAN));

        let mut local = player("#QLR2", "Alpha");
        local.aliases.push(Alias::new("Al", t(3)));
        local.total_tenure = 40;
        sync.local().insert_record(&local).unwrap();

        let report = sync.sync_all(CLAN).await.unwrap();
        assert!(report.is_clean());

        let stored = from_remote_shape(sync.remote().get(CLAN, &local.tag).unwrap());
        assert_eq!(stored.status, MemberStatus::Departed);
        assert_eq!(stored.total_tenure, 40);
        assert_eq!(stored.aliases.len(), 1);
        assert_eq!(stored.movements.len(), 2);
        assert!(sync.local().is_empty());
    }

    #[tokio::test]
    async fn test_remote_row_without_status_keeps_local_status() {
        let sync = orchestrator();
        let local = player("#QLR2", "Alpha");
        sync.local().insert_record(&local).unwrap();
        let row: RemoteShape = serde_json::from_value(json!({
            "tag": "#QLR2",
            "clan_tag": CLAN,
            "primary_name": "Alpha"
        }))
        .unwrap();
        sync.remote().insert(CLAN, row);

        let report = sync.sync_all(CLAN).await.unwrap();
        assert!(report.is_clean());

        let stored = sync.remote().get(CLAN, &local.tag).unwrap();
        assert_eq!(stored.status, Some(MemberStatus::Active));
        assert_eq!(from_remote_shape(stored).movements, local.movements);
    }

    #[tokio::test]
    async fn test_malformed_entry_is_skipped_and_kept() {
        let sync = orchestrator();
        sync.local().insert("#QLR2", json!({ "tag": "#QLR2", "totalTenure": "lots" }));
        sync.local().insert_record(&player("#YYY", "Bravo")).unwrap();

        let report = sync.sync_all(CLAN).await.unwrap();

        assert_eq!(report.succeeded, vec![tag("#YYY")]);
        assert!(matches!(report.failed[0].error, SyncError::Malformed { .. }));
        assert!(sync.local().contains("#QLR2"));
    }

    #[tokio::test]
    async fn test_entry_under_wrong_key_is_rejected() {
        let sync = orchestrator();
        sync.local().insert("#YYY", json!({ "tag": "#QLR2" }));

        let report = sync.sync_all(CLAN).await.unwrap();
        assert!(matches!(report.failed[0].error, SyncError::KeyMismatch { .. }));
        assert!(sync.remote().is_empty());
    }

    #[tokio::test]
    async fn test_remote_read_failure_keeps_entry() {
        let sync = orchestrator();
        let a = player("#QLR2", "Alpha");
        sync.local().insert_record(&a).unwrap();
        sync.remote().fail_reads_for(a.tag.clone());

        let report = sync.sync_all(CLAN).await.unwrap();
        assert_eq!(report.attempted(), 1);
        assert!(!report.is_clean());
        assert!(sync.local().contains("#QLR2"));
    }

    #[tokio::test]
    async fn test_unreadable_cache_aborts_run() {
        let sync = orchestrator();
        sync.local().set_unavailable(true);
        assert!(matches!(
            sync.sync_all(CLAN).await,
            Err(SyncError::Store(StoreError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_rerun_is_safe() {
        let sync = orchestrator();
        let a = player("#QLR2", "Alpha");
        sync.local().insert_record(&a).unwrap();

        sync.sync_all(CLAN).await.unwrap();
        let first = sync.remote().get(CLAN, &a.tag).unwrap();

        // Same record cached again (e.g. delete was lost): merge changes nothing
        sync.local().insert_record(&a).unwrap();
        sync.sync_all(CLAN).await.unwrap();
        let second = sync.remote().get(CLAN, &a.tag).unwrap();

        assert_eq!(from_remote_shape(first).movements, from_remote_shape(second).movements);
    }

    #[tokio::test]
    async fn test_events_published() {
        let mut bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        bus.subscribe(move |event| seen_clone.lock().unwrap().push(event.clone()));

        let sync = orchestrator().with_events(bus);
        sync.local().insert_record(&player("#QLR2", "Alpha")).unwrap();
        sync.local().insert("#YYY", json!({ "nope": true }));
        sync.sync_all(CLAN).await.unwrap();

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], SyncEvent::RecordSynced { had_remote: false, .. }));
        assert!(matches!(events[1], SyncEvent::RecordFailed { .. }));
        assert!(matches!(
            events[2],
            SyncEvent::SyncFinished {
                succeeded: 1,
                failed: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_preview_does_not_write() {
        let sync = orchestrator();
        let a = player("#QLR2", "Alpha");
        sync.local().insert_record(&a).unwrap();

        let merged = sync.preview(CLAN, &a.tag).await.unwrap();
        assert_eq!(merged, a);
        assert!(sync.remote().is_empty());
        assert!(sync.local().contains("#QLR2"));

        assert!(matches!(
            sync.preview(CLAN, &tag("#YYY")).await,
            Err(SyncError::NotCached(_))
        ));
    }

    #[test]
    fn test_report_serializes_errors_as_text() {
        let report = SyncReport {
            succeeded: vec![tag("#QLR2")],
            failed: vec![SyncFailure {
                tag: "#YYY".to_string(),
                error: SyncError::NotCached(tag("#YYY")),
            }],
            elapsed_ms: 3,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["succeeded"][0], "#QLR2");
        assert_eq!(json["failed"][0]["error"], "No cached record for #YYY");
    }
}
