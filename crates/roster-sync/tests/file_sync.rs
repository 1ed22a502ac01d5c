//! End-to-end tests for roster-sync.
//!
//! Runs the orchestrator against the JSON-file cache and store: records move
//! from the cache directory into the store file, failures stay behind.

use chrono::{DateTime, TimeZone, Utc};
use roster_history::{
    from_remote_shape, record_departure, record_return, DepartureDetails, LocalCache,
    MemberStatus, PlayerHistoryRecord, RemoteStore, ReturnDetails, SyncError, SyncOrchestrator,
};
use roster_history::shape::to_remote_shape;
use roster_sync::{JsonDirCache, JsonFileStore};
use tempfile::TempDir;

const CLAN: &str = "#2PR8R8V8P";

fn t(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 8, day, 0, 0, 0).unwrap()
}

fn setup(dir: &TempDir) -> SyncOrchestrator<JsonDirCache, JsonFileStore> {
    SyncOrchestrator::new(
        JsonDirCache::new(dir.path().join("cache")),
        JsonFileStore::new(dir.path().join("remote.json")),
    )
}

#[tokio::test]
async fn test_cached_records_move_to_store() {
    let dir = TempDir::new().unwrap();
    let sync = setup(&dir);

    let quinn = PlayerHistoryRecord::joined("#QLR2".parse().unwrap(), "Quinn", t(1));
    let yara = PlayerHistoryRecord::joined("#YYY".parse().unwrap(), "Yara", t(2));
    sync.local().write_record(&quinn).await.unwrap();
    sync.local().write_record(&yara).await.unwrap();

    let report = sync.sync_all(CLAN).await.unwrap();
    assert_eq!(report.succeeded, vec![quinn.tag.clone(), yara.tag.clone()]);
    assert!(report.is_clean());
    assert!(sync.local().read_all().await.unwrap().is_empty());

    let stored = sync.remote().read_by_key(CLAN, &quinn.tag).await.unwrap().unwrap();
    assert_eq!(stored.clan_tag.as_deref(), Some(CLAN));
    assert_eq!(from_remote_shape(stored), quinn);
}

#[tokio::test]
async fn test_device_history_merges_into_remote_history() {
    let dir = TempDir::new().unwrap();
    let sync = setup(&dir);

    // Remote knows about the departure; the device also saw the return under a new name
    let joined = PlayerHistoryRecord::joined("#QLR2".parse().unwrap(), "Quinn", t(1));
    let departed = record_departure(
        &joined,
        DepartureDetails {
            departure_reason: Some("inactive".to_string()),
            tenure_at_departure: 9,
            departure_notes: None,
        },
        t(10),
    )
    .unwrap();
    sync.remote().upsert(to_remote_shape(&departed, CLAN)).await.unwrap();

    let returned = record_return(
        &departed,
        ReturnDetails {
            observed_name: Some("Q".to_string()),
            award_previous_tenure: Some(9),
            return_notes: None,
        },
        t(20),
    )
    .unwrap();
    sync.local().write_record(&returned).await.unwrap();

    let report = sync.sync_all(CLAN).await.unwrap();
    assert!(report.is_clean());

    let merged = from_remote_shape(
        sync.remote()
            .read_by_key(CLAN, &returned.tag)
            .await
            .unwrap()
            .unwrap(),
    );
    assert_eq!(merged.movements.len(), 3);
    assert_eq!(merged.total_tenure, 9);
    assert!(merged.aliases.iter().any(|a| a.name == "Quinn"));
    // Remote row existed, so its current state stands until the next upsert from the app
    assert_eq!(merged.status, MemberStatus::Departed);
}

#[tokio::test]
async fn test_corrupt_entry_is_reported_and_kept() {
    let dir = TempDir::new().unwrap();
    let sync = setup(&dir);

    let quinn = PlayerHistoryRecord::joined("#QLR2".parse().unwrap(), "Quinn", t(1));
    sync.local().write_record(&quinn).await.unwrap();
    std::fs::write(dir.path().join("cache/YYY.json"), "{ truncated").unwrap();

    let report = sync.sync_all(CLAN).await.unwrap();
    assert_eq!(report.succeeded, vec![quinn.tag.clone()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].tag, "YYY");
    assert!(matches!(report.failed[0].error, SyncError::Malformed { .. }));
    assert!(dir.path().join("cache/YYY.json").exists());
    assert!(!dir.path().join("cache/QLR2.json").exists());

    // Running again only retries the bad entry
    let report = sync.sync_all(CLAN).await.unwrap();
    assert!(report.succeeded.is_empty());
    assert_eq!(report.attempted(), 1);
}

#[tokio::test]
async fn test_unwritable_store_keeps_cache() {
    let dir = TempDir::new().unwrap();
    // A directory where the store file should be makes every write fail
    std::fs::create_dir_all(dir.path().join("remote.json")).unwrap();
    let sync = setup(&dir);

    let quinn = PlayerHistoryRecord::joined("#QLR2".parse().unwrap(), "Quinn", t(1));
    sync.local().write_record(&quinn).await.unwrap();

    let report = sync.sync_all(CLAN).await.unwrap();
    assert!(report.succeeded.is_empty());
    assert!(matches!(report.failed[0].error, SyncError::Store(_)));
    assert_eq!(sync.local().read_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_non_utf8_entry_does_not_block_other_records() {
    let dir = TempDir::new().unwrap();
    let sync = setup(&dir);

    let quinn = PlayerHistoryRecord::joined("#QLR2".parse().unwrap(), "Quinn", t(1));
    sync.local().write_record(&quinn).await.unwrap();
    std::fs::write(dir.path().join("cache/YYY.json"), [0xff, 0xfe, 0x00]).unwrap();

    let report = sync.sync_all(CLAN).await.unwrap();
    assert_eq!(report.succeeded, vec![quinn.tag.clone()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].tag, "YYY");
    assert!(matches!(report.failed[0].error, SyncError::Malformed { .. }));
    assert!(dir.path().join("cache/YYY.json").exists());
    assert!(sync.remote().read_by_key(CLAN, &quinn.tag).await.unwrap().is_some());
}
