//! Dedup snapshot persistence on a real filesystem.

use chrono::{Duration, TimeZone, Utc};
use radar_common::error::RadarError;
use radar_ingestion::{DedupStore, PaperRecord};
use tempfile::TempDir;

fn retention() -> Duration {
    Duration::days(365)
}

#[test]
fn test_missing_snapshot_loads_empty() {
    let dir = TempDir::new().unwrap();
    let store = DedupStore::load(dir.path().join("sent_papers.json"), retention()).unwrap();
    assert!(store.is_empty());
}

#[test]
fn test_save_then_load_preserves_both_maps() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache").join("sent_papers.json");
    let ts = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();

    let mut store = DedupStore::load(&path, retention()).unwrap();
    store.mark_sent(&PaperRecord::new("https://openalex.org/W1", "Attention Is All You Need"), ts);
    store.save().unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw["papers"]["https://openalex.org/W1"].is_string());
    assert!(raw["titles"]["attention is all you need"].is_string());

    let reloaded = DedupStore::load(&path, retention()).unwrap();
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded.title_count(), 1);
    assert!(reloaded.is_already_sent_at(&PaperRecord::new("W-new", "Attention is all you need"), ts));
    assert!(!dir.path().join("cache").join("sent_papers.json.tmp").exists());
}

#[test]
fn test_legacy_flat_snapshot_is_accepted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sent_papers.json");
    std::fs::write(&path, r#"{"https://openalex.org/W1": "2025-03-01T08:00:00.123456"}"#).unwrap();

    let store = DedupStore::load(&path, retention()).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(store.title_count(), 0);
    let now = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap();
    assert!(store.is_already_sent_at(&PaperRecord::new("https://openalex.org/W1", "x"), now));
}

#[test]
fn test_corrupt_snapshot_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sent_papers.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = DedupStore::load(&path, retention()).unwrap_err();
    assert!(matches!(err, RadarError::StoreCorrupt { .. }));
    assert!(err.is_fatal());
}

#[test]
fn test_bad_timestamp_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sent_papers.json");
    std::fs::write(&path, r#"{"papers": {"W1": "last tuesday"}, "titles": {}}"#).unwrap();

    assert!(matches!(
        DedupStore::load(&path, retention()),
        Err(RadarError::StoreCorrupt { .. })
    ));
}

#[test]
fn test_save_overwrites_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sent_papers.json");
    let now = Utc::now();

    let mut store = DedupStore::load(&path, retention()).unwrap();
    store.mark_sent(&PaperRecord::new("W1", "One"), now - Duration::days(400));
    store.save().unwrap();

    store.purge_expired(now, retention());
    store.mark_sent(&PaperRecord::new("W2", "Two"), now);
    store.save().unwrap();

    let reloaded = DedupStore::load(&path, retention()).unwrap();
    assert_eq!(reloaded.len(), 1);
    assert!(reloaded.is_already_sent_at(&PaperRecord::new("W2", "Two"), now));
}

#[test]
fn test_failed_save_removes_temp_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sent_papers.json");
    let mut store = DedupStore::load(&path, retention()).unwrap();
    store.mark_sent(&PaperRecord::new("W1", "One"), Utc::now());

    // A non-empty directory at the snapshot path makes the final rename fail.
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("keep"), b"x").unwrap();

    let err = store.save().unwrap_err();
    assert!(matches!(err, RadarError::Store(_)));
    assert!(!dir.path().join("sent_papers.json.tmp").exists());
    assert!(path.join("keep").exists());
}
