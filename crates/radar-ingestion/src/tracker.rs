//! Persistent record of papers already delivered to the user.
//!
//! Two independent maps, `id → delivered_at` and `normalized title →
//! delivered_at`, persisted together as one JSON snapshot:
//!
//! ```json
//! { "papers": { "https://openalex.org/W1": "2025-03-01T08:00:00Z" },
//!   "titles": { "attention is all you need": "2025-03-01T08:00:00Z" } }
//! ```
//!
//! An entry is live while `now - delivered_at <= retention` (inclusive).
//! Exactly one pipeline run may own a snapshot at a time; there is no file
//! locking.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use radar_common::error::{RadarError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dedup::normalize_title;
use crate::models::PaperRecord;

pub const DEFAULT_RETENTION_DAYS: i64 = 365;

#[derive(Debug, Clone)]
pub struct DedupStore {
    path: Option<PathBuf>,
    retention: Duration,
    papers: BTreeMap<String, DateTime<Utc>>,
    titles: BTreeMap<String, DateTime<Utc>>,
}

/// Entries removed by one purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeStats {
    pub papers: usize,
    pub titles: usize,
}

impl PurgeStats {
    pub fn total(&self) -> usize {
        self.papers + self.titles
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub total_sent: usize,
    pub total_titles: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct SnapshotOut<'a> {
    papers: &'a BTreeMap<String, DateTime<Utc>>,
    titles: &'a BTreeMap<String, DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotIn {
    Current {
        papers: BTreeMap<String, String>,
        #[serde(default)]
        titles: BTreeMap<String, String>,
    },
    /// Older snapshots were a flat `id → timestamp` map with no titles.
    Legacy(BTreeMap<String, String>),
}

impl DedupStore {
    /// Store with no backing file. `save` is a no-op.
    pub fn in_memory(retention: Duration) -> Self {
        Self {
            path: None,
            retention,
            papers: BTreeMap::new(),
            titles: BTreeMap::new(),
        }
    }

    /// Load the snapshot at `path`.
    ///
    /// A missing file yields an empty store. A file that exists but cannot be
    /// read or parsed is an error: continuing with an empty store would
    /// redeliver everything already sent.
    pub fn load(path: impl AsRef<Path>, retention: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut store = Self::in_memory(retention);
        store.path = Some(path.clone());

        if !path.exists() {
            info!(path = %path.display(), "No dedup snapshot found, starting empty");
            return Ok(store);
        }

        let raw = std::fs::read_to_string(&path).map_err(|e| RadarError::StoreCorrupt {
            path: path.clone(),
            reason: format!("unreadable: {e}"),
        })?;
        let snapshot: SnapshotIn = serde_json::from_str(&raw).map_err(|e| RadarError::StoreCorrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let (papers, titles) = match snapshot {
            SnapshotIn::Current { papers, titles } => (papers, titles),
            SnapshotIn::Legacy(papers) => {
                info!("Converting legacy dedup snapshot (ids only)");
                (papers, BTreeMap::new())
            }
        };
        store.papers = parse_timestamps(&path, papers)?;
        store.titles = parse_timestamps(&path, titles)?;

        info!(
            papers = store.papers.len(),
            titles = store.titles.len(),
            "Loaded dedup snapshot"
        );
        Ok(store)
    }

    /// Atomically replace the snapshot: write a sibling temp file, fsync, rename.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let payload = serde_json::to_vec_pretty(&SnapshotOut {
            papers: &self.papers,
            titles: &self.titles,
        })?;

        let tmp_path = temp_path_for(path);
        let write = || -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&payload)?;
            file.sync_all()?;
            std::fs::rename(&tmp_path, path)
        };
        write().map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            RadarError::Store(format!("failed to replace {}: {e}", path.display()))
        })?;

        debug!(
            papers = self.papers.len(),
            titles = self.titles.len(),
            path = %path.display(),
            "Saved dedup snapshot"
        );
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// True if the paper's id OR its normalized title is a live key.
    pub fn is_already_sent(&self, paper: &PaperRecord) -> bool {
        self.is_already_sent_at(paper, Utc::now())
    }

    pub fn is_already_sent_at(&self, paper: &PaperRecord, now: DateTime<Utc>) -> bool {
        if self.papers.get(&paper.id).is_some_and(|ts| self.is_live(*ts, now)) {
            return true;
        }
        let norm = normalize_title(&paper.title);
        !norm.is_empty() && self.titles.get(&norm).is_some_and(|ts| self.is_live(*ts, now))
    }

    /// Record a delivery. Re-marking refreshes both timestamps (last write wins).
    pub fn mark_sent(&mut self, paper: &PaperRecord, delivered_at: DateTime<Utc>) {
        self.papers.insert(paper.id.clone(), delivered_at);
        let norm = normalize_title(&paper.title);
        if !norm.is_empty() {
            self.titles.insert(norm, delivered_at);
        }
    }

    /// Drop every entry older than `retention`. Each entry ages independently.
    pub fn purge_expired(&mut self, now: DateTime<Utc>, retention: Duration) -> PurgeStats {
        let before = (self.papers.len(), self.titles.len());
        self.papers.retain(|_, ts| now - *ts <= retention);
        self.titles.retain(|_, ts| now - *ts <= retention);
        let stats = PurgeStats {
            papers: before.0 - self.papers.len(),
            titles: before.1 - self.titles.len(),
        };
        if stats.total() > 0 {
            info!(
                papers = stats.papers,
                titles = stats.titles,
                retention_days = retention.num_days(),
                "Purged expired dedup entries"
            );
        }
        stats
    }

    /// Number of tracked ids.
    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty() && self.titles.is_empty()
    }

    pub fn title_count(&self) -> usize {
        self.titles.len()
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            total_sent: self.papers.len(),
            total_titles: self.titles.len(),
            oldest_entry: self.papers.values().min().copied(),
            newest_entry: self.papers.values().max().copied(),
        }
    }

    fn is_live(&self, delivered_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - delivered_at <= self.retention
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sent_papers.json".to_string());
    path.with_file_name(format!("{name}.tmp"))
}

fn parse_timestamps(
    path: &Path,
    raw: BTreeMap<String, String>,
) -> Result<BTreeMap<String, DateTime<Utc>>> {
    raw.into_iter()
        .map(|(key, value)| {
            parse_timestamp(&value)
                .map(|ts| (key.clone(), ts))
                .ok_or_else(|| RadarError::StoreCorrupt {
                    path: path.to_path_buf(),
                    reason: format!("invalid timestamp {value:?} for key {key:?}"),
                })
        })
        .collect()
}

/// RFC 3339, or a naive ISO-8601 timestamp taken as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
