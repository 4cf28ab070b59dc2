//! Title normalization and candidate deduplication.
//!
//! Two papers are the same paper if they share a source id, or if their
//! titles normalize to the same string. Normalization catches the same work
//! surfacing under a second id (preprint vs. published version, a trailing
//! "!" in one index, etc.).

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::models::PaperRecord;
use crate::tracker::DedupStore;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\w\s]").expect("static regex");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("static regex");
}

/// Lowercase, strip punctuation, collapse whitespace, trim.
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Result of a deduplication check.
#[derive(Debug, Clone, PartialEq)]
pub enum DedupResult {
    /// Paper is new, proceed to scoring.
    New,
    /// A live entry in the persistent store matches (by id or title).
    AlreadySent,
    /// Another candidate earlier in this run has the same normalized title.
    RepeatedTitle(String),
}

/// Filter search candidates down to papers never delivered before.
///
/// Order is preserved. Papers already sent (by id OR title) are dropped, as
/// are later candidates whose normalized title repeats an earlier one.
pub fn filter_candidates(
    candidates: Vec<PaperRecord>,
    store: &DedupStore,
    now: chrono::DateTime<chrono::Utc>,
) -> (Vec<PaperRecord>, FilterStats) {
    let mut seen_titles: HashSet<String> = HashSet::new();
    let mut stats = FilterStats::default();
    let mut kept = Vec::with_capacity(candidates.len());

    for paper in candidates {
        match check_candidate(&paper, store, now, &mut seen_titles) {
            DedupResult::New => kept.push(paper),
            DedupResult::AlreadySent => {
                stats.already_sent += 1;
                debug!(id = %paper.id, title = %paper.title, "Filtering paper already sent");
            }
            DedupResult::RepeatedTitle(norm) => {
                stats.repeated_title += 1;
                debug!(id = %paper.id, normalized = %norm, "Filtering repeated title within run");
            }
        }
    }

    (kept, stats)
}

fn check_candidate(
    paper: &PaperRecord,
    store: &DedupStore,
    now: chrono::DateTime<chrono::Utc>,
    seen_titles: &mut HashSet<String>,
) -> DedupResult {
    if store.is_already_sent_at(paper, now) {
        return DedupResult::AlreadySent;
    }
    let norm = normalize_title(&paper.title);
    if !norm.is_empty() && !seen_titles.insert(norm.clone()) {
        return DedupResult::RepeatedTitle(norm);
    }
    DedupResult::New
}

/// Counters from [`filter_candidates`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub already_sent: usize,
    pub repeated_title: usize,
}
