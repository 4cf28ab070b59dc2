//! End-to-end radar run.
//!
//! Orchestrates one pipeline run:
//!   1. Purge expired entries from the dedup store
//!   2. Search every query (sort selection, pagination, intra-run dedup)
//!   3. Drop candidates already delivered in earlier runs (id OR title)
//!   4. Pick the most promising candidates for scoring
//!   5. Score against the research profile, keep those above threshold
//!   6. Deliver the report
//!   7. Only after confirmed delivery: mark papers sent and save the store
//!
//! A fatal error at any step returns before the store is saved, so a failed
//! run never suppresses papers it did not actually deliver.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use radar_common::error::{RadarError, Result};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::collaborators::{DeliveryReceipt, PaperScorer, RadarReport, ReportDelivery};
use crate::dedup::filter_candidates;
use crate::models::{PaperRecord, ResearchProfile, ScoredPaper, SearchQuery};
use crate::search::{QueryOutcome, SourceSearchStage};
use crate::tracker::{DedupStore, PurgeStats};

/// Abstracts shorter than this are too thin to score reliably.
const MIN_ABSTRACT_CHARS: usize = 100;

// ── Run config ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// `from_date = today - search_days_back`.
    pub search_days_back: i64,
    pub max_results_per_query: usize,
    /// Papers scoring below this are not delivered.
    pub min_relevance_score: f64,
    pub max_papers_to_analyze: usize,
    /// Build the report but never deliver it and never mark anything sent.
    pub skip_delivery: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            search_days_back: 7,
            max_results_per_query: 20,
            min_relevance_score: 0.5,
            max_papers_to_analyze: 5,
            skip_delivery: false,
        }
    }
}

// ── Result summary ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub from_date: NaiveDate,
    pub papers_found: usize,
    pub duplicates_in_run: usize,
    pub already_sent: usize,
    pub repeated_titles: usize,
    pub papers_scored: usize,
    pub papers_accepted: usize,
    pub accepted: Vec<ScoredPaper>,
    pub queries: Vec<QueryOutcome>,
    pub purged: PurgeStats,
    pub delivery: Option<DeliveryReceipt>,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn delivered(&self) -> bool {
        self.delivery.is_some()
    }
}

// ── Pipeline orchestrator ─────────────────────────────────────────────────────

pub struct RadarPipeline {
    stage: SourceSearchStage,
    store: DedupStore,
    scorer: Arc<dyn PaperScorer>,
    delivery: Arc<dyn ReportDelivery>,
    config: PipelineConfig,
}

impl RadarPipeline {
    pub fn new(
        stage: SourceSearchStage,
        store: DedupStore,
        scorer: Arc<dyn PaperScorer>,
        delivery: Arc<dyn ReportDelivery>,
        config: PipelineConfig,
    ) -> Self {
        Self { stage, store, scorer, delivery, config }
    }

    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    pub fn into_store(self) -> DedupStore {
        self.store
    }

    pub async fn run(
        &mut self,
        queries: &[SearchQuery],
        profile: &ResearchProfile,
    ) -> Result<RunReport> {
        self.run_at(queries, profile, Utc::now()).await
    }

    /// Run with an explicit clock. `now` drives retention, the search window
    /// and the timestamp recorded for delivered papers.
    #[instrument(skip(self, queries, profile), fields(n_queries = queries.len()))]
    pub async fn run_at(
        &mut self,
        queries: &[SearchQuery],
        profile: &ResearchProfile,
        now: DateTime<Utc>,
    ) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let t0 = std::time::Instant::now();
        info!(run_id = %run_id, "Starting radar run");

        // ── 1. Retention ──────────────────────────────────────────────────────
        let purged = self.store.purge_expired(now, self.store.retention());

        // ── 2. Search ─────────────────────────────────────────────────────────
        let from_date = (now - Duration::days(self.config.search_days_back)).date_naive();
        let search = self
            .stage
            .run(queries, from_date, self.config.max_results_per_query)
            .await?;

        let mut report = RunReport {
            run_id,
            from_date,
            papers_found: search.papers.len(),
            duplicates_in_run: search.duplicates,
            already_sent: 0,
            repeated_titles: 0,
            papers_scored: 0,
            papers_accepted: 0,
            accepted: Vec::new(),
            queries: search.queries.clone(),
            purged,
            delivery: None,
            errors: search
                .unavailable()
                .filter_map(|q| q.error())
                .map(|e| e.to_string())
                .collect(),
            duration_ms: 0,
        };

        // ── 3. Cross-run dedup ────────────────────────────────────────────────
        let (candidates, stats) = filter_candidates(search.papers, &self.store, now);
        report.already_sent = stats.already_sent;
        report.repeated_titles = stats.repeated_title;
        info!(
            candidates = candidates.len(),
            already_sent = stats.already_sent,
            repeated_titles = stats.repeated_title,
            "Filtered previously delivered papers"
        );

        // ── 4–5. Select and score ─────────────────────────────────────────────
        let selected = select_for_scoring(candidates, self.config.max_papers_to_analyze);
        info!(n = selected.len(), "Scoring candidates");

        for paper in &selected {
            match self.scorer.assess(paper, profile).await {
                Ok(scored) => {
                    report.papers_scored += 1;
                    if scored.score >= self.config.min_relevance_score {
                        info!(title = %paper.title, score = scored.score, "  ✓ accepted");
                        report.accepted.push(scored);
                    } else {
                        info!(title = %paper.title, score = scored.score, "  ✗ score too low");
                    }
                }
                Err(e) => {
                    let msg = format!("scoring failed for {}: {e}", paper.id);
                    warn!("{}", &msg);
                    report.errors.push(msg);
                }
            }
        }

        report.accepted.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
        });
        report.papers_accepted = report.accepted.len();

        // ── 6–7. Deliver, then mark ───────────────────────────────────────────
        if report.accepted.is_empty() {
            info!("No papers passed the relevance threshold, nothing to deliver");
        } else if self.config.skip_delivery {
            info!(n = report.papers_accepted, "Delivery skipped, papers not marked as sent");
        } else {
            let radar_report = RadarReport {
                run_id,
                generated_at: now,
                papers: report.accepted.clone(),
            };
            let receipt = match self.delivery.deliver(&radar_report).await {
                Ok(receipt) => receipt,
                Err(e) => {
                    error!(error = %e, "Delivery failed, no papers marked as sent");
                    return Err(match e {
                        RadarError::Delivery(_) => e,
                        other => RadarError::Delivery(other.to_string()),
                    });
                }
            };
            for scored in &report.accepted {
                self.store.mark_sent(&scored.paper, now);
            }
            info!(n = report.papers_accepted, reference = %receipt.reference, "Report delivered");
            report.delivery = Some(receipt);
        }

        if report.delivered() || purged.total() > 0 {
            self.store.save()?;
        }

        report.duration_ms = t0.elapsed().as_millis() as u64;
        info!(
            run_id = %run_id,
            found = report.papers_found,
            duplicates = report.duplicates_in_run,
            already_sent = report.already_sent,
            scored = report.papers_scored,
            accepted = report.papers_accepted,
            delivered = report.delivered(),
            duration_ms = report.duration_ms,
            errors = report.errors.len(),
            "Radar run complete"
        );
        Ok(report)
    }
}

// ── Candidate selection ───────────────────────────────────────────────────────

/// Pick at most `max` candidates worth scoring.
///
/// Papers with a substantial abstract come first. The first half of the
/// slots goes to whatever comes first; after that a paper only gets a slot
/// if its primary field is not represented yet. Remaining slots are then
/// filled in order.
pub fn select_for_scoring(candidates: Vec<PaperRecord>, max: usize) -> Vec<PaperRecord> {
    let with_abstracts: Vec<PaperRecord> = candidates
        .iter()
        .filter(|p| p.abstract_len() > MIN_ABSTRACT_CHARS)
        .cloned()
        .collect();

    if with_abstracts.is_empty() {
        if !candidates.is_empty() {
            warn!("No candidates with substantial abstracts");
        }
        return candidates.into_iter().take(max).collect();
    }

    let mut picked: Vec<usize> = Vec::new();
    let mut seen_fields: HashSet<&str> = HashSet::new();
    for (i, paper) in with_abstracts.iter().enumerate() {
        if picked.len() >= max {
            break;
        }
        let field = paper.primary_field.as_deref().unwrap_or("Unknown");
        if !seen_fields.contains(field) || picked.len() < max / 2 {
            picked.push(i);
            seen_fields.insert(field);
        }
    }
    for i in 0..with_abstracts.len() {
        if picked.len() >= max {
            break;
        }
        if !picked.contains(&i) {
            picked.push(i);
        }
    }

    picked.into_iter().map(|i| with_abstracts[i].clone()).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
