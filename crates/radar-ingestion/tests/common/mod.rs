//! Scripted fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use radar_common::error::{RadarError, Result};
use radar_ingestion::collaborators::{DeliveryReceipt, PaperScorer, RadarReport, ReportDelivery};
use radar_ingestion::sources::{PageRequest, SearchPage, SearchSource, SourceError};
use radar_ingestion::{
    DedupStore, PaperRecord, PipelineConfig, RadarPipeline, ResearchProfile, ScoredPaper,
    SearchConfig, SortStrategySelector, SourceSearchStage, StdRandom,
};
use tokio::time::Instant;

// ── Search source ─────────────────────────────────────────────────────────────

pub enum Step {
    Page(SearchPage),
    Fail(SourceError),
    /// Sleep before answering, to trip the stage timeout.
    Hang(Duration),
}

/// Answers `(query text, page)` from a script; unscripted pages are empty.
#[derive(Default)]
pub struct FakeSource {
    script: Mutex<HashMap<(String, u32), VecDeque<Step>>>,
    calls: Mutex<Vec<(PageRequest, Instant)>>,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, text: &str, page: u32, step: Step) {
        self.script
            .lock()
            .unwrap()
            .entry((text.to_string(), page))
            .or_default()
            .push_back(step);
    }

    pub fn page(&self, text: &str, page: u32, papers: Vec<PaperRecord>, has_more: bool) {
        self.push(text, page, Step::Page(SearchPage { papers, has_more }));
    }

    pub fn calls(&self) -> Vec<(PageRequest, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, text: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(r, _)| r.text == text).count()
    }
}

#[async_trait]
impl SearchSource for FakeSource {
    async fn search(&self, request: &PageRequest) -> std::result::Result<SearchPage, SourceError> {
        self.calls.lock().unwrap().push((request.clone(), Instant::now()));
        let step = self
            .script
            .lock()
            .unwrap()
            .get_mut(&(request.text.clone(), request.page))
            .and_then(|q| q.pop_front());
        match step {
            None => Ok(SearchPage::default()),
            Some(Step::Page(page)) => Ok(page),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Hang(d)) => {
                tokio::time::sleep(d).await;
                Ok(SearchPage::default())
            }
        }
    }

    fn name(&self) -> &str {
        "fake"
    }
}

// ── Scorer ────────────────────────────────────────────────────────────────────

/// Scores by id; unknown ids get `default_score`. Ids in `fail` error out.
pub struct FakeScorer {
    pub scores: HashMap<String, f64>,
    pub default_score: f64,
    pub fail: Vec<String>,
    pub seen: Mutex<Vec<String>>,
}

impl FakeScorer {
    pub fn accepting_all() -> Arc<Self> {
        Arc::new(Self::with_default(0.9))
    }

    pub fn with_default(default_score: f64) -> Self {
        Self {
            scores: HashMap::new(),
            default_score,
            fail: Vec::new(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaperScorer for FakeScorer {
    async fn assess(&self, paper: &PaperRecord, _profile: &ResearchProfile) -> Result<ScoredPaper> {
        self.seen.lock().unwrap().push(paper.id.clone());
        if self.fail.contains(&paper.id) {
            return Err(RadarError::Scoring(format!("model refused {}", paper.id)));
        }
        Ok(ScoredPaper {
            paper: paper.clone(),
            score: self.scores.get(&paper.id).copied().unwrap_or(self.default_score),
            rationale: "fake".to_string(),
            methodology_summary: None,
            practical_application: None,
            confidence: None,
        })
    }
}

// ── Delivery ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeDelivery {
    pub fail: bool,
    pub reports: Mutex<Vec<Vec<String>>>,
}

impl FakeDelivery {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { fail: true, ..Default::default() })
    }

    pub fn delivered_ids(&self) -> Vec<Vec<String>> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportDelivery for FakeDelivery {
    async fn deliver(&self, report: &RadarReport) -> Result<DeliveryReceipt> {
        if self.fail {
            return Err(RadarError::Other(anyhow::anyhow!("smtp connection refused")));
        }
        self.reports
            .lock()
            .unwrap()
            .push(report.papers.iter().map(|s| s.paper.id.clone()).collect());
        Ok(DeliveryReceipt { delivered_at: Utc::now(), reference: "fake".to_string() })
    }
}

// ── Builders ──────────────────────────────────────────────────────────────────

/// A paper with an abstract long enough to be preferred for scoring.
pub fn paper(id: &str, title: &str) -> PaperRecord {
    PaperRecord::new(id, title)
        .with_field("Computer Science")
        .with_abstract("We study a structural correspondence between two problems. ".repeat(3))
}

pub fn fast_search_config() -> SearchConfig {
    SearchConfig {
        min_request_interval: Duration::from_millis(10),
        request_timeout: Duration::from_secs(30),
        max_attempts: 3,
        retry_base_delay: Duration::from_millis(100),
        retry_max_delay: Duration::from_millis(400),
        max_pages_per_query: 5,
    }
}

pub fn stage(source: Arc<FakeSource>, config: SearchConfig) -> SourceSearchStage {
    let selector = SortStrategySelector::new(Box::new(StdRandom::seeded(7)));
    SourceSearchStage::new(source, selector, config).unwrap()
}

pub fn pipeline(
    source: Arc<FakeSource>,
    store: DedupStore,
    scorer: Arc<dyn PaperScorer>,
    delivery: Arc<dyn ReportDelivery>,
    config: PipelineConfig,
) -> RadarPipeline {
    RadarPipeline::new(stage(source, fast_search_config()), store, scorer, delivery, config)
}
