//! Source search stage.
//!
//! For each query, in order:
//!   1. Fix the sort strategy once for the whole query
//!   2. Fetch pages (throttled, timed out, retried with backoff)
//!   3. Drop papers whose id was already seen earlier in this run
//!   4. Stop on an all-duplicate page, the per-query cap, the page cap, or
//!      when the source reports no more pages
//!
//! A query whose retries run out is reported as unavailable and contributes
//! nothing; the remaining queries still run. A fatal source error aborts the
//! whole stage.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use radar_common::error::{RadarError, Result};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::models::{PaperRecord, SearchQuery, SortDecision};
use crate::sort::SortStrategySelector;
use crate::sources::{PageRequest, SearchPage, SearchSource, SourceError};

const MAX_PER_PAGE: usize = 200;

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Minimum spacing between any two calls to the source, retries included.
    pub min_request_interval: Duration,
    /// Upper bound on a single call.
    pub request_timeout: Duration,
    /// Attempts per page, first try included.
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub max_pages_per_query: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_request_interval: Duration::from_secs(3),
            request_timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(4),
            retry_max_delay: Duration::from_secs(10),
            max_pages_per_query: 5,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(RadarError::Config("max_attempts must be greater than 0".into()));
        }
        if self.max_pages_per_query == 0 {
            return Err(RadarError::Config("max_pages_per_query must be greater than 0".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(RadarError::Config("request_timeout must be greater than 0".into()));
        }
        if self.retry_base_delay > self.retry_max_delay {
            return Err(RadarError::Config("retry_base_delay must be <= retry_max_delay".into()));
        }
        Ok(())
    }

    /// Exponential backoff after failed attempt number `attempt` (1-based), capped.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryStatus {
    Completed { found: usize, new: usize, pages: u32 },
    Unavailable { attempts: u32, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub query: SearchQuery,
    pub sort: SortDecision,
    pub status: QueryStatus,
}

impl QueryOutcome {
    pub fn is_unavailable(&self) -> bool {
        matches!(self.status, QueryStatus::Unavailable { .. })
    }

    /// The stage-level error for an unavailable query, if any.
    pub fn error(&self) -> Option<RadarError> {
        match &self.status {
            QueryStatus::Unavailable { attempts, error } => Some(RadarError::SearchUnavailable {
                query: self.query.text.clone(),
                attempts: *attempts,
                last_error: error.clone(),
            }),
            QueryStatus::Completed { .. } => None,
        }
    }
}

/// Merged result of one stage run. `papers` keeps query order, then page order.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub papers: Vec<PaperRecord>,
    /// Papers dropped because their id was already seen in this run.
    pub duplicates: usize,
    pub queries: Vec<QueryOutcome>,
}

impl SearchOutcome {
    pub fn unavailable(&self) -> impl Iterator<Item = &QueryOutcome> {
        self.queries.iter().filter(|q| q.is_unavailable())
    }
}

// ── Retry state machine ───────────────────────────────────────────────────────

/// Lifecycle of one page fetch.
#[derive(Debug)]
enum FetchState {
    NotStarted,
    Fetching { attempt: u32 },
    Backoff { attempt: u32, error: SourceError },
    Succeeded(SearchPage),
    FailedTransient { attempts: u32, error: SourceError },
    FailedFatal(SourceError),
}

enum PageFetch {
    Page(SearchPage),
    Unavailable { attempts: u32, error: SourceError },
    Fatal(SourceError),
}

// ── Throttle ──────────────────────────────────────────────────────────────────

/// Enforces a minimum gap between consecutive source calls.
#[derive(Debug)]
struct RequestThrottle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl RequestThrottle {
    fn new(min_interval: Duration) -> Self {
        Self { min_interval, last: None }
    }

    async fn wait(&mut self) {
        if let Some(last) = self.last {
            let ready_at = last + self.min_interval;
            if ready_at > Instant::now() {
                debug!(wait_ms = (ready_at - Instant::now()).as_millis() as u64, "Rate limiting");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

// ── Stage ─────────────────────────────────────────────────────────────────────

pub struct SourceSearchStage {
    source: Arc<dyn SearchSource>,
    selector: SortStrategySelector,
    throttle: RequestThrottle,
    config: SearchConfig,
}

impl SourceSearchStage {
    pub fn new(
        source: Arc<dyn SearchSource>,
        selector: SortStrategySelector,
        config: SearchConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            selector,
            throttle: RequestThrottle::new(config.min_request_interval),
            config,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run every query and merge the results with intra-run id dedup.
    #[instrument(skip(self, queries), fields(source = self.source.name(), n_queries = queries.len()))]
    pub async fn run(
        &mut self,
        queries: &[SearchQuery],
        from_date: NaiveDate,
        max_results_per_query: usize,
    ) -> Result<SearchOutcome> {
        if max_results_per_query == 0 {
            return Err(RadarError::Config("max_results_per_query must be greater than 0".into()));
        }
        info!(%from_date, "Searching for papers published on or after");

        let mut outcome = SearchOutcome::default();
        let mut seen_ids: HashSet<String> = HashSet::new();

        for query in queries {
            let sort = self.selector.select_strategy(query.query_type);
            info!(query_type = %query.query_type, %sort, text = %query.text, "Executing query");

            let run = self
                .run_query(query, sort, from_date, max_results_per_query, &seen_ids)
                .await?;

            let status = match run.terminal {
                None => {
                    info!(
                        found = run.found,
                        new = run.papers.len(),
                        pages = run.pages,
                        "  → query complete"
                    );
                    outcome.duplicates += run.duplicates;
                    seen_ids.extend(run.papers.iter().map(|p| p.id.clone()));
                    let new = run.papers.len();
                    outcome.papers.extend(run.papers);
                    QueryStatus::Completed { found: run.found, new, pages: run.pages }
                }
                Some((attempts, error)) => {
                    warn!(
                        text = %query.text,
                        attempts,
                        error = %error,
                        "Search unavailable for query, skipping"
                    );
                    QueryStatus::Unavailable { attempts, error: error.to_string() }
                }
            };

            outcome.queries.push(QueryOutcome { query: query.clone(), sort, status });
        }

        info!(
            papers = outcome.papers.len(),
            duplicates = outcome.duplicates,
            unavailable = outcome.unavailable().count(),
            "Search stage complete"
        );
        Ok(outcome)
    }

    async fn run_query(
        &mut self,
        query: &SearchQuery,
        sort: SortDecision,
        from_date: NaiveDate,
        cap: usize,
        seen_ids: &HashSet<String>,
    ) -> Result<QueryRun> {
        let mut run = QueryRun::default();
        let mut query_ids: HashSet<String> = HashSet::new();

        for page_no in 1..=self.config.max_pages_per_query {
            let request = PageRequest {
                text: query.text.clone(),
                sort,
                from_date,
                page: page_no,
                per_page: cap.min(MAX_PER_PAGE),
            };

            let page = match self.fetch_page(&request).await {
                PageFetch::Page(page) => page,
                PageFetch::Unavailable { attempts, error } => {
                    run.terminal = Some((attempts, error));
                    return Ok(run);
                }
                PageFetch::Fatal(error) => {
                    return Err(RadarError::SourceFatal(format!(
                        "{} query '{}': {}",
                        self.source.name(),
                        query.text,
                        error
                    )));
                }
            };

            run.pages = page_no;
            run.found += page.papers.len();
            let mut new_on_page = 0usize;
            for paper in page.papers {
                if run.papers.len() >= cap {
                    break;
                }
                if seen_ids.contains(&paper.id) || !query_ids.insert(paper.id.clone()) {
                    run.duplicates += 1;
                    continue;
                }
                new_on_page += 1;
                run.papers.push(paper);
            }

            if new_on_page == 0 || run.papers.len() >= cap || !page.has_more {
                break;
            }
        }

        Ok(run)
    }

    async fn fetch_page(&mut self, request: &PageRequest) -> PageFetch {
        let mut state = FetchState::NotStarted;
        loop {
            state = match state {
                FetchState::NotStarted => FetchState::Fetching { attempt: 1 },
                FetchState::Fetching { attempt } => {
                    self.throttle.wait().await;
                    let result = tokio::time::timeout(
                        self.config.request_timeout,
                        self.source.search(request),
                    )
                    .await
                    .unwrap_or_else(|_| {
                        Err(SourceError::Transient(format!(
                            "request timed out after {:?}",
                            self.config.request_timeout
                        )))
                    });
                    match result {
                        Ok(page) => FetchState::Succeeded(page),
                        Err(error) if !error.is_transient() => FetchState::FailedFatal(error),
                        Err(error) if attempt >= self.config.max_attempts => {
                            FetchState::FailedTransient { attempts: attempt, error }
                        }
                        Err(error) => FetchState::Backoff { attempt, error },
                    }
                }
                FetchState::Backoff { attempt, error } => {
                    let delay = self.config.backoff_delay(attempt);
                    warn!(
                        page = request.page,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient search failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    FetchState::Fetching { attempt: attempt + 1 }
                }
                FetchState::Succeeded(page) => return PageFetch::Page(page),
                FetchState::FailedTransient { attempts, error } => {
                    return PageFetch::Unavailable { attempts, error }
                }
                FetchState::FailedFatal(error) => return PageFetch::Fatal(error),
            };
        }
    }
}

/// Per-query accumulator, committed to the run only when the query completes.
#[derive(Default)]
struct QueryRun {
    papers: Vec<PaperRecord>,
    found: usize,
    duplicates: usize,
    pages: u32,
    terminal: Option<(u32, SourceError)>,
}
