//! Literature search source clients.

pub mod openalex;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{PaperRecord, SortDecision};

/// One page request against a search source.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub text: String,
    pub sort: SortDecision,
    pub from_date: NaiveDate,
    /// 1-indexed.
    pub page: u32,
    pub per_page: usize,
}

/// One page of results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub papers: Vec<PaperRecord>,
    pub has_more: bool,
}

/// Failure classification for a single source call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    /// Timeout, rate limit, 5xx, dropped connection. Worth retrying.
    #[error("transient source error: {0}")]
    Transient(String),
    /// Authentication failure or a response we cannot parse. Never retried.
    #[error("fatal source error: {0}")]
    Fatal(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

/// Common interface for paper search sources.
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Fetch one page of papers matching the request.
    async fn search(&self, request: &PageRequest) -> Result<SearchPage, SourceError>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}
