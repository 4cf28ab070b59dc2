//! Data models for the search-and-dedup pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A search query produced upstream (by the query abstractor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(alias = "query_string")]
    pub text: String,
    pub query_type: QueryType,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, query_type: QueryType) -> Self {
        Self { text: text.into(), query_type }
    }
}

/// Semantic class of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Same-domain query phrased in the user's own vocabulary.
    Direct,
    /// Domain-agnostic rephrasing of the user's mathematical structure.
    Abstracted,
    /// Phrased around the user's pain points rather than their field.
    SolutionSeeking,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Direct          => "direct",
            QueryType::Abstracted      => "abstracted",
            QueryType::SolutionSeeking => "solution_seeking",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ranking mode requested from the search source. Fixed per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDecision {
    Relevance,
    Citations,
    Recency,
}

impl SortDecision {
    /// OpenAlex `sort` parameter value.
    pub fn as_openalex(&self) -> &'static str {
        match self {
            SortDecision::Relevance => "relevance_score:desc",
            SortDecision::Citations => "cited_by_count:desc",
            SortDecision::Recency   => "publication_date:desc",
        }
    }
}

impl std::fmt::Display for SortDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_openalex())
    }
}

/// A paper returned by the search source. Transient: lives for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Opaque source identifier, e.g. `https://openalex.org/W2964118967`.
    pub id: String,
    pub title: String,
    pub publication_date: Option<NaiveDate>,
    pub citation_count: u64,
    pub doi: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
    pub primary_field: Option<String>,
}

impl PaperRecord {
    /// Minimal record; descriptive fields are left empty.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            publication_date: None,
            citation_count: 0,
            doi: None,
            url: None,
            authors: Vec::new(),
            abstract_text: None,
            primary_field: None,
        }
    }

    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = Some(text.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.primary_field = Some(field.into());
        self
    }

    /// Abstract length in characters, 0 when missing.
    pub fn abstract_len(&self) -> usize {
        self.abstract_text.as_deref().map(|a| a.chars().count()).unwrap_or(0)
    }
}

/// The user's research profile, produced offline from their own papers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchProfile {
    pub core_task: String,
    pub mathematical_framework: String,
    #[serde(default)]
    pub pain_points: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Outcome of the scoring collaborator for one paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPaper {
    pub paper: PaperRecord,
    /// Borrowability score in [0, 1].
    pub score: f64,
    /// Why the paper's technique maps onto the user's problem.
    pub rationale: String,
    pub methodology_summary: Option<String>,
    pub practical_application: Option<String>,
    pub confidence: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_accepts_query_string_alias() {
        let q: SearchQuery = serde_json::from_str(
            r#"{"query_string": "sparse tensor compression", "query_type": "solution_seeking"}"#,
        )
        .unwrap();
        assert_eq!(q.text, "sparse tensor compression");
        assert_eq!(q.query_type, QueryType::SolutionSeeking);
    }

    #[test]
    fn test_sort_decision_wire_values() {
        assert_eq!(SortDecision::Relevance.as_openalex(), "relevance_score:desc");
        assert_eq!(SortDecision::Citations.as_openalex(), "cited_by_count:desc");
        assert_eq!(SortDecision::Recency.as_openalex(), "publication_date:desc");
    }

    #[test]
    fn test_abstract_len_counts_chars() {
        let p = PaperRecord::new("W1", "t").with_abstract("héllo");
        assert_eq!(p.abstract_len(), 5);
        assert_eq!(PaperRecord::new("W2", "t").abstract_len(), 0);
    }
}
