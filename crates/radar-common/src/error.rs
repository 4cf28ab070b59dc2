use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RadarError {
    /// The search source rejected us or answered with something unparseable.
    /// Aborts the whole run.
    #[error("Search source failed fatally: {0}")]
    SourceFatal(String),

    /// Retries for one query ran out. Other queries in the run still proceed.
    #[error("Search unavailable for query '{query}' after {attempts} attempt(s): {last_error}")]
    SearchUnavailable {
        query: String,
        attempts: u32,
        last_error: String,
    },

    /// A dedup snapshot exists but cannot be read. Never fall back to an empty store.
    #[error("Dedup snapshot at {} is corrupt: {reason}", path.display())]
    StoreCorrupt { path: PathBuf, reason: String },

    #[error("Dedup store error: {0}")]
    Store(String),

    #[error("Scoring error: {0}")]
    Scoring(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Security policy violation: {0}")]
    Security(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RadarError {
    /// Errors that stop the run before anything is delivered or marked.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RadarError::SearchUnavailable { .. } | RadarError::Scoring(_))
    }
}

pub type Result<T> = std::result::Result<T, RadarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_unavailable_display() {
        let err = RadarError::SearchUnavailable {
            query: "sparse matrix".to_string(),
            attempts: 3,
            last_error: "HTTP 429".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Search unavailable for query 'sparse matrix' after 3 attempt(s): HTTP 429"
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_store_corrupt_is_fatal() {
        let err = RadarError::StoreCorrupt {
            path: PathBuf::from("cache/sent_papers.json"),
            reason: "expected value at line 1".to_string(),
        };
        assert!(err.to_string().contains("cache/sent_papers.json"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RadarError>();
    }
}
