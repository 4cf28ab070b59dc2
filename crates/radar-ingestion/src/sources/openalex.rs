//! OpenAlex works search client.
//!
//! API: https://api.openalex.org/works
//! Polite pool: send `mailto` and a User-Agent carrying the contact address.
//! Premium: optional bearer API key.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use radar_common::error::RadarError;
use radar_common::sandbox::SandboxClient as Client;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument, warn};

use crate::models::PaperRecord;
use super::{PageRequest, SearchPage, SearchSource, SourceError};

const OA_WORKS_URL: &str = "https://api.openalex.org/works";
const OA_MAX_PER_PAGE: usize = 200;
const MAX_AUTHORS: usize = 10;
const MAX_QUERY_TERMS: usize = 5;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to",
    "for", "of", "with", "by", "from", "as",
];

pub struct OpenAlexClient {
    client: Client,
    email: String,
    api_key: Option<SecretString>,
}

impl OpenAlexClient {
    pub fn new(
        email: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, RadarError> {
        let email = email.into();
        if email.trim().is_empty() {
            return Err(RadarError::Config("OpenAlex contact email is required".to_string()));
        }
        let user_agent = format!("AcademicRadar/1.0 (mailto:{email})");
        let client = Client::new(timeout, &user_agent)?;
        if api_key.is_some() {
            debug!("OpenAlex client using API key (premium pool)");
        } else {
            debug!("OpenAlex client using polite pool");
        }
        Ok(Self { client, email, api_key })
    }

    fn build_params(&self, request: &PageRequest) -> Vec<(&'static str, String)> {
        vec![
            ("search", simplify_query(&request.text)),
            ("per-page", request.per_page.clamp(1, OA_MAX_PER_PAGE).to_string()),
            ("page", request.page.to_string()),
            ("sort", request.sort.as_openalex().to_string()),
            (
                "filter",
                format!("from_publication_date:{},language:en", request.from_date.format("%Y-%m-%d")),
            ),
            ("mailto", self.email.clone()),
        ]
    }
}

#[async_trait]
impl SearchSource for OpenAlexClient {
    #[instrument(skip(self), fields(page = request.page, sort = %request.sort))]
    async fn search(&self, request: &PageRequest) -> Result<SearchPage, SourceError> {
        let mut builder = self
            .client
            .get(OA_WORKS_URL)
            .map_err(|e| SourceError::Fatal(e.to_string()))?
            .query(&self.build_params(request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let resp = builder.send().await.map_err(classify_transport)?;
        let status = resp.status();
        if let Some(remaining) = resp.headers().get("x-ratelimit-remaining") {
            debug!(remaining = ?remaining, "OpenAlex rate limit");
        }
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let body = resp.text().await.map_err(classify_transport)?;
        let json: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| SourceError::Fatal(format!("malformed OpenAlex response: {e}")))?;

        let page = parse_works_page(&json, request.page, request.per_page)?;
        debug!(n = page.papers.len(), has_more = page.has_more, "OpenAlex page");
        Ok(page)
    }

    fn name(&self) -> &str {
        "openalex"
    }
}

fn classify_transport(e: reqwest::Error) -> SourceError {
    if e.is_decode() {
        SourceError::Fatal(format!("undecodable OpenAlex response: {e}"))
    } else {
        SourceError::Transient(e.to_string())
    }
}

fn classify_status(status: StatusCode) -> SourceError {
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        SourceError::Transient(format!("OpenAlex HTTP {status}"))
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        SourceError::Fatal(format!("OpenAlex rejected credentials: HTTP {status}"))
    } else {
        SourceError::Fatal(format!("OpenAlex HTTP {status}"))
    }
}

/// Reduce a query to its first few key terms. OpenAlex ranks short,
/// focused queries better than long natural-language ones.
pub fn simplify_query(query: &str) -> String {
    let lowered = query.to_lowercase();
    let terms: Vec<&str> = lowered
        .split_whitespace()
        .filter(|w| !STOP_WORDS.contains(w) && w.chars().count() > 2)
        .take(MAX_QUERY_TERMS)
        .collect();
    if terms.is_empty() {
        query.trim().to_string()
    } else {
        terms.join(" ")
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────

fn parse_works_page(
    json: &serde_json::Value,
    page: u32,
    per_page: usize,
) -> Result<SearchPage, SourceError> {
    let results = json["results"]
        .as_array()
        .ok_or_else(|| SourceError::Fatal("OpenAlex response has no results array".to_string()))?;

    let papers: Vec<PaperRecord> = results
        .iter()
        .filter_map(|work| {
            let paper = work_to_paper(work);
            if paper.is_none() {
                warn!(work = ?work["id"], "Skipping OpenAlex work without id or title");
            }
            paper
        })
        .collect();

    let total = json["meta"]["count"].as_u64().unwrap_or(0);
    let fetched = page as u64 * per_page.clamp(1, OA_MAX_PER_PAGE) as u64;
    let has_more = !results.is_empty() && total > fetched;

    Ok(SearchPage { papers, has_more })
}

fn work_to_paper(work: &serde_json::Value) -> Option<PaperRecord> {
    let id = work["id"].as_str().filter(|s| !s.is_empty())?.to_string();
    let title = work["title"]
        .as_str()
        .or_else(|| work["display_name"].as_str())?
        .to_string();

    let authors: Vec<String> = work["authorships"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|a| a["author"]["display_name"].as_str())
                .take(MAX_AUTHORS)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let publication_date = work["publication_date"]
        .as_str()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

    let abstract_text = work["abstract"]
        .as_str()
        .filter(|a| !a.trim().is_empty())
        .map(String::from)
        .or_else(|| rebuild_inverted_abstract(&work["abstract_inverted_index"]));

    let doi = work["doi"].as_str().map(String::from);
    let url = match &doi {
        Some(d) if d.starts_with("http") => Some(d.clone()),
        Some(d) => Some(format!("https://doi.org/{d}")),
        None => Some(id.clone()),
    };

    Some(PaperRecord {
        id,
        title,
        publication_date,
        citation_count: work["cited_by_count"].as_u64().unwrap_or(0),
        doi,
        url,
        authors,
        abstract_text,
        primary_field: work["primary_topic"]["domain"]["display_name"]
            .as_str()
            .map(String::from),
    })
}

/// OpenAlex ships abstracts as `{word: [positions]}`; put the words back in order.
fn rebuild_inverted_abstract(index: &serde_json::Value) -> Option<String> {
    let map = index.as_object()?;
    let mut positioned: Vec<(u64, &str)> = map
        .iter()
        .flat_map(|(word, positions)| {
            positions
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|p| p.as_u64())
                .map(move |p| (p, word.as_str()))
        })
        .collect();
    if positioned.is_empty() {
        return None;
    }
    positioned.sort_by_key(|(pos, _)| *pos);
    Some(positioned.iter().map(|(_, w)| *w).collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SortDecision;

    #[test]
    fn test_work_to_paper_full() {
        let work = serde_json::json!({
            "id": "https://openalex.org/W2964118967",
            "title": "Attention Is All You Need",
            "doi": "https://doi.org/10.5555/3295222.3295349",
            "publication_date": "2017-06-12",
            "cited_by_count": 50000,
            "authorships": [
                { "author": { "display_name": "Ashish Vaswani" } },
                { "author": { "display_name": "Noam Shazeer" } }
            ],
            "abstract_inverted_index": { "Transformers": [0], "attend": [1], "everywhere": [2] },
            "primary_topic": { "domain": { "display_name": "Physical Sciences" } }
        });
        let p = work_to_paper(&work).unwrap();
        assert_eq!(p.id, "https://openalex.org/W2964118967");
        assert_eq!(p.publication_date, NaiveDate::from_ymd_opt(2017, 6, 12));
        assert_eq!(p.citation_count, 50000);
        assert_eq!(p.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert_eq!(p.abstract_text.as_deref(), Some("Transformers attend everywhere"));
        assert_eq!(p.url.as_deref(), Some("https://doi.org/10.5555/3295222.3295349"));
        assert_eq!(p.primary_field.as_deref(), Some("Physical Sciences"));
    }

    #[test]
    fn test_work_without_doi_links_to_openalex() {
        let work = serde_json::json!({ "id": "https://openalex.org/W1", "title": "Untitled work" });
        let p = work_to_paper(&work).unwrap();
        assert_eq!(p.url.as_deref(), Some("https://openalex.org/W1"));
        assert!(p.abstract_text.is_none());
    }

    #[test]
    fn test_bare_doi_is_prefixed() {
        let work = serde_json::json!({ "id": "https://openalex.org/W2", "title": "T", "doi": "10.1/abc" });
        assert_eq!(work_to_paper(&work).unwrap().url.as_deref(), Some("https://doi.org/10.1/abc"));
    }

    #[test]
    fn test_work_without_id_is_skipped() {
        assert!(work_to_paper(&serde_json::json!({ "title": "No id" })).is_none());
    }

    #[test]
    fn test_inverted_abstract_repeated_words() {
        let idx = serde_json::json!({ "the": [0, 3], "cat": [1], "saw": [2], "dog": [4] });
        assert_eq!(rebuild_inverted_abstract(&idx).as_deref(), Some("the cat saw the dog"));
    }

    #[test]
    fn test_parse_page_has_more() {
        let json = serde_json::json!({
            "meta": { "count": 45 },
            "results": [ { "id": "W1", "title": "A" }, { "id": "W2", "title": "B" } ]
        });
        let page = parse_works_page(&json, 1, 20).unwrap();
        assert_eq!(page.papers.len(), 2);
        assert!(page.has_more);

        let last = parse_works_page(&json, 3, 20).unwrap();
        assert!(!last.has_more);
    }

    #[test]
    fn test_parse_page_without_results_is_fatal() {
        let json = serde_json::json!({ "error": "bad filter" });
        assert!(matches!(parse_works_page(&json, 1, 20), Err(SourceError::Fatal(_))));
    }

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY).is_transient());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT).is_transient());
        assert!(!classify_status(StatusCode::UNAUTHORIZED).is_transient());
        assert!(!classify_status(StatusCode::FORBIDDEN).is_transient());
        assert!(!classify_status(StatusCode::BAD_REQUEST).is_transient());
    }

    #[test]
    fn test_simplify_query() {
        assert_eq!(
            simplify_query("The use of convex optimization for cache replacement in large systems"),
            "use convex optimization cache replacement"
        );
        assert_eq!(simplify_query("of an AI"), "of an AI");
    }

    #[test]
    fn test_build_params() {
        let client = OpenAlexClient::new("me@example.org", None, Duration::from_secs(5)).unwrap();
        let req = PageRequest {
            text: "graph neural networks traffic".to_string(),
            sort: SortDecision::Citations,
            from_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            page: 2,
            per_page: 500,
        };
        let params = client.build_params(&req);
        let get = |k: &str| params.iter().find(|(key, _)| *key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("per-page"), Some("200"));
        assert_eq!(get("page"), Some("2"));
        assert_eq!(get("sort"), Some("cited_by_count:desc"));
        assert_eq!(get("filter"), Some("from_publication_date:2024-01-31,language:en"));
        assert_eq!(get("mailto"), Some("me@example.org"));
    }

    #[test]
    fn test_empty_email_rejected() {
        assert!(OpenAlexClient::new("  ", None, Duration::from_secs(5)).is_err());
    }
}
