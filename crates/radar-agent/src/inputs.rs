//! Run inputs produced upstream: the research profile and the query set.

use std::path::Path;

use anyhow::Context;
use radar_ingestion::{ResearchProfile, SearchQuery};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryFile {
    List(Vec<SearchQuery>),
    Wrapped { queries: Vec<SearchQuery> },
}

pub fn load_profile(path: &Path) -> anyhow::Result<ResearchProfile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading research profile {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing research profile {}", path.display()))
}

/// Accepts either a bare JSON array of queries or `{"queries": [...]}`.
pub fn load_queries(path: &Path) -> anyhow::Result<Vec<SearchQuery>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading queries {}", path.display()))?;
    let parsed: QueryFile =
        serde_json::from_str(&raw).with_context(|| format!("parsing queries {}", path.display()))?;
    let queries: Vec<SearchQuery> = match parsed {
        QueryFile::List(q) | QueryFile::Wrapped { queries: q } => q,
    }
    .into_iter()
    .filter(|q| !q.text.trim().is_empty())
    .collect();
    if queries.is_empty() {
        anyhow::bail!("no search queries in {}", path.display());
    }
    Ok(queries)
}
