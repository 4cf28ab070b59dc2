//! Configuration loading for Academic Radar.
//! Reads radar.toml from the current directory, the path in RADAR_CONFIG, or
//! the path given on the command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use radar_ingestion::{PipelineConfig, SearchConfig};
use radar_llm::BackendKind;
use secrecy::SecretString;
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "radar.toml";
/// Upper bound for day counts; keeps chrono date arithmetic in range.
const MAX_DAYS: i64 = 36_500;

#[derive(Debug, Default, Deserialize)]
pub struct RadarConfig {
    #[serde(default)]
    pub openalex: OpenAlexConfig,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub inputs: InputsConfig,
}

#[derive(Debug, Deserialize)]
pub struct OpenAlexConfig {
    /// Contact address for the polite pool. Falls back to OPENALEX_EMAIL.
    pub email: Option<String>,
    /// Falls back to OPENALEX_API_KEY.
    pub api_key: Option<SecretString>,
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_rate_limit_delay_ms()  -> u64 { 3_000 }
fn default_request_timeout_secs() -> u64 { 30 }
fn default_max_attempts()         -> u32 { 3 }
fn default_retry_base_delay_ms()  -> u64 { 4_000 }
fn default_retry_max_delay_ms()   -> u64 { 10_000 }

impl Default for OpenAlexConfig {
    fn default() -> Self {
        Self {
            email: None,
            api_key: None,
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    #[serde(default = "default_search_days_back")]
    pub search_days_back: i64,
    #[serde(default = "default_max_results_per_query")]
    pub max_results_per_query: usize,
    #[serde(default = "default_max_pages_per_query")]
    pub max_pages_per_query: u32,
}

fn default_search_days_back()      -> i64   { 7 }
fn default_max_results_per_query() -> usize { 20 }
fn default_max_pages_per_query()   -> u32   { 5 }

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            search_days_back: default_search_days_back(),
            max_results_per_query: default_max_results_per_query(),
            max_pages_per_query: default_max_pages_per_query(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_cache_file()     -> PathBuf { PathBuf::from("./cache/sent_papers.json") }
fn default_retention_days() -> i64     { 365 }

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { cache_file: default_cache_file(), retention_days: default_retention_days() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_min_relevance_score")]
    pub min_relevance_score: f64,
    #[serde(default = "default_max_papers_to_analyze")]
    pub max_papers_to_analyze: usize,
}

fn default_min_relevance_score()   -> f64   { 0.5 }
fn default_max_papers_to_analyze() -> usize { 5 }

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_relevance_score: default_min_relevance_score(),
            max_papers_to_analyze: default_max_papers_to_analyze(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_backend")]
    pub backend: BackendKind,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Falls back to RADAR_LLM_API_KEY.
    pub api_key: Option<SecretString>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_backend()      -> BackendKind { BackendKind::Ollama }
fn default_llm_base_url()     -> String { "http://localhost:11434".to_string() }
fn default_llm_model()        -> String { "llama3:8b".to_string() }
fn default_llm_timeout_secs() -> u64    { 120 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: default_llm_backend(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_outbox_dir")]
    pub outbox_dir: PathBuf,
}

fn default_outbox_dir() -> PathBuf { PathBuf::from("./outbox") }

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self { outbox_dir: default_outbox_dir() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputsConfig {
    #[serde(default = "default_profile_path")]
    pub profile_path: PathBuf,
    #[serde(default = "default_queries_path")]
    pub queries_path: PathBuf,
}

fn default_profile_path() -> PathBuf { PathBuf::from("./cache/profile.json") }
fn default_queries_path() -> PathBuf { PathBuf::from("./cache/queries.json") }

impl Default for InputsConfig {
    fn default() -> Self {
        Self { profile_path: default_profile_path(), queries_path: default_queries_path() }
    }
}


impl RadarConfig {
    /// Load configuration.
    /// An explicit path (argument, then RADAR_CONFIG) must exist. Without one,
    /// radar.toml is read if present and defaults are used otherwise.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("RADAR_CONFIG").ok().map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!(
                        "Config file not found: {}\n\
                         Copy radar.example.toml to radar.toml and edit it.",
                        path.display()
                    );
                }
                Self::from_file(&path)?
            }
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => {
                tracing::info!("No {DEFAULT_CONFIG_PATH} found, using defaults");
                Self::default()
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Fill unset values from the environment. Values in the file win.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if self.openalex.email.is_none() {
            self.openalex.email = non_empty("OPENALEX_EMAIL");
        }
        if self.openalex.api_key.is_none() {
            self.openalex.api_key = non_empty("OPENALEX_API_KEY").map(SecretString::from);
        }
        if self.llm.api_key.is_none() {
            self.llm.api_key = non_empty("RADAR_LLM_API_KEY").map(SecretString::from);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.scoring.min_relevance_score) {
            anyhow::bail!("scoring.min_relevance_score must be within [0, 1]");
        }
        if self.search.max_results_per_query == 0 {
            anyhow::bail!("search.max_results_per_query must be greater than 0");
        }
        if !(0..=MAX_DAYS).contains(&self.search.search_days_back) {
            anyhow::bail!("search.search_days_back must be within [0, {MAX_DAYS}]");
        }
        if !(1..=MAX_DAYS).contains(&self.tracker.retention_days) {
            anyhow::bail!("tracker.retention_days must be within [1, {MAX_DAYS}]");
        }
        self.search_config().validate()?;
        Ok(())
    }

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            min_request_interval: Duration::from_millis(self.openalex.rate_limit_delay_ms),
            request_timeout: Duration::from_secs(self.openalex.request_timeout_secs),
            max_attempts: self.openalex.max_attempts,
            retry_base_delay: Duration::from_millis(self.openalex.retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(self.openalex.retry_max_delay_ms),
            max_pages_per_query: self.search.max_pages_per_query,
        }
    }

    pub fn pipeline_config(&self, skip_delivery: bool) -> PipelineConfig {
        PipelineConfig {
            search_days_back: self.search.search_days_back,
            max_results_per_query: self.search.max_results_per_query,
            min_relevance_score: self.scoring.min_relevance_score,
            max_papers_to_analyze: self.scoring.max_papers_to_analyze,
            skip_delivery,
        }
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.tracker.retention_days)
    }
}
