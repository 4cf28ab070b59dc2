//! radar-ingestion — Search-and-dedup pipeline.
//! - Sort strategy selection per query type
//! - Paginated, throttled, retried search against OpenAlex
//! - Intra-run merge dedup by source id
//! - Persistent cross-run dedup by id and normalized title
//! - Scoring / delivery collaborator seams and the run orchestrator

pub mod models;
pub mod sort;
pub mod sources;
pub mod search;
pub mod dedup;
pub mod tracker;
pub mod collaborators;
pub mod pipeline;

pub use models::{PaperRecord, QueryType, ResearchProfile, ScoredPaper, SearchQuery, SortDecision};
pub use pipeline::{PipelineConfig, RadarPipeline, RunReport};
pub use search::{SearchConfig, SearchOutcome, SourceSearchStage};
pub use sort::{RandomSource, SortStrategySelector, StdRandom};
pub use tracker::DedupStore;
