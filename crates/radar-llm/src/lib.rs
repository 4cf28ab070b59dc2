//! radar-llm — LLM backend abstraction and the LLM-backed paper scorer.

pub mod backend;
pub mod scorer;

pub use backend::{build_backend, BackendKind, LlmBackend, LlmError};
pub use scorer::LlmScorer;
