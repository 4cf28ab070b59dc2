//! LLM-backed relevance scoring.
//!
//! Asks the model how "borrowable" a paper's method is for the user's
//! research problem and parses its JSON verdict.

use std::sync::Arc;

use async_trait::async_trait;
use radar_common::error::{RadarError, Result};
use radar_ingestion::collaborators::PaperScorer;
use radar_ingestion::{PaperRecord, ResearchProfile, ScoredPaper};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::backend::{LlmBackend, LlmRequest, Message};

const SYSTEM_PROMPT: &str = r#"You are a methodological bridge-builder who evaluates whether techniques from one field can be "borrowed" for another.

Given a user's research profile and a paper from a potentially different field:
1. Extract the paper's core methodology.
2. Score "borrowability" from 0.0 to 1.0: how applicable is this method to the user's work?
3. Write the isomorphic connection as: "Even though this paper is about [DOMAIN X], it uses [METHOD Y] which directly addresses your constraint: [USER'S Z]."
4. Give practical adaptation advice.

Scoring rubric:
- 0.9-1.0: nearly plug-and-play; same math, different domain
- 0.7-0.9: moderate adaptation; strong structural similarity
- 0.5-0.7: interesting idea but needs significant rethinking
- below 0.5: tangential; reject

Confidence: HIGH (clear mathematical equivalence), MEDIUM (strong analogy), LOW (speculative).

Output MUST be a single JSON object:
{"borrowability_score": 0.85, "methodology_summary": "...", "isomorphic_connection": "...", "practical_application": "...", "confidence": "HIGH"}"#;

/// The JSON object the model is asked to produce.
#[derive(Debug, Deserialize)]
struct Assessment {
    borrowability_score: f64,
    #[serde(default)]
    methodology_summary: Option<String>,
    #[serde(default)]
    isomorphic_connection: Option<String>,
    #[serde(default)]
    practical_application: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
}

pub struct LlmScorer {
    backend: Arc<dyn LlmBackend>,
    temperature: f32,
    max_tokens: u32,
}

impl LlmScorer {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend, temperature: 0.5, max_tokens: 1024 }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl PaperScorer for LlmScorer {
    #[instrument(skip(self, paper, profile), fields(paper_id = %paper.id, model = self.backend.model_id()))]
    async fn assess(&self, paper: &PaperRecord, profile: &ResearchProfile) -> Result<ScoredPaper> {
        let req = LlmRequest {
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(user_prompt(paper, profile))],
            model: None,
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
        };
        let resp = self.backend.complete(req).await?;
        debug!(
            prompt_tokens = resp.prompt_tokens,
            completion_tokens = resp.completion_tokens,
            "Scoring response received"
        );

        let assessment = parse_assessment(&resp.content)?;
        Ok(ScoredPaper {
            paper: paper.clone(),
            score: clamp_score(assessment.borrowability_score),
            rationale: assessment.isomorphic_connection.unwrap_or_default(),
            methodology_summary: assessment.methodology_summary,
            practical_application: assessment.practical_application,
            confidence: assessment.confidence,
        })
    }
}

fn user_prompt(paper: &PaperRecord, profile: &ResearchProfile) -> String {
    format!(
        "Analyze this paper for borrowability.\n\n\
         USER'S PROFILE:\n\
         Core Task: {}\n\
         Mathematical Framework: {}\n\
         Pain Points: {}\n\n\
         PAPER TO ANALYZE:\n\
         Title: {}\n\
         Abstract: {}\n\
         Primary Field: {}\n\n\
         Evaluate as JSON:",
        profile.core_task,
        profile.mathematical_framework,
        profile.pain_points.join(", "),
        paper.title,
        paper.abstract_text.as_deref().unwrap_or("[no abstract available]"),
        paper.primary_field.as_deref().unwrap_or("Unknown"),
    )
}

/// Pull the JSON object out of a model reply, tolerating Markdown fences.
fn parse_assessment(content: &str) -> Result<Assessment> {
    let body = strip_code_fence(content.trim());
    serde_json::from_str(body)
        .map_err(|e| RadarError::Scoring(format!("unparseable model output: {e}")))
}

fn strip_code_fence(text: &str) -> &str {
    let inner = if let Some((_, rest)) = text.split_once("```json") {
        rest
    } else if let Some((_, rest)) = text.split_once("```") {
        rest
    } else {
        return text;
    };
    inner.split("```").next().unwrap_or(inner).trim()
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}
