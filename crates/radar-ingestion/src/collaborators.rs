//! Seams to the downstream collaborators: the relevance scorer and the
//! report delivery channel. Concrete implementations live in `radar-llm`
//! and the `radar` binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use radar_common::error::Result;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{PaperRecord, ResearchProfile, ScoredPaper};

/// Scores one candidate against the user's research profile.
#[async_trait]
pub trait PaperScorer: Send + Sync {
    async fn assess(&self, paper: &PaperRecord, profile: &ResearchProfile) -> Result<ScoredPaper>;
}

/// Delivers the final report. `Ok` means delivery is confirmed.
#[async_trait]
pub trait ReportDelivery: Send + Sync {
    async fn deliver(&self, report: &RadarReport) -> Result<DeliveryReceipt>;
}

/// What gets delivered: the accepted papers, best first.
#[derive(Debug, Clone, Serialize)]
pub struct RadarReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub papers: Vec<ScoredPaper>,
}

impl RadarReport {
    pub fn subject(&self) -> String {
        format!(
            "Academic Radar: {} Isomorphic Discoveries This Week",
            self.papers.len()
        )
    }

    /// Plain-text rendering for notification channels.
    pub fn plain_text(&self) -> String {
        let mut out = vec![
            format!("Academic Radar Report - {}", self.generated_at.format("%B %d, %Y")),
            format!("Found {} isomorphic discoveries\n", self.papers.len()),
            "=".repeat(60),
        ];
        for (i, scored) in self.papers.iter().enumerate() {
            let p = &scored.paper;
            out.push(format!("\n{}. {}", i + 1, p.title));
            out.push(format!(
                "   Field: {} | Score: {:.2}",
                p.primary_field.as_deref().unwrap_or("Unknown"),
                scored.score
            ));
            out.push(format!("\n   {}", scored.rationale));
            if let Some(app) = &scored.practical_application {
                out.push(format!("\n   How to apply: {app}"));
            }
            out.push(format!("   Read: {}\n", p.url.as_deref().unwrap_or(&p.id)));
        }
        out.join("\n")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReceipt {
    pub delivered_at: DateTime<Utc>,
    /// Channel-specific reference, e.g. the outbox file path.
    pub reference: String,
}
