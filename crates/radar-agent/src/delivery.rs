//! Outbox delivery: the report lands as a JSON file plus a plain-text
//! rendering in a directory another process (mailer, sync job) picks up.
//!
//! The JSON file is renamed into place last. Its presence is the delivery
//! confirmation; a crash before that leaves at most a stray `.txt`.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use radar_common::error::{RadarError, Result};
use radar_ingestion::collaborators::{DeliveryReceipt, RadarReport, ReportDelivery};
use tracing::info;

pub struct OutboxDelivery {
    dir: PathBuf,
}

impl OutboxDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn stem(report: &RadarReport) -> String {
        let short_id: String = report.run_id.simple().to_string().chars().take(8).collect();
        format!("radar-{}-{short_id}", report.generated_at.format("%Y%m%d-%H%M%S"))
    }
}

#[async_trait]
impl ReportDelivery for OutboxDelivery {
    async fn deliver(&self, report: &RadarReport) -> Result<DeliveryReceipt> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            RadarError::Delivery(format!("cannot create outbox {}: {e}", self.dir.display()))
        })?;

        let stem = Self::stem(report);
        let text_path = self.dir.join(format!("{stem}.txt"));
        let json_path = self.dir.join(format!("{stem}.json"));

        let body = format!("Subject: {}\n\n{}\n", report.subject(), report.plain_text());
        write_atomic(&text_path, body.as_bytes())?;
        let json = serde_json::to_vec_pretty(report)?;
        write_atomic(&json_path, &json)?;

        info!(path = %json_path.display(), papers = report.papers.len(), "Report written to outbox");
        Ok(DeliveryReceipt {
            delivered_at: Utc::now(),
            reference: json_path.display().to_string(),
        })
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let write = || -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    };
    write().map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        RadarError::Delivery(format!("writing {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_ingestion::{PaperRecord, ScoredPaper};
    use uuid::Uuid;

    fn report() -> RadarReport {
        RadarReport {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            papers: vec![ScoredPaper {
                paper: PaperRecord::new("https://openalex.org/W1", "Tensor Sketches"),
                score: 0.8,
                rationale: "Same structure.".to_string(),
                methodology_summary: None,
                practical_application: None,
                confidence: Some("HIGH".to_string()),
            }],
        }
    }

    #[tokio::test]
    async fn test_deliver_writes_json_and_text() {
        let dir = tempfile::TempDir::new().unwrap();
        let outbox = OutboxDelivery::new(dir.path().join("outbox"));
        let receipt = outbox.deliver(&report()).await.unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&receipt.reference).unwrap()).unwrap();
        assert_eq!(json["papers"][0]["paper"]["id"], "https://openalex.org/W1");

        let names: Vec<String> = std::fs::read_dir(dir.path().join("outbox"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().any(|n| n.ends_with(".txt")));
        assert!(!names.iter().any(|n| n.ends_with(".tmp")));
    }

    #[tokio::test]
    async fn test_unwritable_outbox_is_delivery_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let outbox = OutboxDelivery::new(&blocker);
        let err = outbox.deliver(&report()).await.unwrap_err();
        assert!(matches!(err, RadarError::Delivery(_)));
    }
}
