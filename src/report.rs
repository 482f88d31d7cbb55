use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::scoring::ScoreReport;

/// Scores produced for one provider
#[derive(Debug, Clone)]
pub struct ProviderScores {
    pub label: String,
    pub report: ScoreReport,
}

/// Where a report ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportDestination {
    Stdout,
    File(PathBuf),
}

pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Print a single provider's scores, or append a comparison of several to the report file
    pub async fn write(&self, results: &[ProviderScores]) -> Result<ReportDestination> {
        let run_id = Uuid::new_v4();
        let content = render(results, run_id, Utc::now())?;

        if results.len() <= 1 {
            println!("{}", content);
            return Ok(ReportDestination::Stdout);
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        info!(
            "Appended scores for {} providers to {} (run {})",
            results.len(),
            self.path.display(),
            run_id
        );
        Ok(ReportDestination::File(self.path.clone()))
    }
}

/// Render one labelled section per provider
pub fn render(results: &[ProviderScores], run_id: Uuid, at: DateTime<Utc>) -> Result<String> {
    let mut content = String::new();
    for result in results {
        content.push_str(&format!("==================== {} ====================\n", result.label));
        content.push_str(&format!("Run: {}  Time: {}\n", run_id, at.to_rfc3339()));
        content.push_str(&format!("BLEU: {:.2}\n", result.report.bleu.score));
        match &result.report.comet {
            Some(comet) => content.push_str(&format!("COMET: {:.4}\n", comet.mean_score)),
            None => content.push_str("COMET: n/a\n"),
        }
        content.push_str(&serde_json::to_string_pretty(&result.report)?);
        content.push_str("\n\n");
    }
    Ok(content)
}
