use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::CometConfig;
use crate::error::{Result, SalinError};

/// One (source, prediction, reference) triple sent to the scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CometSegment {
    pub src: String,
    pub mt: String,
    #[serde(rename = "ref")]
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CometScore {
    pub mean_score: f64,
    pub scores: Vec<f64>,
}

/// Learned, source-aware segment scorer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QualityEstimator: Send + Sync {
    /// One score per segment, in input order
    async fn score_segments(&self, segments: &[CometSegment]) -> Result<Vec<f64>>;
}

#[derive(Debug, Serialize)]
struct CometRequest<'a> {
    model: &'a str,
    data: &'a [CometSegment],
}

#[derive(Debug, Deserialize)]
struct CometResponse {
    scores: Vec<f64>,
}

/// Client for a COMET scoring server
pub struct CometClient {
    client: Client,
    endpoint: String,
    model: String,
}

impl CometClient {
    pub fn new(config: &CometConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(SalinError::Http)?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl QualityEstimator for CometClient {
    async fn score_segments(&self, segments: &[CometSegment]) -> Result<Vec<f64>> {
        let url = format!("{}/score", self.endpoint);
        debug!("Scoring {} segments with {} at {}", segments.len(), self.model, url);

        let response = self
            .client
            .post(&url)
            .json(&CometRequest {
                model: &self.model,
                data: segments,
            })
            .send()
            .await
            .map_err(|e| SalinError::Scoring(format!("COMET request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SalinError::Scoring(format!(
                "COMET server error {}: {}",
                status, error_text
            )));
        }

        let parsed: CometResponse = response
            .json()
            .await
            .map_err(|e| SalinError::Scoring(format!("Failed to parse COMET response: {}", e)))?;
        Ok(parsed.scores)
    }
}

/// Score all segments in batches and average them
pub async fn comet_score(
    estimator: &dyn QualityEstimator,
    segments: &[CometSegment],
    batch_size: usize,
) -> Result<CometScore> {
    if segments.is_empty() {
        return Ok(CometScore {
            mean_score: 0.0,
            scores: Vec::new(),
        });
    }

    let mut scores = Vec::with_capacity(segments.len());
    for batch in segments.chunks(batch_size.max(1)) {
        let batch_scores = estimator.score_segments(batch).await?;
        if batch_scores.len() != batch.len() {
            return Err(SalinError::Scoring(format!(
                "COMET returned {} scores for {} segments",
                batch_scores.len(),
                batch.len()
            )));
        }
        scores.extend(batch_scores);
    }

    let mean_score = scores.iter().sum::<f64>() / scores.len() as f64;
    Ok(CometScore { mean_score, scores })
}
