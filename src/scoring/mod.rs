// Corpus-level translation quality metrics
//
// - bleu: n-gram overlap against the references, computed in-process
// - comet: learned quality estimate from a COMET scoring server

pub mod bleu;
pub mod comet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use bleu::{Bleu, BleuScore};
pub use comet::{CometClient, CometScore, CometSegment, QualityEstimator};

use crate::config::ScoringConfig;
use crate::error::{Result, SalinError};

/// Metric name to computed value for one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub bleu: BleuScore,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comet: Option<CometScore>,
}

pub struct Scorer {
    bleu: Bleu,
    comet: Option<Box<dyn QualityEstimator>>,
    comet_batch_size: usize,
}

impl Scorer {
    pub fn new(bleu: Bleu, comet: Option<Box<dyn QualityEstimator>>, comet_batch_size: usize) -> Self {
        Self {
            bleu,
            comet,
            comet_batch_size,
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Result<Self> {
        let comet: Option<Box<dyn QualityEstimator>> = if config.comet.enabled {
            Some(Box::new(CometClient::new(&config.comet)?))
        } else {
            None
        };
        Ok(Self::new(Bleu::from_config(config), comet, config.comet.batch_size))
    }

    /// Score predictions against references; COMET also needs the sources
    pub async fn score(
        &self,
        predictions: &[String],
        references: &[String],
        sources: Option<&[String]>,
    ) -> Result<ScoreReport> {
        let source_count = sources.map_or(references.len(), |s| s.len());
        if predictions.len() != references.len() || references.len() != source_count {
            return Err(SalinError::LengthMismatch {
                predictions: predictions.len(),
                references: references.len(),
                sources: source_count,
            });
        }

        info!("Scoring {} predictions", predictions.len());
        let bleu = self.bleu.corpus_score(predictions, references);
        info!("BLEU: {:.2}", bleu.score);

        let comet = match (&self.comet, sources) {
            (Some(estimator), Some(sources)) => {
                let segments: Vec<CometSegment> = sources
                    .iter()
                    .zip(predictions)
                    .zip(references)
                    .map(|((src, mt), reference)| CometSegment {
                        src: src.clone(),
                        mt: mt.clone(),
                        reference: reference.clone(),
                    })
                    .collect();
                let score = comet::comet_score(estimator.as_ref(), &segments, self.comet_batch_size).await?;
                info!("COMET: {:.4}", score.mean_score);
                Some(score)
            }
            (Some(_), None) => {
                warn!("COMET needs source sentences; skipping");
                None
            }
            (None, _) => None,
        };

        Ok(ScoreReport { bleu, comet })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BleuTokenizer;
    use comet::MockQualityEstimator;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn bleu_only() -> Scorer {
        Scorer::new(Bleu::new(BleuTokenizer::Mteval13a, false, true), None, 32)
    }

    #[tokio::test]
    async fn test_perfect_predictions_score_100() {
        let mut estimator = MockQualityEstimator::new();
        estimator
            .expect_score_segments()
            .times(1)
            .returning(|batch| Ok(vec![0.95; batch.len()]));
        let scorer = Scorer::new(
            Bleu::new(BleuTokenizer::Mteval13a, false, true),
            Some(Box::new(estimator)),
            32,
        );

        let predictions = strings(&["I ate.", "I ate."]);
        let references = strings(&["I ate.", "I ate."]);
        let sources = strings(&["Kumain ako.", "Kumain ako."]);
        let report = scorer
            .score(&predictions, &references, Some(sources.as_slice()))
            .await
            .unwrap();

        assert!((report.bleu.score - 100.0).abs() < 1e-9);
        assert_eq!(report.comet.unwrap().scores, vec![0.95, 0.95]);
    }

    #[tokio::test]
    async fn test_length_mismatch_is_fatal() {
        let predictions = strings(&["I ate."]);
        let references = strings(&["I ate.", "Thanks."]);
        let sources = strings(&["Kumain ako.", "Salamat."]);

        let result = bleu_only().score(&predictions, &references, Some(sources.as_slice())).await;

        assert!(matches!(
            result,
            Err(SalinError::LengthMismatch { predictions: 1, references: 2, sources: 2 })
        ));
    }

    #[tokio::test]
    async fn test_source_length_mismatch_is_fatal() {
        let predictions = strings(&["I ate."]);
        let references = strings(&["I ate."]);
        let sources = strings(&[]);

        let result = bleu_only().score(&predictions, &references, Some(sources.as_slice())).await;

        assert!(matches!(result, Err(SalinError::LengthMismatch { .. })));
    }

    #[tokio::test]
    async fn test_empty_test_set_gives_degenerate_report() {
        let report = bleu_only().score(&[], &[], Some(&[][..])).await.unwrap();

        assert_eq!(report.bleu.score, 0.0);
        assert!(report.comet.is_none());
    }

    #[tokio::test]
    async fn test_repeated_scoring_is_idempotent() {
        let scorer = bleu_only();
        let predictions = strings(&["I ate rice.", "Thank you very much."]);
        let references = strings(&["I ate some rice.", "Thank you so much."]);

        let first = scorer.score(&predictions, &references, None).await.unwrap();
        let second = scorer.score(&predictions, &references, None).await.unwrap();

        assert_eq!(first.bleu.score, second.bleu.score);
    }
}
