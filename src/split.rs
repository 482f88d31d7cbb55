use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{DataConfig, check_fraction};
use crate::corpus::{BilingualPair, Corpus};
use crate::error::{Result, SalinError};

const ARTIFACT_FORMAT: u32 = 1;
const ARTIFACT_SUFFIX: &str = ".split.json";

/// Train/valid/test partition of a cleaned corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitDataset {
    pub train: Corpus,
    pub valid: Corpus,
    pub test: Corpus,
}

impl SplitDataset {
    pub fn total(&self) -> usize {
        self.train.len() + self.valid.len() + self.test.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    /// Single: all three subsets come from one corpus
    Single,
    /// Dual: train/valid from one corpus, test sampled from a separate one
    Dual,
}

/// On-disk form of a saved split
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SplitArtifact {
    format: u32,
    version: String,
    created_at: DateTime<Utc>,
    mode: SplitMode,
    dataset: SplitDataset,
}

#[derive(Debug, Clone)]
pub struct SplitSummary {
    pub version: String,
    pub path: PathBuf,
    pub mode: SplitMode,
    pub created_at: DateTime<Utc>,
    pub train: usize,
    pub valid: usize,
    pub test: usize,
}

pub struct SplitBuilder {
    held_out_fraction: f64,
    valid_share: f64,
    test_sample_fraction: f64,
}

impl SplitBuilder {
    pub fn new(config: &DataConfig) -> Self {
        Self {
            held_out_fraction: config.held_out_fraction,
            valid_share: config.valid_share,
            test_sample_fraction: config.test_sample_fraction,
        }
    }

    /// Override the held-out fraction, rejecting values outside of [0, 1]
    pub fn with_held_out_fraction(mut self, fraction: f64) -> Result<Self> {
        check_fraction("held-out fraction", fraction)?;
        self.held_out_fraction = fraction;
        Ok(self)
    }

    /// Partition one corpus into train, then split the held-out part into valid and test
    pub fn build_single<R: Rng + ?Sized>(&self, corpus: Corpus, rng: &mut R) -> SplitDataset {
        let total = corpus.len();
        let (train, held_out) = shuffle_split(corpus.pairs, self.held_out_fraction, rng);
        let (valid, test) = shuffle_split(held_out, 1.0 - self.valid_share, rng);

        info!(
            "Built single-corpus split from {} pairs: train={}, valid={}, test={}",
            total,
            train.len(),
            valid.len(),
            test.len()
        );

        SplitDataset {
            train: Corpus { pairs: train },
            valid: Corpus { pairs: valid },
            test: Corpus { pairs: test },
        }
    }

    /// Partition the training corpus into train/valid and downsample a separate test corpus
    pub fn build_dual<R: Rng + ?Sized>(
        &self,
        train_corpus: Corpus,
        test_corpus: Corpus,
        rng: &mut R,
    ) -> SplitDataset {
        let test_total = test_corpus.len();
        let (train, valid) = shuffle_split(train_corpus.pairs, self.held_out_fraction, rng);
        let (_, test) = shuffle_split(test_corpus.pairs, self.test_sample_fraction, rng);

        info!(
            "Built dual-corpus split: train={}, valid={}, test={} (sampled from {})",
            train.len(),
            valid.len(),
            test.len(),
            test_total
        );

        SplitDataset {
            train: Corpus { pairs: train },
            valid: Corpus { pairs: valid },
            test: Corpus { pairs: test },
        }
    }
}

/// Number of items taken by `fraction`, rounded up like the dataset library's test_size
pub fn fraction_count(total: usize, fraction: f64) -> usize {
    let count = ((total as f64) * fraction - 1e-9).ceil().max(0.0) as usize;
    count.min(total)
}

/// Shuffle and cut off the last `fraction` of the items
fn shuffle_split<R: Rng + ?Sized>(
    mut items: Vec<BilingualPair>,
    fraction: f64,
    rng: &mut R,
) -> (Vec<BilingualPair>, Vec<BilingualPair>) {
    items.shuffle(rng);
    let split_at = items.len() - fraction_count(items.len(), fraction);
    let rest = items.split_off(split_at);
    debug!("Split {} items into {} / {}", items.len() + rest.len(), items.len(), rest.len());
    (items, rest)
}

/// Saves and reloads versioned splits.
pub struct SplitStore {
    dir: PathBuf,
}

impl SplitStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, version: &str) -> PathBuf {
        self.dir.join(format!("{}{}", version, ARTIFACT_SUFFIX))
    }

    pub async fn save(&self, version: &str, mode: SplitMode, dataset: &SplitDataset) -> Result<PathBuf> {
        validate_version(version)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(version);
        if path.exists() {
            warn!("Overwriting existing split {}", path.display());
        }

        let artifact = SplitArtifact {
            format: ARTIFACT_FORMAT,
            version: version.to_string(),
            created_at: Utc::now(),
            mode,
            dataset: dataset.clone(),
        };
        let content = serde_json::to_string(&artifact)?;
        tokio::fs::write(&path, content).await?;

        info!("Saved split '{}' ({} pairs) to {}", version, dataset.total(), path.display());
        Ok(path)
    }

    pub async fn load(&self, version: &str) -> Result<SplitDataset> {
        validate_version(version)?;
        let path = self.path_for(version);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SalinError::MissingArtifact(format!(
                    "split '{}' was never saved ({})",
                    version,
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let artifact: SplitArtifact = serde_json::from_str(&content)?;
        if artifact.format != ARTIFACT_FORMAT {
            return Err(SalinError::Config(format!(
                "Unsupported split format {} in {}",
                artifact.format,
                path.display()
            )));
        }

        info!(
            "Loaded split '{}': train={}, valid={}, test={}",
            version,
            artifact.dataset.train.len(),
            artifact.dataset.valid.len(),
            artifact.dataset.test.len()
        );
        Ok(artifact.dataset)
    }

    /// List saved splits, newest first
    pub fn list(&self) -> Result<Vec<SplitSummary>> {
        let mut summaries = Vec::new();
        if !self.dir.is_dir() {
            return Ok(summaries);
        }

        for entry in WalkDir::new(&self.dir).max_depth(1).into_iter().filter_map(|e| e.ok()) {
            let file_name = entry.file_name().to_string_lossy();
            if !entry.file_type().is_file() || !file_name.ends_with(ARTIFACT_SUFFIX) {
                continue;
            }
            let content = match std::fs::read_to_string(entry.path()) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Skipping unreadable split {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            match serde_json::from_str::<SplitArtifact>(&content) {
                Ok(artifact) => summaries.push(SplitSummary {
                    version: artifact.version,
                    path: entry.path().to_path_buf(),
                    mode: artifact.mode,
                    created_at: artifact.created_at,
                    train: artifact.dataset.train.len(),
                    valid: artifact.dataset.valid.len(),
                    test: artifact.dataset.test.len(),
                }),
                Err(e) => warn!("Skipping malformed split {}: {}", entry.path().display(), e),
            }
        }

        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }
}

fn validate_version(version: &str) -> Result<()> {
    if version.trim().is_empty() || version.contains(['/', '\\']) || version == ".." {
        return Err(SalinError::Config(format!("Invalid version name '{}'", version)));
    }
    Ok(())
}
