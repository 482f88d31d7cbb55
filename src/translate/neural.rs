use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::NeuralConfig;
use crate::corpus::Corpus;
use crate::error::{Result, SalinError};
use crate::split::SplitDataset;
use super::Translator;

const FINETUNED_PREFIX: &str = "finetuned_";
const FINETUNE_METADATA: &str = "salin-finetune.json";

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    text: &'a str,
    src_lang: &'a str,
    tgt_lang: &'a str,
    max_length: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    /// Decoded candidates, best first
    translations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct ExamplePair<'a> {
    source: &'a str,
    target: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct Hyperparameters {
    learning_rate: f64,
    per_device_train_batch_size: usize,
    per_device_eval_batch_size: usize,
    weight_decay: f64,
    num_train_epochs: u32,
    save_total_limit: u32,
    evaluation_strategy: &'static str,
    predict_with_generate: bool,
}

#[derive(Debug, Clone, Serialize)]
struct FinetuneRequest<'a> {
    model: &'a str,
    src_lang: &'a str,
    tgt_lang: &'a str,
    prefix: &'a str,
    max_length: usize,
    hyperparameters: Hyperparameters,
    train: Vec<ExamplePair<'a>>,
    valid: Vec<ExamplePair<'a>>,
    output_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinetuneOutcome {
    pub output_dir: String,
    #[serde(default)]
    pub train_loss: Option<f64>,
    #[serde(default)]
    pub eval_loss: Option<f64>,
}

/// Written next to the fine-tuned weights for later inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FinetuneMetadata {
    version: String,
    base_model: String,
    trained_at: DateTime<Utc>,
    train_pairs: usize,
    valid_pairs: usize,
    outcome: FinetuneOutcome,
}

/// Sequence-to-sequence translator backed by an inference server.
pub struct NeuralTranslator {
    client: Client,
    config: NeuralConfig,
    /// Checkpoint name or fine-tuned model directory handed to the server
    model: String,
    label: String,
}

impl NeuralTranslator {
    /// Translator over the pretrained base checkpoint
    pub fn pretrained(config: NeuralConfig) -> Result<Self> {
        let model = config.base_model.clone();
        Self::with_model(config, model, "nllb".to_string())
    }

    /// Translator over a model previously saved by `finetune`
    pub fn finetuned(config: NeuralConfig, artifact_dir: &Path, version: &str) -> Result<Self> {
        let model_dir = Self::finetuned_dir(artifact_dir, version);
        if !model_dir.is_dir() {
            return Err(SalinError::MissingArtifact(format!(
                "fine-tuned model '{}' was never saved ({})",
                version,
                model_dir.display()
            )));
        }
        let model = std::path::absolute(&model_dir)?.display().to_string();
        Self::with_model(config, model, format!("finetuned_{}", version))
    }

    fn with_model(config: NeuralConfig, model: String, label: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent("salin/0.1.0")
            .build()
            .map_err(SalinError::Http)?;

        Ok(Self {
            client,
            config,
            model,
            label,
        })
    }

    pub fn finetuned_dir(artifact_dir: &Path, version: &str) -> PathBuf {
        artifact_dir.join(format!("{}{}", FINETUNED_PREFIX, version))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check that the inference server is up
    pub async fn check_availability(&self) -> Result<()> {
        let url = format!("{}/health", self.config.endpoint);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| SalinError::Translation(format!("Failed to connect to inference server: {}", e)))?;

        if response.status().is_success() {
            info!("Inference server at {} is available", self.config.endpoint);
            Ok(())
        } else {
            Err(SalinError::Translation(format!(
                "Inference server at {} answered {}",
                self.config.endpoint,
                response.status()
            )))
        }
    }

    /// Fine-tune the base model on the train/valid subsets and save it as `finetuned_<version>/`
    pub async fn finetune(
        &self,
        dataset: &SplitDataset,
        artifact_dir: &Path,
        version: &str,
    ) -> Result<PathBuf> {
        let output_dir = Self::finetuned_dir(artifact_dir, version);
        tokio::fs::create_dir_all(&output_dir).await?;
        let output_abs = std::path::absolute(&output_dir)?;

        let request = self.build_finetune_request(dataset, output_abs.display().to_string());
        let url = format!("{}/finetune", self.config.endpoint);

        info!(
            "START TRAINING: {} train / {} valid pairs, {} epoch(s)",
            dataset.train.len(),
            dataset.valid.len(),
            self.config.finetune.epochs
        );

        // Training runs for as long as it needs; no request timeout
        let outcome = match self.post_finetune(&url, &request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // remove_dir only succeeds while the directory is still empty
                let _ = tokio::fs::remove_dir(&output_dir).await;
                return Err(e);
            }
        };
        info!("TRAINING DONE: model saved to {}", outcome.output_dir);

        let metadata = FinetuneMetadata {
            version: version.to_string(),
            base_model: self.config.base_model.clone(),
            trained_at: Utc::now(),
            train_pairs: dataset.train.len(),
            valid_pairs: dataset.valid.len(),
            outcome,
        };
        let metadata_path = output_dir.join(FINETUNE_METADATA);
        if let Err(e) = tokio::fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?).await {
            warn!("Failed to write fine-tuning metadata: {}", e);
        }

        Ok(output_dir)
    }

    async fn post_finetune(&self, url: &str, request: &FinetuneRequest<'_>) -> Result<FinetuneOutcome> {
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| SalinError::Translation(format!("Fine-tuning request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SalinError::Translation(format!(
                "Fine-tuning failed {}: {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SalinError::Translation(format!("Failed to parse fine-tuning response: {}", e)))
    }

    fn build_finetune_request<'a>(&'a self, dataset: &'a SplitDataset, output_dir: String) -> FinetuneRequest<'a> {
        let finetune = &self.config.finetune;
        FinetuneRequest {
            model: &self.config.base_model,
            src_lang: &self.config.source_code,
            tgt_lang: &self.config.target_code,
            prefix: &finetune.prefix,
            max_length: self.config.max_length,
            hyperparameters: Hyperparameters {
                learning_rate: finetune.learning_rate,
                per_device_train_batch_size: finetune.batch_size,
                per_device_eval_batch_size: finetune.batch_size,
                weight_decay: finetune.weight_decay,
                num_train_epochs: finetune.epochs,
                save_total_limit: finetune.save_total_limit,
                evaluation_strategy: "epoch",
                predict_with_generate: true,
            },
            train: example_pairs(&dataset.train),
            valid: example_pairs(&dataset.valid),
            output_dir,
        }
    }
}

fn example_pairs(corpus: &Corpus) -> Vec<ExamplePair<'_>> {
    corpus
        .pairs
        .iter()
        .map(|p| ExamplePair {
            source: &p.source_text,
            target: &p.target_text,
        })
        .collect()
}

#[async_trait]
impl Translator for NeuralTranslator {
    fn label(&self) -> &str {
        &self.label
    }

    async fn translate(&self, text: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            text,
            src_lang: &self.config.source_code,
            tgt_lang: &self.config.target_code,
            max_length: self.config.max_length,
        };
        let url = format!("{}/translate", self.config.endpoint);
        debug!("Sending translation request to: {}", url);

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| SalinError::Translation(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SalinError::Translation(format!(
                "Inference server error {}: {}",
                status, error_text
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| SalinError::Translation(format!("Failed to parse response: {}", e)))?;

        generated
            .translations
            .into_iter()
            .next()
            .map(|t| t.trim().to_string())
            .ok_or_else(|| SalinError::Translation("Empty translation received".to_string()))
    }
}

/// Fine-tuned model directories under `dir`
pub fn list_finetuned_models<P: AsRef<Path>>(dir: P) -> Vec<PathBuf> {
    let mut models: Vec<PathBuf> = WalkDir::new(dir.as_ref())
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter(|e| e.file_name().to_string_lossy().starts_with(FINETUNED_PREFIX))
        .map(|e| e.path().to_path_buf())
        .collect();
    models.sort();
    models
}
