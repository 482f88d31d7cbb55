use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, SalinError};

// Default values for optional settings
fn default_valid_share() -> f64 {
    0.5
}

fn default_effective_order() -> bool {
    true
}

fn default_comet_batch_size() -> usize {
    32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    pub neural: NeuralConfig,
    pub api: ApiConfig,
    pub scoring: ScoringConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory holding `<version>.split.json` files and `finetuned_<version>/` models
    pub artifact_dir: PathBuf,
    /// Fraction of the cleaned corpus held out from training
    pub held_out_fraction: f64,
    /// Share of the held-out portion that becomes the validation subset
    #[serde(default = "default_valid_share")]
    pub valid_share: f64,
    /// Fraction of a separate test corpus kept in dual-corpus mode
    pub test_sample_fraction: f64,
    /// Fixed seed for reproducible splits; entropy-seeded when absent
    pub seed: Option<u64>,
    /// How blank lines are removed from the raw corpus files
    pub blank_lines: BlankLinePolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlankLinePolicy {
    /// Paired: drop an index when either side is blank, keeping the files aligned
    Paired,
    /// Independent: drop blank lines from each side separately
    Independent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralConfig {
    /// Seq2seq inference server URL
    pub endpoint: String,
    /// Pretrained checkpoint served by the inference server
    pub base_model: String,
    /// Tokenizer language code of the source side
    pub source_code: String,
    /// Tokenizer language code forced as the first generated token
    pub target_code: String,
    /// Maximum token length for generation and fine-tuning
    pub max_length: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    pub finetune: FinetuneConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinetuneConfig {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub weight_decay: f64,
    pub epochs: u32,
    /// Number of intermediate checkpoints kept by the trainer
    pub save_total_limit: u32,
    /// Task prefix prepended to every source sentence
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Translation API URL
    pub endpoint: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub source_lang: String,
    pub target_lang: String,
    /// Pause after every successful call
    pub sleep_secs: u64,
    /// Pause before the single retry of a failed call
    pub long_sleep_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// BLEU tokenizer
    pub tokenizer: BleuTokenizer,
    /// Lowercase predictions and references before BLEU
    pub lowercase: bool,
    /// Ignore n-gram orders the predictions are too short to contain
    #[serde(default = "default_effective_order")]
    pub effective_order: bool,
    pub comet: CometConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BleuTokenizer {
    /// 13a: the mteval-v13a tokenizer used by sacreBLEU by default
    #[serde(rename = "13a")]
    Mteval13a,
    /// None: split on whitespace only
    #[serde(rename = "none")]
    Whitespace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CometConfig {
    pub enabled: bool,
    /// COMET scoring server URL
    pub endpoint: String,
    pub model: String,
    #[serde(default = "default_comet_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// File that multi-provider comparisons are appended to
    pub file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig {
                artifact_dir: PathBuf::from("."),
                held_out_fraction: 0.2,
                valid_share: 0.5,
                test_sample_fraction: 0.1,
                seed: None,
                blank_lines: BlankLinePolicy::Paired,
            },
            neural: NeuralConfig {
                endpoint: "http://localhost:8000".to_string(),
                base_model: "facebook/nllb-200-distilled-600M".to_string(),
                source_code: "tgl_Latn".to_string(),
                target_code: "eng_Latn".to_string(),
                max_length: 128,
                timeout_secs: 300,
                finetune: FinetuneConfig {
                    learning_rate: 2e-5,
                    batch_size: 8,
                    weight_decay: 0.01,
                    epochs: 1,
                    save_total_limit: 3,
                    prefix: "translate Tagalog to English: ".to_string(),
                },
            },
            api: ApiConfig {
                endpoint: "https://translation.googleapis.com/language/translate/v2".to_string(),
                api_key_env: "GOOGLE_TRANSLATE_API_KEY".to_string(),
                source_lang: "tl".to_string(),
                target_lang: "en".to_string(),
                sleep_secs: 1,
                long_sleep_secs: 60,
            },
            scoring: ScoringConfig {
                tokenizer: BleuTokenizer::Mteval13a,
                lowercase: false,
                effective_order: true,
                comet: CometConfig {
                    enabled: true,
                    endpoint: "http://localhost:8001".to_string(),
                    model: "Unbabel/wmt22-comet-da".to_string(),
                    batch_size: 32,
                },
            },
            report: ReportConfig {
                file: PathBuf::from("all_scores.txt"),
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SalinError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| SalinError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SalinError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| SalinError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Reject fractions outside of [0, 1]
    pub fn validate(&self) -> Result<()> {
        let fractions = [
            ("data.held_out_fraction", self.data.held_out_fraction),
            ("data.valid_share", self.data.valid_share),
            ("data.test_sample_fraction", self.data.test_sample_fraction),
        ];
        for (name, value) in fractions {
            check_fraction(name, value)?;
        }
        if self.scoring.comet.batch_size == 0 {
            return Err(SalinError::Config("scoring.comet.batch_size must be positive".to_string()));
        }
        Ok(())
    }
}

/// Reject a fraction outside of [0, 1]
pub fn check_fraction(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SalinError::Config(format!(
            "{} must be between 0 and 1, got {}",
            name, value
        )));
    }
    Ok(())
}
