// Translation providers
//
// Every provider turns source-language sentences into target-language sentences,
// one output per input, in input order:
// - Neural: seq2seq model (pretrained or fine-tuned) served over HTTP
// - Api: hosted translation API, rate limited with a single retry

pub mod api;
pub mod neural;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::info;

pub use api::{ApiTranslator, GoogleTranslateBackend, TranslationBackend};
pub use neural::NeuralTranslator;

use crate::config::Config;
use crate::error::{Result, SalinError};

/// Main trait for translation operations
#[async_trait]
pub trait Translator: Send + Sync {
    /// Label used in logs and score reports
    fn label(&self) -> &str;

    /// Translate one source sentence
    async fn translate(&self, text: &str) -> Result<String>;

    /// Translate sentences one after another, preserving order
    async fn translate_batch(&self, texts: &[String]) -> Result<Vec<String>> {
        info!("Translating {} sentence(s) with {}", texts.len(), self.label());

        let progress = ProgressBar::new(texts.len() as u64);
        progress.set_style(
            ProgressStyle::with_template("{prefix} [{bar:40}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        progress.set_prefix(self.label().to_string());

        let mut translations = Vec::with_capacity(texts.len());
        for text in texts {
            translations.push(self.translate(text).await?);
            progress.inc(1);
        }
        progress.finish_and_clear();

        Ok(translations)
    }
}

/// Which provider produces the predictions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Nllb: pretrained neural model
    Nllb,
    /// Finetuned: neural model loaded from `finetuned_<version>/`
    Finetuned,
    /// Google: Google Translate API
    Google,
}

impl ProviderKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "nllb" => Ok(Self::Nllb),
            "finetuned" => Ok(Self::Finetuned),
            "google" => Ok(Self::Google),
            _ => Err(SalinError::Config(format!(
                "Invalid provider '{}'. Valid providers: nllb, finetuned, google",
                name
            ))),
        }
    }

    /// Parse a comma-separated provider list
    pub fn parse_list(names: &str) -> Result<Vec<Self>> {
        names
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Nllb => "nllb",
            Self::Finetuned => "finetuned",
            Self::Google => "google",
        }
    }
}

/// Factory for creating translator instances
pub struct TranslatorFactory;

impl TranslatorFactory {
    /// Create a translator for a provider; `version` selects the fine-tuned model
    pub fn create_translator(
        kind: ProviderKind,
        config: &Config,
        version: &str,
    ) -> Result<Box<dyn Translator>> {
        match kind {
            ProviderKind::Nllb => Ok(Box::new(NeuralTranslator::pretrained(config.neural.clone())?)),
            ProviderKind::Finetuned => Ok(Box::new(NeuralTranslator::finetuned(
                config.neural.clone(),
                Path::new(&config.data.artifact_dir),
                version,
            )?)),
            ProviderKind::Google => {
                let backend = GoogleTranslateBackend::from_config(&config.api)?;
                Ok(Box::new(ApiTranslator::from_config(backend, &config.api)))
            }
        }
    }
}
