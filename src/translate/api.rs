use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::error::{Result, SalinError};
use super::Translator;

/// One request to a hosted translation service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn request(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    data: GoogleData,
}

#[derive(Debug, Deserialize)]
struct GoogleData {
    translations: Vec<GoogleTranslation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTranslation {
    translated_text: String,
}

/// Google Translate API v2
pub struct GoogleTranslateBackend {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GoogleTranslateBackend {
    pub fn new(endpoint: String, api_key: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(SalinError::Config("API key cannot be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(SalinError::Http)?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    /// Read the API key from the environment variable named in the config
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            SalinError::Config(format!("{} environment variable not set", config.api_key_env))
        })?;
        Self::new(config.endpoint.clone(), api_key)
    }
}

#[async_trait]
impl TranslationBackend for GoogleTranslateBackend {
    async fn request(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        let body = json!({
            "q": [text],
            "source": source_lang,
            "target": target_lang,
            "format": "text",
        });

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| SalinError::Translation(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SalinError::Translation(format!(
                "Google Translate API error {}: {}",
                status, error_text
            )));
        }

        let parsed: GoogleResponse = response
            .json()
            .await
            .map_err(|e| SalinError::Translation(format!("Failed to parse response: {}", e)))?;

        parsed
            .data
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| SalinError::Translation("Empty translation received".to_string()))
    }
}

/// Rate-limited, line-by-line translator over a hosted API.
///
/// Sleeps after every successful call. A failed call is retried exactly once after
/// a long sleep; a second failure is returned to the caller.
pub struct ApiTranslator<B: TranslationBackend> {
    backend: B,
    source_lang: String,
    target_lang: String,
    sleep: Duration,
    long_sleep: Duration,
}

impl<B: TranslationBackend> ApiTranslator<B> {
    pub fn new(
        backend: B,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
        sleep: Duration,
        long_sleep: Duration,
    ) -> Self {
        Self {
            backend,
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            sleep,
            long_sleep,
        }
    }

    pub fn from_config(backend: B, config: &ApiConfig) -> Self {
        Self::new(
            backend,
            config.source_lang.clone(),
            config.target_lang.clone(),
            Duration::from_secs(config.sleep_secs),
            Duration::from_secs(config.long_sleep_secs),
        )
    }

    async fn sleep_between_queries(&self) {
        debug!("Sleeping for {}s after translation query...", self.sleep.as_secs_f64());
        tokio::time::sleep(self.sleep).await;
    }

    async fn long_sleep_between_queries(&self) {
        info!(
            "LONG SLEEP! Sleeping for {}s before retrying translation query...",
            self.long_sleep.as_secs_f64()
        );
        tokio::time::sleep(self.long_sleep).await;
    }
}

#[async_trait]
impl<B: TranslationBackend> Translator for ApiTranslator<B> {
    fn label(&self) -> &str {
        "google"
    }

    async fn translate(&self, text: &str) -> Result<String> {
        // Bare line breaks pass through untouched
        if text == "\n" {
            return Ok(text.to_string());
        }

        let translation = match self.backend.request(text, &self.source_lang, &self.target_lang).await {
            Ok(translation) => translation,
            Err(e) => {
                warn!("Translation query failed: {}", e);
                self.long_sleep_between_queries().await;
                self.backend
                    .request(text, &self.source_lang, &self.target_lang)
                    .await?
            }
        };

        self.sleep_between_queries().await;
        Ok(translation)
    }
}
