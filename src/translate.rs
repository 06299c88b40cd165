use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::TranslationConfig;

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("translation request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("translation service returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("translation service returned no text")]
    Empty,
}

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text`, or hand it back unchanged when anything goes wrong.
    async fn translate(&self, text: &str, target_language: &str) -> String;
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
}

/// Client for a LibreTranslate-compatible `/translate` endpoint.
pub struct HttpTranslator {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTranslator {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("SmartNews/1.0 (News Aggregator)")
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    /// `None` when translation is disabled.
    pub fn from_config(config: &TranslationConfig) -> anyhow::Result<Option<Self>> {
        match (&config.endpoint, config.enabled) {
            (Some(endpoint), true) => Ok(Some(Self::new(
                endpoint.clone(),
                config.api_key.clone(),
                Duration::from_secs(config.timeout_secs),
            )?)),
            _ => Ok(None),
        }
    }

    pub async fn try_translate(&self, text: &str, target_language: &str) -> Result<String, TranslateError> {
        let request = TranslateRequest {
            q: text,
            source: "auto",
            target: target_language,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TranslateError::Status(status));
        }

        let body: TranslateResponse = response.json().await?;
        body.translated_text
            .filter(|t| !t.trim().is_empty())
            .ok_or(TranslateError::Empty)
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, target_language: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }

        match self.try_translate(text, target_language).await {
            Ok(translated) => translated,
            Err(e) => {
                warn!("Translation to '{}' failed, keeping original text: {}", target_language, e);
                text.to_string()
            }
        }
    }
}
