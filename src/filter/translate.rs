//! Translation collaborator. Failure here is never fatal for a message:
//! the chain falls through with the untranslated text.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Translation service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translates `text` into `target_lang` (ISO 639-1 code).
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, TranslationError>;
}

/// HTTP client for a LibreTranslate-style endpoint:
/// `POST {endpoint} {"q": "...", "source": "auto", "target": "en"}`
/// → `{"translatedText": "..."}`.
pub struct HttpTranslator {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

impl HttpTranslator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, TranslationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "q": text,
                "source": "auto",
                "target": target_lang,
            }))
            .send()
            .await
            .map_err(|e| TranslationError::ServiceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TranslationError::ServiceUnavailable(format!(
                "translator returned HTTP {}",
                response.status()
            )));
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::ServiceUnavailable(e.to_string()))?;

        Ok(parsed.translated_text)
    }
}
