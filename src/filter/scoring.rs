//! Toxicity scoring collaborator.
//!
//! The classifier itself is an external service; this module only defines
//! the contract and an HTTP client for a locally hosted scorer. Whether an
//! unavailable scorer rejects or passes messages is a filter policy decision
//! (see [`crate::filter::FailurePolicy`]), not decided here.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Toxicity service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Scores text toxicity in `[0, 1]`, 1 being maximally toxic.
#[async_trait]
pub trait ToxicityScorer: Send + Sync {
    async fn score(&self, text: &str) -> Result<f32, ScoringError>;
}

/// HTTP client for a detoxify-style scoring endpoint:
/// `POST {endpoint} {"text": "..."}` → `{"score": 0.87}`.
pub struct HttpToxicityScorer {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ScoreResponse {
    score: f32,
}

impl HttpToxicityScorer {
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
impl ToxicityScorer for HttpToxicityScorer {
    async fn score(&self, text: &str) -> Result<f32, ScoringError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| ScoringError::ServiceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ScoringError::ServiceUnavailable(format!(
                "scorer returned HTTP {}",
                response.status()
            )));
        }

        let parsed: ScoreResponse = response
            .json()
            .await
            .map_err(|e| ScoringError::ServiceUnavailable(e.to_string()))?;

        Ok(parsed.score.clamp(0.0, 1.0))
    }
}
