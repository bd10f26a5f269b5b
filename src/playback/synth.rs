//! Speech synthesis collaborator.
//!
//! The acoustic model is external; this module defines the contract plus an
//! HTTP client for a locally hosted TTS server that speaks the common
//! audio-query / synthesis two-step API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::chat::VoiceProfile;

/// Synthesized audio, WAV-encoded.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub wav_bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Synthesis request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Synthesis backend error: {0}")]
    Backend(String),

    #[error("Empty audio returned for non-empty text")]
    EmptyAudio,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoiceProfile)
        -> Result<AudioClip, SynthesisError>;
}

/// Where the local TTS server lives and how speaker names map to its ids.
#[derive(Debug, Clone)]
pub struct HttpSynthesizerConfig {
    pub host: String,
    pub port: u16,
    /// Speaker name → backend speaker id. Unknown speakers use id 0.
    pub speaker_ids: HashMap<String, u32>,
}

impl Default for HttpSynthesizerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 50021,
            speaker_ids: HashMap::new(),
        }
    }
}

/// HTTP TTS backend client.
pub struct HttpSynthesizer {
    config: HttpSynthesizerConfig,
    client: reqwest::Client,
}

impl HttpSynthesizer {
    pub fn new(config: HttpSynthesizerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    fn speaker_id(&self, voice: &VoiceProfile) -> u32 {
        self.config
            .speaker_ids
            .get(&voice.speaker)
            .copied()
            .unwrap_or(0)
    }

    /// Asks the server for its version to confirm it is reachable.
    pub async fn test_connection(&self) -> Result<bool, SynthesisError> {
        let url = format!("http://{}:{}/version", self.config.host, self.config.port);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let version = response.text().await.unwrap_or_default();
                tracing::info!("✅ TTS server reachable (version: {})", version.trim());
                Ok(true)
            }
            Ok(response) => {
                tracing::warn!("⚠️ TTS server returned HTTP {}", response.status());
                Ok(false)
            }
            Err(e) => Err(SynthesisError::Backend(format!(
                "TTS server unreachable: {e}"
            ))),
        }
    }

    async fn audio_query(
        &self,
        text: &str,
        speaker: u32,
    ) -> Result<serde_json::Value, SynthesisError> {
        let url = format!(
            "http://{}:{}/audio_query?speaker={}&text={}",
            self.config.host,
            self.config.port,
            speaker,
            urlencoding::encode(text),
        );

        let response = self.client.post(&url).send().await?;
        if !response.status().is_success() {
            return Err(SynthesisError::Backend(format!(
                "audio_query returned HTTP {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceProfile,
    ) -> Result<AudioClip, SynthesisError> {
        let speaker = self.speaker_id(voice);
        tracing::debug!("🔊 Synthesizing with speaker {}: {}", voice.speaker, text);

        let audio_query = self.audio_query(text, speaker).await?;

        let url = format!(
            "http://{}:{}/synthesis?speaker={}",
            self.config.host, self.config.port, speaker,
        );
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&audio_query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SynthesisError::Backend(format!(
                "synthesis returned HTTP {}",
                response.status()
            )));
        }

        let wav_bytes = response.bytes().await?.to_vec();
        if wav_bytes.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }

        Ok(AudioClip { wav_bytes })
    }
}
