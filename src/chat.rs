//! Canonical chat data model shared by every pipeline stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Playback volume bounds. Values outside are clamped on construction.
pub const VOLUME_RANGE: (f32, f32) = (0.0, 1.0);
/// Playback speed multiplier bounds.
pub const SPEED_RANGE: (f32, f32) = (0.5, 2.0);

/// Source-scoped unique message token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

/// Platform a message originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    YouTube,
    Twitch,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::YouTube => "youtube",
            SourceKind::Twitch => "twitch",
        }
    }
}

/// One received chat line in canonical form.
///
/// Created by the normalizer, immutable afterwards. `source_sequence` is
/// strictly increasing per source connection and never reused within it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub source: SourceKind,
    pub author: String,
    pub raw_text: String,
    pub received_at: DateTime<Utc>,
    pub source_sequence: u64,
}

/// Voice language. Determines the speaker table and number-expansion locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceLanguage {
    #[serde(alias = "english")]
    En,
    #[serde(alias = "russian")]
    Ru,
}

impl VoiceLanguage {
    /// Known speaker names for this language.
    pub fn speakers(&self) -> &'static [&'static str] {
        match self {
            VoiceLanguage::Ru => &["xenia", "aidar", "baya", "kseniya", "eugene"],
            VoiceLanguage::En => &[
                "random", "en_0", "en_1", "en_2", "en_3", "en_4", "en_5", "en_6", "en_7", "en_8",
                "en_9", "en_10", "en_11", "en_12", "en_13", "en_14", "en_15", "en_16", "en_17",
                "en_18", "en_19", "en_20",
            ],
        }
    }

    pub fn default_speaker(&self) -> &'static str {
        self.speakers()[0]
    }
}

/// Voice identity an utterance is spoken with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub language: VoiceLanguage,
    pub speaker: String,
}

impl VoiceProfile {
    pub fn new(language: VoiceLanguage, speaker: impl Into<String>) -> Self {
        let speaker = speaker.into();
        let speaker = if language.speakers().contains(&speaker.as_str()) {
            speaker
        } else {
            language.default_speaker().to_string()
        };
        Self { language, speaker }
    }
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self::new(VoiceLanguage::En, VoiceLanguage::En.default_speaker())
    }
}

/// A message that survived the filter chain, ready for synthesis.
///
/// Owned exclusively by the speech queue until dequeued; dropped after the
/// playback engine finishes (or cancels) it.
#[derive(Debug, Clone)]
pub struct ProcessedUtterance {
    /// Back-reference to the originating [`ChatMessage`], non-owning.
    pub origin_id: MessageId,
    /// Post-translation, post-number-expansion text. Never empty.
    pub spoken_text: String,
    pub voice: VoiceProfile,
    pub volume: f32,
    pub speed: f32,
    pub enqueued_at: DateTime<Utc>,
}

impl ProcessedUtterance {
    /// Builds an utterance, clamping volume/speed to their configured bounds.
    /// Returns `None` for empty text: an empty utterance is never valid.
    pub fn new(
        origin_id: MessageId,
        spoken_text: String,
        voice: VoiceProfile,
        volume: f32,
        speed: f32,
    ) -> Option<Self> {
        if spoken_text.trim().is_empty() {
            return None;
        }
        Some(Self {
            origin_id,
            spoken_text,
            voice,
            volume: volume.clamp(VOLUME_RANGE.0, VOLUME_RANGE.1),
            speed: speed.clamp(SPEED_RANGE.0, SPEED_RANGE.1),
            enqueued_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_display() {
        let id = MessageId("yt:abc123".to_string());
        assert_eq!(format!("{}", id), "yt:abc123");
    }

    #[test]
    fn test_voice_profile_falls_back_to_default_speaker() {
        let voice = VoiceProfile::new(VoiceLanguage::Ru, "not_a_speaker");
        assert_eq!(voice.speaker, "xenia");

        let voice = VoiceProfile::new(VoiceLanguage::En, "en_3");
        assert_eq!(voice.speaker, "en_3");
    }

    #[test]
    fn test_utterance_clamps_volume_and_speed() {
        let u = ProcessedUtterance::new(
            MessageId("m1".into()),
            "hello".into(),
            VoiceProfile::default(),
            3.5,
            0.1,
        )
        .unwrap();
        assert_eq!(u.volume, 1.0);
        assert_eq!(u.speed, 0.5);
    }

    #[test]
    fn test_utterance_rejects_empty_text() {
        let u = ProcessedUtterance::new(
            MessageId("m1".into()),
            "   ".into(),
            VoiceProfile::default(),
            1.0,
            1.0,
        );
        assert!(u.is_none());
    }
}
