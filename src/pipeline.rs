//! Per-source processing pipeline: normalize → filter → enqueue.
//!
//! Each source worker owns exactly one pipeline, so the whole path from raw
//! event to speech queue runs inside that source's task. Slow collaborator
//! calls (toxicity scoring, translation) therefore only ever stall their own
//! source, never other sources or playback.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::chat::{ProcessedUtterance, VoiceProfile};
use crate::filter::{FilterChain, FilterOutcome, RejectReason};
use crate::normalize::Normalizer;
use crate::queue::SpeechQueue;
use crate::sources::RawChatEvent;
use crate::stats::PipelineStats;

/// Voice parameters applied to accepted utterances. Swapped as a whole by
/// `set_voice_config`; read once per message.
#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub profile: VoiceProfile,
    pub volume: f32,
    pub speed: f32,
    /// Prefix utterances with "{author} said:".
    pub read_author_names: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            profile: VoiceProfile::default(),
            volume: 1.0,
            speed: 1.0,
            read_author_names: false,
        }
    }
}

/// The per-source stage chain feeding the shared speech queue.
pub struct SourcePipeline {
    normalizer: Normalizer,
    filter: FilterChain,
    queue: Arc<SpeechQueue>,
    voice: Arc<RwLock<VoiceSettings>>,
    stats: Arc<PipelineStats>,
}

impl SourcePipeline {
    pub fn new(
        normalizer: Normalizer,
        filter: FilterChain,
        queue: Arc<SpeechQueue>,
        voice: Arc<RwLock<VoiceSettings>>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            normalizer,
            filter,
            queue,
            voice,
            stats,
        }
    }

    /// Runs one raw event through the whole chain. Never returns an error:
    /// every failure mode is a counted drop or a counted rejection.
    pub async fn handle_event(&mut self, event: RawChatEvent) {
        PipelineStats::incr(&self.stats.received);

        let Some(message) = self.normalizer.normalize(event) else {
            return;
        };

        let voice = self.voice.read().clone();
        let spoken_seed = if voice.read_author_names {
            format!("{} said: {}", message.author, message.raw_text)
        } else {
            message.raw_text.clone()
        };

        match self.filter.process(&message, spoken_seed, &voice.profile).await {
            FilterOutcome::Accepted(text) => {
                let Some(utterance) = ProcessedUtterance::new(
                    message.id.clone(),
                    text,
                    voice.profile.clone(),
                    voice.volume,
                    voice.speed,
                ) else {
                    // Transforms cannot produce empty text from non-empty
                    // input, but the queue contract requires it never sees one.
                    return;
                };

                if self.queue.enqueue(utterance) {
                    PipelineStats::incr(&self.stats.enqueued);
                } else {
                    tracing::debug!(
                        "📪 Speech queue full, dropped incoming utterance (origin {})",
                        message.id
                    );
                }
            }
            FilterOutcome::Rejected(reason) => {
                match reason {
                    RejectReason::Duplicate => PipelineStats::incr(&self.stats.duplicates),
                    RejectReason::StopWord | RejectReason::Repetition => {
                        PipelineStats::incr(&self.stats.spam)
                    }
                    RejectReason::Toxic | RejectReason::ScorerUnavailable => {
                        PipelineStats::incr(&self.stats.toxic)
                    }
                }
                tracing::debug!("🚫 Rejected message {}: {:?}", message.id, reason);
            }
        }
    }
}
