//! Owns the set of active sources and the process-wide queue + playback
//! engine, and exposes the operations the (external) UI layer drives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::chat::{ProcessedUtterance, VoiceProfile};
use crate::error::{ChatvoxError, ChatvoxResult};
use crate::filter::scoring::ToxicityScorer;
use crate::filter::translate::Translator;
use crate::filter::{FilterChain, FilterConfig, FilterConfigHandle};
use crate::normalize::{Normalizer, NormalizerConfig};
use crate::pipeline::{SourcePipeline, VoiceSettings};
use crate::playback::output::AudioOutput;
use crate::playback::synth::SpeechSynthesizer;
use crate::playback::{self, PlaybackHandle, PlaybackOptions, PlaybackState};
use crate::queue::SpeechQueue;
use crate::sources::twitch::{self, IrcConnector, TwitchConfig, WsIrcConnector};
use crate::sources::youtube::{self, LiveChatApi, YouTubeDataApi};
use crate::sources::{ConnectionState, SourceError, SourceHandle, SourceId};
use crate::stats::PipelineStats;

/// How to attach one source.
pub enum SourceSpec {
    YouTube {
        api_key: String,
        url_or_id: String,
    },
    Twitch(TwitchConfig),
    /// Pre-built collaborators, used by tests and embedders.
    YouTubeApi(Arc<dyn LiveChatApi>),
    TwitchConnector {
        connector: Box<dyn IrcConnector>,
        config: TwitchConfig,
    },
}

/// External collaborators the orchestrator wires into every pipeline.
pub struct Collaborators {
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub audio_output: Arc<dyn AudioOutput>,
    pub toxicity_scorer: Option<Arc<dyn ToxicityScorer>>,
    pub translator: Option<Arc<dyn Translator>>,
}

/// Application core: sources on one side, one voice on the other.
///
/// The speech queue and playback engine live exactly as long as the
/// orchestrator: created at startup, closed by [`Orchestrator::shutdown`].
pub struct Orchestrator {
    queue: Arc<SpeechQueue>,
    playback: Mutex<Option<PlaybackHandle>>,
    sources: Mutex<HashMap<SourceId, SourceHandle>>,
    next_source_id: AtomicU64,
    filter_config: Arc<FilterConfigHandle>,
    voice: Arc<RwLock<VoiceSettings>>,
    normalizer_config: NormalizerConfig,
    stats: Arc<PipelineStats>,
    toxicity_scorer: Option<Arc<dyn ToxicityScorer>>,
    translator: Option<Arc<dyn Translator>>,
}

impl Orchestrator {
    pub fn new(
        collaborators: Collaborators,
        filter_config: FilterConfig,
        normalizer_config: NormalizerConfig,
        voice: VoiceSettings,
        queue_capacity: usize,
        playback_options: PlaybackOptions,
    ) -> Self {
        let queue = Arc::new(SpeechQueue::new(queue_capacity));
        let stats = Arc::new(PipelineStats::new());

        let playback = playback::spawn(
            Arc::clone(&queue),
            collaborators.synthesizer,
            collaborators.audio_output,
            playback_options,
            Arc::clone(&stats),
        );

        tracing::info!("🏗️ Orchestrator started (queue capacity {})", queue.capacity());

        Self {
            queue,
            playback: Mutex::new(Some(playback)),
            sources: Mutex::new(HashMap::new()),
            next_source_id: AtomicU64::new(1),
            filter_config: Arc::new(FilterConfigHandle::new(filter_config)),
            voice: Arc::new(RwLock::new(voice)),
            normalizer_config,
            stats,
            toxicity_scorer: collaborators.toxicity_scorer,
            translator: collaborators.translator,
        }
    }

    /// Builds the per-source stage chain. Each source gets its own
    /// normalizer (fresh sequence space) and its own stateful filter
    /// windows; config and collaborators are shared.
    fn build_pipeline(&self) -> SourcePipeline {
        let normalizer = Normalizer::new(self.normalizer_config.clone(), Arc::clone(&self.stats));
        let filter = FilterChain::new(
            Arc::clone(&self.filter_config),
            self.toxicity_scorer.clone(),
            self.translator.clone(),
        );
        SourcePipeline::new(
            normalizer,
            filter,
            Arc::clone(&self.queue),
            Arc::clone(&self.voice),
            Arc::clone(&self.stats),
        )
    }

    fn next_id(&self) -> SourceId {
        SourceId(self.next_source_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Attaches and starts a source. The returned id addresses it in
    /// [`Orchestrator::remove_source`] and the state observers.
    pub async fn add_source(&self, spec: SourceSpec) -> ChatvoxResult<SourceId> {
        let id = self.next_id();
        let pipeline = self.build_pipeline();

        let handle = match spec {
            SourceSpec::YouTube { api_key, url_or_id } => {
                let api = YouTubeDataApi::connect(&api_key, &url_or_id)
                    .await
                    .map_err(SourceError::from)?;
                youtube::spawn(id, Arc::new(api), pipeline)
            }
            SourceSpec::YouTubeApi(api) => youtube::spawn(id, api, pipeline),
            SourceSpec::Twitch(config) => {
                twitch::spawn(id, Box::new(WsIrcConnector::new()), config, pipeline)
            }
            SourceSpec::TwitchConnector { connector, config } => {
                twitch::spawn(id, connector, config, pipeline)
            }
        };

        tracing::info!("➕ Source {} added ({})", id, handle.kind.as_str());
        self.sources.lock().insert(id, handle);
        Ok(id)
    }

    /// Stops a source. Utterances it already enqueued are unaffected.
    pub async fn remove_source(&self, id: SourceId) -> ChatvoxResult<()> {
        let handle = self
            .sources
            .lock()
            .remove(&id)
            .ok_or_else(|| ChatvoxError::Config(format!("no source with id {id}")))?;
        handle.stop_and_join().await;
        tracing::info!("➖ Source {} removed", id);
        Ok(())
    }

    /// Swaps the filter rules for messages evaluated after this call.
    pub fn set_filter_config(&self, config: FilterConfig) {
        self.filter_config.set(config);
    }

    /// Swaps voice profile, volume and speed for utterances built after this
    /// call. Values are clamped when each utterance is constructed.
    pub fn set_voice_config(&self, profile: VoiceProfile, volume: f32, speed: f32) {
        let mut voice = self.voice.write();
        voice.profile = profile;
        voice.volume = volume;
        voice.speed = speed;
        tracing::info!(
            "🎙️ Voice set to {} (volume {:.2}, speed {:.2})",
            voice.profile.speaker,
            volume,
            speed
        );
    }

    pub fn set_queue_capacity(&self, capacity: usize) {
        self.queue.set_capacity(capacity);
    }

    /// Aborts the utterance currently being spoken, if any.
    pub fn cancel_current_utterance(&self) {
        if let Some(playback) = self.playback.lock().as_ref() {
            playback.cancel_current();
        }
    }

    /// Current state of every attached source.
    pub fn connection_states(&self) -> Vec<(SourceId, ConnectionState)> {
        self.sources
            .lock()
            .iter()
            .map(|(id, handle)| (*id, handle.state()))
            .collect()
    }

    /// Watch stream for one source's state changes.
    pub fn subscribe_source(&self, id: SourceId) -> Option<watch::Receiver<ConnectionState>> {
        self.sources.lock().get(&id).map(|h| h.subscribe_state())
    }

    /// Same as [`Orchestrator::subscribe_source`] but as a `Stream`, for UI
    /// layers that consume state changes as events.
    pub fn source_state_stream(
        &self,
        id: SourceId,
    ) -> Option<tokio_stream::wrappers::WatchStream<ConnectionState>> {
        self.subscribe_source(id)
            .map(tokio_stream::wrappers::WatchStream::new)
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback
            .lock()
            .as_ref()
            .map(|p| p.state())
            .unwrap_or(PlaybackState::Idle)
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped_count()
    }

    /// Stops all sources, closes the queue and waits for playback to drain.
    pub async fn shutdown(&self) -> ChatvoxResult<()> {
        tracing::info!("🛑 Shutting down orchestrator");

        let handles: Vec<SourceHandle> = {
            let mut sources = self.sources.lock();
            sources.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            handle.stop_and_join().await;
        }

        self.queue.close();

        let playback = self.playback.lock().take();
        if let Some(playback) = playback {
            playback.join().await?;
        }

        tracing::info!("👋 Orchestrator shutdown complete: {}", self.stats.summary());
        Ok(())
    }

    /// Test/embedder hook: push an utterance directly into the queue.
    pub fn enqueue_direct(&self, utterance: ProcessedUtterance) -> bool {
        self.queue.enqueue(utterance)
    }
}
