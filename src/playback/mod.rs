//! Single-consumer playback engine.
//!
//! Exactly one task dequeues, synthesizes and plays, blocking for the whole
//! duration of each utterance. That blocking IS the serialization point: no
//! two utterances ever sound at once, and playback order equals dequeue
//! order. A synthesis failure skips that utterance and moves on; it never
//! stalls the pipeline.

pub mod output;
pub mod synth;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::queue::SpeechQueue;
use crate::stats::PipelineStats;
use output::AudioOutput;
use synth::SpeechSynthesizer;

/// Engine lifecycle per utterance: Idle → Synthesizing → Playing → Idle,
/// with a side transition to Cancelled on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Synthesizing,
    Playing,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PlaybackOptions {
    /// Pause after each spoken utterance so consecutive messages do not run
    /// into each other.
    pub inter_utterance_delay: Duration,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            inter_utterance_delay: Duration::from_millis(1500),
        }
    }
}

/// Handle to the running playback task.
pub struct PlaybackHandle {
    cancel_tx: mpsc::UnboundedSender<()>,
    state_rx: watch::Receiver<PlaybackState>,
    join: JoinHandle<()>,
}

impl PlaybackHandle {
    /// Aborts the in-flight utterance (synthesis or playback). The utterance
    /// is discarded, not re-queued; the next queued utterance follows.
    pub fn cancel_current(&self) {
        let _ = self.cancel_tx.send(());
    }

    pub fn state(&self) -> PlaybackState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PlaybackState> {
        self.state_rx.clone()
    }

    /// Waits for the engine to finish. It exits once the queue is closed and
    /// drained.
    pub async fn join(self) -> Result<(), output::PlaybackError> {
        self.join
            .await
            .map_err(|e| output::PlaybackError::Task(e.to_string()))
    }
}

/// Spawns the dedicated playback task. There is exactly one engine per
/// process lifetime, created at startup and joined at shutdown.
pub fn spawn(
    queue: Arc<SpeechQueue>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    audio_output: Arc<dyn AudioOutput>,
    options: PlaybackOptions,
    stats: Arc<PipelineStats>,
) -> PlaybackHandle {
    let (cancel_tx, cancel_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(PlaybackState::Idle);

    let join = tokio::spawn(run(
        queue,
        synthesizer,
        audio_output,
        options,
        stats,
        state_tx,
        cancel_rx,
    ));

    PlaybackHandle {
        cancel_tx,
        state_rx,
        join,
    }
}

async fn run(
    queue: Arc<SpeechQueue>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    audio_output: Arc<dyn AudioOutput>,
    options: PlaybackOptions,
    stats: Arc<PipelineStats>,
    state_tx: watch::Sender<PlaybackState>,
    mut cancel_rx: mpsc::UnboundedReceiver<()>,
) {
    tracing::info!("🔊 Playback engine started");

    while let Some(utterance) = queue.dequeue().await {
        // A cancel pressed while idle applies to nothing; don't let it kill
        // the utterance we just picked up.
        while cancel_rx.try_recv().is_ok() {}

        let _ = state_tx.send(PlaybackState::Synthesizing);
        tracing::debug!(
            "📢 Speaking (origin {}): {}",
            utterance.origin_id,
            utterance.spoken_text.chars().take(50).collect::<String>()
        );

        let synthesis = tokio::select! {
            _ = cancel_rx.recv() => {
                tracing::info!("🛑 Synthesis cancelled (origin {})", utterance.origin_id);
                let _ = state_tx.send(PlaybackState::Cancelled);
                let _ = state_tx.send(PlaybackState::Idle);
                continue;
            }
            result = synthesizer.synthesize(&utterance.spoken_text, &utterance.voice) => result,
        };

        let clip = match synthesis {
            Ok(clip) => clip,
            Err(e) => {
                tracing::warn!(
                    "⚠️ Synthesis failed for {} ({}), skipping utterance",
                    utterance.origin_id,
                    e
                );
                PipelineStats::incr(&stats.synthesis_failures);
                let _ = state_tx.send(PlaybackState::Idle);
                continue;
            }
        };

        let _ = state_tx.send(PlaybackState::Playing);

        let play = audio_output.play(clip, utterance.volume, utterance.speed);
        tokio::pin!(play);

        let mut cancelled = false;
        tokio::select! {
            _ = cancel_rx.recv() => {
                audio_output.stop();
                cancelled = true;
            }
            result = play.as_mut() => {
                if let Err(e) = result {
                    tracing::error!("❌ Audio output error: {}", e);
                }
            }
        }

        if cancelled {
            // The aborted play call still returns; wait so the next
            // utterance cannot overlap its tail.
            let _ = play.await;
            tracing::info!("🛑 Playback cancelled (origin {})", utterance.origin_id);
            let _ = state_tx.send(PlaybackState::Cancelled);
        } else {
            PipelineStats::incr(&stats.spoken);
        }

        // Breathing room between messages; a cancel just skips it.
        tokio::select! {
            _ = tokio::time::sleep(options.inter_utterance_delay) => {}
            _ = cancel_rx.recv() => {}
        }

        let _ = state_tx.send(PlaybackState::Idle);
    }

    let _ = state_tx.send(PlaybackState::Idle);
    tracing::info!("🔊 Playback engine finished (queue closed and drained)");
}
