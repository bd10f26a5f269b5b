//! Audio output collaborator: "play this buffer now", cancellably.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use super::synth::AudioClip;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Audio output initialization failed: {0}")]
    Output(String),

    #[error("Audio decode failed: {0}")]
    Decode(String),

    #[error("Playback task failed: {0}")]
    Task(String),
}

/// Plays one clip at a time. `play` blocks until playback completes or
/// `stop` aborts it; `stop` must make an in-flight `play` return promptly.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn play(&self, clip: AudioClip, volume: f32, speed: f32) -> Result<(), PlaybackError>;

    /// Aborts the clip currently playing, if any. Idempotent.
    fn stop(&self);
}

/// rodio-backed output. The output stream lives on a blocking thread for the
/// duration of one clip; the sink handle is shared so `stop` can reach it.
pub struct RodioOutput {
    current_sink: Arc<Mutex<Option<Arc<rodio::Sink>>>>,
}

impl RodioOutput {
    pub fn new() -> Self {
        Self {
            current_sink: Arc::new(Mutex::new(None)),
        }
    }
}

impl Default for RodioOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioOutput for RodioOutput {
    async fn play(&self, clip: AudioClip, volume: f32, speed: f32) -> Result<(), PlaybackError> {
        let slot = Arc::clone(&self.current_sink);

        let result = tokio::task::spawn_blocking(move || {
            use rodio::{Decoder, OutputStream, Sink};

            let (_stream, stream_handle) = OutputStream::try_default()
                .map_err(|e| PlaybackError::Output(e.to_string()))?;
            let sink =
                Arc::new(Sink::try_new(&stream_handle).map_err(|e| PlaybackError::Output(e.to_string()))?);

            sink.set_volume(volume);
            sink.set_speed(speed);

            let source = Decoder::new(Cursor::new(clip.wav_bytes))
                .map_err(|e| PlaybackError::Decode(e.to_string()))?;

            *slot.lock() = Some(Arc::clone(&sink));
            sink.append(source);
            // Returns early if another thread calls sink.stop().
            sink.sleep_until_end();
            *slot.lock() = None;

            Ok(())
        })
        .await
        .map_err(|e| PlaybackError::Task(e.to_string()))?;

        result
    }

    fn stop(&self) {
        if let Some(sink) = self.current_sink.lock().take() {
            sink.stop();
        }
    }
}
