//! Top-level error aggregation.
//!
//! Each module defines its own `thiserror` enum; this type collects them at
//! the application boundary so callers can use one `ChatvoxResult`.

use thiserror::Error;

use crate::playback::output::PlaybackError;
use crate::playback::synth::SynthesisError;
use crate::sources::SourceError;

/// アプリケーション全体のエラー型
#[derive(Debug, Error)]
pub enum ChatvoxError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    General(#[from] anyhow::Error),
}

pub type ChatvoxResult<T> = Result<T, ChatvoxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ChatvoxError::Config("queue capacity must be >= 1".to_string());
        assert!(format!("{}", err).contains("queue capacity"));
    }

    #[test]
    fn test_source_error_conversion() {
        let err: ChatvoxError = SourceError::QuotaExhausted.into();
        assert!(matches!(err, ChatvoxError::Source(_)));
    }
}
