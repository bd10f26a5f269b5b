pub mod chat;
pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod playback;
pub mod queue;
pub mod sources;
pub mod stats;

// Re-export the main error types for convenience
pub use error::{ChatvoxError, ChatvoxResult};

// Re-export the core data model
pub use chat::{
    ChatMessage, MessageId, ProcessedUtterance, SourceKind, VoiceLanguage, VoiceProfile,
};

// Re-export the pipeline building blocks
pub use filter::{FailurePolicy, FilterChain, FilterConfig, FilterConfigHandle, FilterOutcome};
pub use normalize::{Normalizer, NormalizerConfig};
pub use orchestrator::{Collaborators, Orchestrator, SourceSpec};
pub use pipeline::{SourcePipeline, VoiceSettings};
pub use playback::{PlaybackOptions, PlaybackState};
pub use queue::SpeechQueue;
pub use sources::{ConnectionState, SourceHandle, SourceId};
pub use stats::PipelineStats;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        // Test that the main types are accessible from the crate root
        assert!(std::any::type_name::<SpeechQueue>().contains("SpeechQueue"));
        assert!(std::any::type_name::<Orchestrator>().contains("Orchestrator"));
        assert!(
            std::any::type_name::<sources::youtube::YouTubeDataApi>().contains("YouTubeDataApi")
        );
    }

    #[test]
    fn test_error_types_re_exported() {
        let source_error = sources::SourceError::QuotaExhausted;
        let _chatvox_error: ChatvoxError = source_error.into();
    }

    #[test]
    fn test_connection_state_variants() {
        // The full lifecycle a UI layer has to render
        let states = [
            ConnectionState::Connecting,
            ConnectionState::Live,
            ConnectionState::Reconnecting,
            ConnectionState::QuotaExhausted,
            ConnectionState::Stopped,
            ConnectionState::Failed,
        ];
        assert_eq!(states.len(), 6);
    }

    #[test]
    fn test_voice_tables_available() {
        assert!(VoiceLanguage::Ru.speakers().contains(&"xenia"));
        assert!(VoiceLanguage::En.speakers().contains(&"en_0"));
    }
}
