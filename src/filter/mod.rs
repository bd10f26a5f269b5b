//! Ordered filtering-and-transformation pipeline.
//!
//! Stages are either predicates (may reject, never rewrite) or transforms
//! (may rewrite the spoken text, never reject). Order: dedupe → stop-words →
//! toxicity → translation → number expansion. A message leaves the chain as
//! exactly one accepted text or as a counted rejection.

pub mod dedupe;
pub mod numbers;
pub mod scoring;
pub mod stopwords;
pub mod translate;

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, VoiceProfile};
use dedupe::DedupeWindow;
use scoring::ToxicityScorer;
use stopwords::{RepetitionTracker, StopWordList, StopWordRule};
use translate::Translator;

/// What to do with a message when an external filter service cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Reject the message. Speaking unscored content is the worse failure
    /// mode, so this is the default for toxicity.
    FailClosed,
    FailOpen,
}

/// Versioned filter rules. The whole struct is swapped atomically between
/// messages; it is never mutated while a message is being evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Bumped on every swap so stateful stages know to rebuild.
    pub version: u64,
    pub stop_words: Vec<StopWordRule>,
    /// Messages per author allowed inside `repeat_window_secs`.
    pub max_repeats_per_window: u32,
    pub repeat_window_secs: u64,
    pub dedupe_window_secs: u64,
    /// `None` disables the toxicity stage entirely.
    pub toxicity_threshold: Option<f32>,
    pub toxicity_policy: FailurePolicy,
    /// Target language (ISO 639-1). `None` disables translation.
    pub target_language: Option<String>,
    pub expand_numbers: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            version: 0,
            stop_words: Vec::new(),
            max_repeats_per_window: 3,
            repeat_window_secs: 30,
            dedupe_window_secs: 60,
            toxicity_threshold: None,
            toxicity_policy: FailurePolicy::FailClosed,
            target_language: None,
            expand_numbers: true,
        }
    }
}

/// A config snapshot with its denylist compiled once.
#[derive(Debug)]
pub struct CompiledFilterConfig {
    pub config: FilterConfig,
    pub stop_words: StopWordList,
}

/// Shared swap cell. All chains read the same handle; `set` replaces the
/// snapshot for messages evaluated after the swap.
#[derive(Debug)]
pub struct FilterConfigHandle {
    current: RwLock<Arc<CompiledFilterConfig>>,
}

impl FilterConfigHandle {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(CompiledFilterConfig {
                stop_words: StopWordList::compile(&config.stop_words),
                config,
            })),
        }
    }

    pub fn set(&self, mut config: FilterConfig) {
        let previous_version = self.current.read().config.version;
        config.version = previous_version + 1;
        tracing::info!("🔧 Filter config updated to version {}", config.version);
        *self.current.write() = Arc::new(CompiledFilterConfig {
            stop_words: StopWordList::compile(&config.stop_words),
            config,
        });
    }

    pub fn current(&self) -> Arc<CompiledFilterConfig> {
        self.current.read().clone()
    }
}

/// Why a message produced no utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Duplicate,
    StopWord,
    Repetition,
    Toxic,
    /// Scorer unavailable under a fail-closed policy.
    ScorerUnavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    /// Final spoken text after all transforms.
    Accepted(String),
    Rejected(RejectReason),
}

/// Per-source chain instance. Stateful stages (dedupe, repetition) are
/// per-source; configuration and collaborators are shared.
pub struct FilterChain {
    config: Arc<FilterConfigHandle>,
    scorer: Option<Arc<dyn ToxicityScorer>>,
    translator: Option<Arc<dyn Translator>>,
    dedupe: DedupeWindow,
    repeats: RepetitionTracker,
    state_version: u64,
}

impl FilterChain {
    pub fn new(
        config: Arc<FilterConfigHandle>,
        scorer: Option<Arc<dyn ToxicityScorer>>,
        translator: Option<Arc<dyn Translator>>,
    ) -> Self {
        let snapshot = config.current();
        let (dedupe, repeats) = Self::build_state(&snapshot.config);
        let state_version = snapshot.config.version;
        Self {
            config,
            scorer,
            translator,
            dedupe,
            repeats,
            state_version,
        }
    }

    fn build_state(config: &FilterConfig) -> (DedupeWindow, RepetitionTracker) {
        (
            DedupeWindow::new(ChronoDuration::seconds(config.dedupe_window_secs as i64)),
            RepetitionTracker::new(
                ChronoDuration::seconds(config.repeat_window_secs as i64),
                config.max_repeats_per_window,
            ),
        )
    }

    /// Evaluates one message. `spoken_seed` is the text the transform stages
    /// start from (it may carry the author prefix); predicates judge the
    /// message's own normalized text.
    pub async fn process(
        &mut self,
        message: &ChatMessage,
        spoken_seed: String,
        voice: &VoiceProfile,
    ) -> FilterOutcome {
        let snapshot = self.config.current();
        if snapshot.config.version != self.state_version {
            // Window lengths may have changed; stale history is discarded.
            let (dedupe, repeats) = Self::build_state(&snapshot.config);
            self.dedupe = dedupe;
            self.repeats = repeats;
            self.state_version = snapshot.config.version;
        }
        let config = &snapshot.config;

        // 1. dedupe
        if self
            .dedupe
            .check_and_record(&message.author, &message.raw_text, message.received_at)
        {
            return FilterOutcome::Rejected(RejectReason::Duplicate);
        }

        // 2. stop words + repetition throttle
        if snapshot.stop_words.matches(&message.raw_text) {
            return FilterOutcome::Rejected(RejectReason::StopWord);
        }
        if self.repeats.record(&message.author, message.received_at) {
            return FilterOutcome::Rejected(RejectReason::Repetition);
        }

        // 3. toxicity
        if let (Some(threshold), Some(scorer)) = (config.toxicity_threshold, &self.scorer) {
            match scorer.score(&message.raw_text).await {
                Ok(score) if score >= threshold => {
                    tracing::debug!(
                        "☣️ Message {} scored {:.2} (threshold {:.2})",
                        message.id,
                        score,
                        threshold
                    );
                    return FilterOutcome::Rejected(RejectReason::Toxic);
                }
                Ok(_) => {}
                Err(e) => match config.toxicity_policy {
                    FailurePolicy::FailClosed => {
                        tracing::warn!("⚠️ Toxicity scorer unavailable, rejecting: {}", e);
                        return FilterOutcome::Rejected(RejectReason::ScorerUnavailable);
                    }
                    FailurePolicy::FailOpen => {
                        tracing::warn!("⚠️ Toxicity scorer unavailable, passing through: {}", e);
                    }
                },
            }
        }

        // 4. translation (fail-open: the message is still informative
        //    untranslated)
        let mut text = spoken_seed;
        if let (Some(target), Some(translator)) = (&config.target_language, &self.translator) {
            match translator.translate(&text, target).await {
                Ok(translated) if !translated.trim().is_empty() => text = translated,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("⚠️ Translation failed, using original text: {}", e);
                }
            }
        }

        // 5. number expansion
        if config.expand_numbers {
            text = numbers::expand_numbers(&text, voice.language);
        }

        FilterOutcome::Accepted(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{MessageId, SourceKind, VoiceLanguage};
    use async_trait::async_trait;
    use chrono::Utc;
    use scoring::ScoringError;
    use translate::TranslationError;

    struct FixedScorer(f32);

    #[async_trait]
    impl ToxicityScorer for FixedScorer {
        async fn score(&self, _text: &str) -> Result<f32, ScoringError> {
            Ok(self.0)
        }
    }

    struct DownScorer;

    #[async_trait]
    impl ToxicityScorer for DownScorer {
        async fn score(&self, _text: &str) -> Result<f32, ScoringError> {
            Err(ScoringError::ServiceUnavailable("down".into()))
        }
    }

    struct FailingTranslator;

    #[async_trait]
    impl Translator for FailingTranslator {
        async fn translate(
            &self,
            _text: &str,
            _target: &str,
        ) -> Result<String, TranslationError> {
            Err(TranslationError::ServiceUnavailable("down".into()))
        }
    }

    struct UppercaseTranslator;

    #[async_trait]
    impl Translator for UppercaseTranslator {
        async fn translate(&self, text: &str, _target: &str) -> Result<String, TranslationError> {
            Ok(text.to_uppercase())
        }
    }

    fn message(id: &str, author: &str, text: &str) -> ChatMessage {
        ChatMessage {
            id: MessageId(id.to_string()),
            source: SourceKind::YouTube,
            author: author.to_string(),
            raw_text: text.to_string(),
            received_at: Utc::now(),
            source_sequence: 0,
        }
    }

    fn voice() -> VoiceProfile {
        VoiceProfile::new(VoiceLanguage::En, "en_0")
    }

    fn chain_with(config: FilterConfig) -> FilterChain {
        FilterChain::new(Arc::new(FilterConfigHandle::new(config)), None, None)
    }

    #[tokio::test]
    async fn test_stop_word_rejects() {
        let mut chain = chain_with(FilterConfig {
            stop_words: vec![StopWordRule::Substring("casino".into())],
            expand_numbers: false,
            ..Default::default()
        });
        let msg = message("1", "alice", "best casino in town");
        let outcome = chain.process(&msg, msg.raw_text.clone(), &voice()).await;
        assert_eq!(outcome, FilterOutcome::Rejected(RejectReason::StopWord));
    }

    #[tokio::test]
    async fn test_duplicate_rejected_second_time() {
        let mut chain = chain_with(FilterConfig {
            expand_numbers: false,
            ..Default::default()
        });
        let msg = message("1", "alice", "hello world");
        assert!(matches!(
            chain.process(&msg, msg.raw_text.clone(), &voice()).await,
            FilterOutcome::Accepted(_)
        ));
        let outcome = chain.process(&msg, msg.raw_text.clone(), &voice()).await;
        assert_eq!(outcome, FilterOutcome::Rejected(RejectReason::Duplicate));
    }

    #[tokio::test]
    async fn test_toxicity_threshold_boundary() {
        let config = FilterConfig {
            toxicity_threshold: Some(0.8),
            expand_numbers: false,
            ..Default::default()
        };

        let mut toxic_chain = FilterChain::new(
            Arc::new(FilterConfigHandle::new(config.clone())),
            Some(Arc::new(FixedScorer(0.8))),
            None,
        );
        let msg = message("1", "alice", "some message");
        assert_eq!(
            toxic_chain.process(&msg, msg.raw_text.clone(), &voice()).await,
            FilterOutcome::Rejected(RejectReason::Toxic)
        );

        let mut clean_chain = FilterChain::new(
            Arc::new(FilterConfigHandle::new(config)),
            Some(Arc::new(FixedScorer(0.79))),
            None,
        );
        let msg = message("2", "bob", "another message");
        assert!(matches!(
            clean_chain.process(&msg, msg.raw_text.clone(), &voice()).await,
            FilterOutcome::Accepted(_)
        ));
    }

    #[tokio::test]
    async fn test_scorer_outage_fail_closed_vs_fail_open() {
        let closed = FilterConfig {
            toxicity_threshold: Some(0.8),
            toxicity_policy: FailurePolicy::FailClosed,
            expand_numbers: false,
            ..Default::default()
        };
        let mut chain = FilterChain::new(
            Arc::new(FilterConfigHandle::new(closed.clone())),
            Some(Arc::new(DownScorer)),
            None,
        );
        let msg = message("1", "alice", "anything at all");
        assert_eq!(
            chain.process(&msg, msg.raw_text.clone(), &voice()).await,
            FilterOutcome::Rejected(RejectReason::ScorerUnavailable)
        );

        let open = FilterConfig {
            toxicity_policy: FailurePolicy::FailOpen,
            ..closed
        };
        let mut chain = FilterChain::new(
            Arc::new(FilterConfigHandle::new(open)),
            Some(Arc::new(DownScorer)),
            None,
        );
        let msg = message("2", "bob", "anything else");
        assert!(matches!(
            chain.process(&msg, msg.raw_text.clone(), &voice()).await,
            FilterOutcome::Accepted(_)
        ));
    }

    #[tokio::test]
    async fn test_translation_failure_falls_through_with_original() {
        let config = FilterConfig {
            target_language: Some("en".into()),
            expand_numbers: false,
            ..Default::default()
        };
        let mut chain = FilterChain::new(
            Arc::new(FilterConfigHandle::new(config)),
            None,
            Some(Arc::new(FailingTranslator)),
        );
        let msg = message("1", "alice", "bonjour tout le monde");
        let outcome = chain.process(&msg, msg.raw_text.clone(), &voice()).await;
        assert_eq!(
            outcome,
            FilterOutcome::Accepted("bonjour tout le monde".to_string())
        );
    }

    #[tokio::test]
    async fn test_translation_applies_before_number_expansion() {
        let config = FilterConfig {
            target_language: Some("en".into()),
            expand_numbers: true,
            ..Default::default()
        };
        let mut chain = FilterChain::new(
            Arc::new(FilterConfigHandle::new(config)),
            None,
            Some(Arc::new(UppercaseTranslator)),
        );
        let msg = message("1", "alice", "back in 5");
        let outcome = chain.process(&msg, msg.raw_text.clone(), &voice()).await;
        assert_eq!(outcome, FilterOutcome::Accepted("BACK IN five".to_string()));
    }

    #[tokio::test]
    async fn test_config_swap_applies_between_messages() {
        let handle = Arc::new(FilterConfigHandle::new(FilterConfig {
            expand_numbers: false,
            ..Default::default()
        }));
        let mut chain = FilterChain::new(handle.clone(), None, None);

        let msg = message("1", "alice", "wait 5 minutes");
        assert_eq!(
            chain.process(&msg, msg.raw_text.clone(), &voice()).await,
            FilterOutcome::Accepted("wait 5 minutes".to_string())
        );

        handle.set(FilterConfig {
            expand_numbers: true,
            ..Default::default()
        });

        let msg = message("2", "bob", "wait 5 more minutes");
        assert_eq!(
            chain.process(&msg, msg.raw_text.clone(), &voice()).await,
            FilterOutcome::Accepted("wait five more minutes".to_string())
        );
    }

    #[tokio::test]
    async fn test_repetition_throttle() {
        let mut chain = chain_with(FilterConfig {
            max_repeats_per_window: 2,
            expand_numbers: false,
            ..Default::default()
        });
        let voice = voice();
        for i in 0..2 {
            let msg = message(&format!("{i}"), "alice", &format!("message number {i}"));
            assert!(matches!(
                chain.process(&msg, msg.raw_text.clone(), &voice).await,
                FilterOutcome::Accepted(_)
            ));
        }
        let msg = message("9", "alice", "yet another message");
        assert_eq!(
            chain.process(&msg, msg.raw_text.clone(), &voice).await,
            FilterOutcome::Rejected(RejectReason::Repetition)
        );
    }
}
