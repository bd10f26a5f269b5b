//! Raw platform events → canonical [`ChatMessage`].
//!
//! The normalizer fails closed: anything that cannot be turned into a
//! non-empty plain-text message is dropped and counted, never forwarded.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;

use crate::chat::{ChatMessage, MessageId, SourceKind};
use crate::sources::RawChatEvent;
use crate::stats::PipelineStats;

fn link_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:https?://|www\.)\S+").unwrap())
}

fn emoji_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            "[",
            "\u{1F1E6}-\u{1F1FF}", // flags
            "\u{1F300}-\u{1F5FF}", // symbols & pictographs
            "\u{1F600}-\u{1F64F}", // emoticons
            "\u{1F680}-\u{1F6FF}", // transport & map
            "\u{1F700}-\u{1FAFF}",
            "\u{2600}-\u{27BF}",
            "\u{24C2}-\u{1F251}",
            "]+",
        ))
        .unwrap()
    })
}

fn emoji_glue_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // ZWJ, variation selectors and skin tone modifiers that survive after the
    // main emoji codepoints were stripped.
    RE.get_or_init(|| Regex::new("[\u{200D}\u{FE0F}\u{1F3FB}-\u{1F3FF}]").unwrap())
}

fn symbol_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[^\w\s\.,!\?\-:'"\(\)]"#).unwrap())
}

fn whitespace_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Strips links, emotes and stray symbols down to speakable plain text.
pub fn clean_text(text: &str) -> String {
    let text = link_pattern().replace_all(text, "");
    let text = emoji_pattern().replace_all(&text, "");
    let text = emoji_glue_pattern().replace_all(&text, "");
    let text = symbol_pattern().replace_all(&text, " ");
    let text = whitespace_pattern().replace_all(&text, " ");
    text.trim().to_string()
}

/// Length and audience gates applied while normalizing.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Messages shorter than this (after cleaning) are dropped.
    pub min_length: usize,
    /// Messages longer than this are truncated with an ellipsis.
    pub max_length: usize,
    /// Only forward messages from channel members / subscribers.
    pub members_only: bool,
    /// Skip platform system lines ("subscribed", "donated", ...).
    pub ignore_system: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_length: 2,
            max_length: 200,
            members_only: false,
            ignore_system: true,
        }
    }
}

const SYSTEM_PREFIXES: &[&str] = &["subscribed", "donated", "became a member"];

/// Per-source normalizer. Owns the monotonic sequence counter for one
/// source connection; a reconnected source gets a fresh normalizer.
pub struct Normalizer {
    config: NormalizerConfig,
    next_sequence: u64,
    stats: Arc<PipelineStats>,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig, stats: Arc<PipelineStats>) -> Self {
        Self {
            config,
            next_sequence: 0,
            stats,
        }
    }

    /// Converts one raw event. `None` means the event was dropped (and
    /// counted when malformed); sequence numbers are only consumed by
    /// messages that are actually emitted.
    pub fn normalize(&mut self, event: RawChatEvent) -> Option<ChatMessage> {
        let Some(id) = event.id.filter(|id| !id.is_empty()) else {
            self.count_malformed("missing id");
            return None;
        };

        let author = match event.author {
            Some(a) if !a.trim().is_empty() => {
                // YouTube display names may carry a handle prefix.
                a.trim().trim_start_matches('@').to_string()
            }
            _ => "Anonymous".to_string(),
        };

        let Some(raw_text) = event.text else {
            self.count_malformed("missing text");
            return None;
        };

        if self.config.members_only && !event.is_member {
            return None;
        }

        if self.config.ignore_system
            && SYSTEM_PREFIXES.iter().any(|p| raw_text.starts_with(p))
        {
            return None;
        }

        let mut text = clean_text(&raw_text);
        if text.chars().count() < self.config.min_length {
            // Too short to speak. Empty-after-cleaning counts as malformed.
            if text.is_empty() {
                self.count_malformed("empty after cleaning");
            }
            return None;
        }
        if text.chars().count() > self.config.max_length {
            text = text.chars().take(self.config.max_length).collect::<String>() + "...";
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        Some(ChatMessage {
            id: MessageId(id),
            source: event.source,
            author,
            raw_text: text,
            received_at: Utc::now(),
            source_sequence: sequence,
        })
    }

    fn count_malformed(&self, reason: &str) {
        PipelineStats::incr(&self.stats.malformed);
        tracing::debug!("🗑️ Dropped malformed chat event: {}", reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, author: &str, text: &str) -> RawChatEvent {
        RawChatEvent {
            id: Some(id.to_string()),
            author: Some(author.to_string()),
            text: Some(text.to_string()),
            is_member: false,
            source: SourceKind::YouTube,
        }
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(NormalizerConfig::default(), Arc::new(PipelineStats::new()))
    }

    #[test]
    fn test_clean_text_strips_links() {
        assert_eq!(clean_text("check https://example.com now"), "check now");
        assert_eq!(clean_text("go to www.example.com please"), "go to please");
    }

    #[test]
    fn test_clean_text_strips_emoji() {
        assert_eq!(clean_text("hello 😀🎉 world"), "hello world");
        // skin tone modifier glue
        assert_eq!(clean_text("nice 👍🏽 one"), "nice one");
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("too    many   spaces"), "too many spaces");
    }

    #[test]
    fn test_sequence_is_monotonic_and_only_consumed_on_emit() {
        let mut n = normalizer();
        let a = n.normalize(event("1", "alice", "first message")).unwrap();
        // dropped: too short
        assert!(n.normalize(event("2", "bob", "x")).is_none());
        let b = n.normalize(event("3", "carol", "second message")).unwrap();
        assert_eq!(a.source_sequence, 0);
        assert_eq!(b.source_sequence, 1);
    }

    #[test]
    fn test_malformed_events_are_counted_not_forwarded() {
        let stats = Arc::new(PipelineStats::new());
        let mut n = Normalizer::new(NormalizerConfig::default(), stats.clone());

        let mut missing_text = event("1", "alice", "");
        missing_text.text = None;
        assert!(n.normalize(missing_text).is_none());

        // only emoji -> empty after cleaning
        assert!(n.normalize(event("2", "bob", "😀😀")).is_none());

        assert_eq!(PipelineStats::get(&stats.malformed), 2);
    }

    #[test]
    fn test_long_messages_are_truncated() {
        let mut n = normalizer();
        let long = "a".repeat(500);
        let msg = n.normalize(event("1", "alice", &long)).unwrap();
        assert_eq!(msg.raw_text.chars().count(), 203); // 200 + "..."
        assert!(msg.raw_text.ends_with("..."));
    }

    #[test]
    fn test_members_only_gate() {
        let mut n = Normalizer::new(
            NormalizerConfig {
                members_only: true,
                ..Default::default()
            },
            Arc::new(PipelineStats::new()),
        );
        let mut ev = event("1", "alice", "hello there");
        assert!(n.normalize(ev.clone()).is_none());
        ev.is_member = true;
        assert!(n.normalize(ev).is_some());
    }

    #[test]
    fn test_system_messages_skipped() {
        let mut n = normalizer();
        assert!(n.normalize(event("1", "yt", "subscribed for 3 months")).is_none());
        assert!(n.normalize(event("2", "yt", "hello everyone")).is_some());
    }

    #[test]
    fn test_author_fallback_and_handle_prefix() {
        let mut n = normalizer();
        let mut ev = event("1", "  ", "hello there");
        let msg = n.normalize(ev.clone()).unwrap();
        assert_eq!(msg.author, "Anonymous");

        ev.id = Some("2".to_string());
        ev.author = Some("@someone".to_string());
        let msg = n.normalize(ev).unwrap();
        assert_eq!(msg.author, "someone");
    }
}
