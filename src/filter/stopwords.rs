//! Stop-word / spam predicate: configurable denylist plus a per-author
//! repetition throttle.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// One denylist entry. Matching is case-insensitive for exact and substring
/// entries; regex entries match as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum StopWordRule {
    Exact(String),
    Substring(String),
    Regex(String),
}

/// Compiled denylist. Built once per config version so per-message matching
/// does no allocation or regex compilation.
#[derive(Debug, Default)]
pub struct StopWordList {
    exact: Vec<String>,
    substrings: Vec<String>,
    regexes: Vec<regex::Regex>,
}

impl StopWordList {
    pub fn compile(rules: &[StopWordRule]) -> Self {
        let mut list = Self::default();
        for rule in rules {
            match rule {
                StopWordRule::Exact(word) => list.exact.push(word.to_lowercase()),
                StopWordRule::Substring(word) => list.substrings.push(word.to_lowercase()),
                StopWordRule::Regex(pattern) => match regex::Regex::new(pattern) {
                    Ok(re) => list.regexes.push(re),
                    Err(e) => {
                        tracing::warn!("⚠️ Ignoring invalid stop-word regex '{}': {}", pattern, e)
                    }
                },
            }
        }
        list
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.substrings.is_empty() && self.regexes.is_empty()
    }

    pub fn matches(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        if self
            .exact
            .iter()
            .any(|word| lowered.split_whitespace().any(|token| token == word))
        {
            return true;
        }
        if self.substrings.iter().any(|word| lowered.contains(word)) {
            return true;
        }
        self.regexes.iter().any(|re| re.is_match(text))
    }
}

/// Tracks how often each author repeated within a trailing window. An author
/// exceeding the threshold gets throttled until the window slides past.
#[derive(Debug)]
pub struct RepetitionTracker {
    window: ChronoDuration,
    max_per_window: u32,
    counts: HashMap<String, Vec<DateTime<Utc>>>,
}

impl RepetitionTracker {
    pub fn new(window: ChronoDuration, max_per_window: u32) -> Self {
        Self {
            window,
            max_per_window,
            counts: HashMap::new(),
        }
    }

    /// Records one message from `author` at `now`; returns true when the
    /// author is over the limit (the message should be rejected).
    pub fn record(&mut self, author: &str, now: DateTime<Utc>) -> bool {
        let cutoff = now - self.window;
        let entries = self.counts.entry(author.to_string()).or_default();
        entries.retain(|t| *t > cutoff);
        entries.push(now);

        // Opportunistic cleanup of authors that went quiet.
        if self.counts.len() > 1000 {
            self.counts.retain(|_, times| {
                times.retain(|t| *t > cutoff);
                !times.is_empty()
            });
        }

        entries.len() as u32 > self.max_per_window
    }
}
