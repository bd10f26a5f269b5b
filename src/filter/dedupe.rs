//! Dedupe predicate: rejects a message whose author+text was already seen
//! within a short trailing window. Polling retries and reconnects both
//! produce duplicates, so this is the first stage of the chain.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Upper bound on remembered entries regardless of the window length, so a
/// very busy chat cannot grow the map without bound.
const MAX_ENTRIES: usize = 2048;

#[derive(Debug)]
pub struct DedupeWindow {
    window: ChronoDuration,
    seen: HashMap<u64, DateTime<Utc>>,
    order: VecDeque<u64>,
}

impl DedupeWindow {
    pub fn new(window: ChronoDuration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Records author+text and reports whether it was already seen inside
    /// the window.
    pub fn check_and_record(&mut self, author: &str, text: &str, now: DateTime<Utc>) -> bool {
        let key = Self::key(author, text);
        self.evict(now);

        if let Some(seen_at) = self.seen.get(&key) {
            if now - *seen_at <= self.window {
                return true;
            }
        }

        self.seen.insert(key, now);
        self.order.push_back(key);
        while self.order.len() > MAX_ENTRIES {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        false
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        while let Some(oldest) = self.order.front() {
            match self.seen.get(oldest) {
                Some(t) if *t <= cutoff => {
                    self.seen.remove(oldest);
                    self.order.pop_front();
                }
                // Key re-recorded later or already gone; drop the stale slot.
                None => {
                    self.order.pop_front();
                }
                _ => break,
            }
        }
    }

    fn key(author: &str, text: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        author.to_lowercase().hash(&mut hasher);
        text.to_lowercase().hash(&mut hasher);
        hasher.finish()
    }
}
