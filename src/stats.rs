//! Pipeline counters, mirrored to the status surface of the UI layer.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters updated by source workers and the playback task.
///
/// All counters are monotonic; readers only ever observe them, so relaxed
/// ordering is sufficient.
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Raw events received from all sources.
    pub received: AtomicU64,
    /// Events dropped by the normalizer (malformed / empty after cleaning).
    pub malformed: AtomicU64,
    /// Messages rejected as duplicates.
    pub duplicates: AtomicU64,
    /// Messages rejected by the stop-word / repetition predicate.
    pub spam: AtomicU64,
    /// Messages rejected by the toxicity predicate (including fail-closed).
    pub toxic: AtomicU64,
    /// Utterances accepted into the speech queue.
    pub enqueued: AtomicU64,
    /// Utterances fully spoken.
    pub spoken: AtomicU64,
    /// Synthesis failures that were skipped.
    pub synthesis_failures: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// One-line summary in the status-bar format of the UI layer.
    pub fn summary(&self) -> String {
        format!(
            "messages: {} | spoken: {} | spam: {} | toxic: {} | dropped(normalizer): {}",
            Self::get(&self.received),
            Self::get(&self.spoken),
            Self::get(&self.spam),
            Self::get(&self.toxic),
            Self::get(&self.malformed),
        )
    }
}
