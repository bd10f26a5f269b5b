//! Bounded speech queue between source workers and the playback task.
//!
//! Overflow policy is drop-newest: an enqueue at capacity rejects the
//! incoming utterance rather than evicting an admitted one, so whatever is
//! about to be spoken is never interrupted by a burst. Ordering is global
//! FIFO by enqueue time across all sources; a single voice cannot interleave
//! sources anyway, so there is no per-source fairness.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::chat::ProcessedUtterance;

pub const MIN_CAPACITY: usize = 1;
pub const MAX_CAPACITY: usize = 200;
pub const DEFAULT_CAPACITY: usize = 15;

#[derive(Debug)]
struct Inner {
    items: VecDeque<ProcessedUtterance>,
    capacity: usize,
}

/// The only structure in the pipeline mutated by more than one task.
/// Capacity check and insertion happen under one lock, so two racing
/// enqueues can never both take the last slot.
#[derive(Debug)]
pub struct SpeechQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl SpeechQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                capacity: capacity.clamp(MIN_CAPACITY, MAX_CAPACITY),
            }),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Non-blocking admission. Returns false when the utterance was refused:
    /// at capacity (counted as a drop) or after close (not counted; closing
    /// is shutdown, not overflow).
    pub fn enqueue(&self, utterance: ProcessedUtterance) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        {
            let mut inner = self.inner.lock();
            if inner.items.len() >= inner.capacity {
                drop(inner);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            inner.items.push_back(utterance);
        }

        self.notify.notify_one();
        true
    }

    /// Waits for the next utterance. Returns `None` once the queue is closed
    /// AND drained; utterances enqueued before `close` are still delivered.
    pub async fn dequeue(&self) -> Option<ProcessedUtterance> {
        loop {
            // Register interest before checking, so a notify between the
            // check and the await is not lost.
            let notified = self.notify.notified();

            {
                let mut inner = self.inner.lock();
                if let Some(utterance) = inner.items.pop_front() {
                    return Some(utterance);
                }
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }

            notified.await;
        }
    }

    /// Non-blocking variant used by tests and shutdown drains.
    pub fn try_dequeue(&self) -> Option<ProcessedUtterance> {
        self.inner.lock().items.pop_front()
    }

    /// Idempotent. Wakes every blocked `dequeue`; subsequent enqueues are
    /// refused.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("🔇 Speech queue closed");
        }
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Total utterances refused because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Applies to subsequent enqueues. Shrinking below the current length
    /// does not evict admitted utterances; they drain naturally.
    pub fn set_capacity(&self, capacity: usize) {
        let capacity = capacity.clamp(MIN_CAPACITY, MAX_CAPACITY);
        self.inner.lock().capacity = capacity;
        tracing::info!("🔧 Speech queue capacity set to {}", capacity);
    }
}
