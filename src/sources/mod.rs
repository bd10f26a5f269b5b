//! Chat sources: one worker task per active platform connection.
//!
//! A source is started once and never restarted through the same handle;
//! a fresh start yields a fresh event sequence. Two variants exist:
//! the quota-limited polling source ([`youtube`]) and the persistent
//! reconnect-on-drop source ([`twitch`]).

pub mod backoff;
pub mod twitch;
pub mod youtube;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::chat::SourceKind;

/// Connection lifecycle of one source, written only by its own worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Live,
    Reconnecting,
    /// Daily API quota exhausted; the source stopped itself and will not
    /// retry until explicitly restarted.
    QuotaExhausted,
    Stopped,
    Failed,
}

/// Identifier assigned by the orchestrator when a source is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub struct SourceId(pub u64);

/// Raw platform event before normalization.
#[derive(Debug, Clone)]
pub struct RawChatEvent {
    pub id: Option<String>,
    pub author: Option<String>,
    pub text: Option<String>,
    pub is_member: bool,
    pub source: SourceKind,
}

/// Source-level error taxonomy. Retry policy depends on the variant:
/// quota exhaustion is terminal for the source, transient errors retry with
/// bounded backoff, disconnects retry indefinitely while the source is live.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("API quota exhausted")]
    QuotaExhausted,

    #[error("Transient network error: {0}")]
    Transient(String),

    #[error("Connection dropped: {0}")]
    Disconnected(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Handle to a running source worker.
///
/// Dropping the handle does NOT stop the worker; call [`SourceHandle::stop`].
#[derive(Debug)]
pub struct SourceHandle {
    pub id: SourceId,
    pub kind: SourceKind,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: mpsc::UnboundedSender<()>,
    join: JoinHandle<()>,
}

impl SourceHandle {
    pub(crate) fn new(
        id: SourceId,
        kind: SourceKind,
        state_rx: watch::Receiver<ConnectionState>,
        shutdown_tx: mpsc::UnboundedSender<()>,
        join: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            kind,
            state_rx,
            shutdown_tx,
            join,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Watch stream of connection state changes for the UI layer.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Requests the worker to stop. The in-flight network call is abandoned
    /// promptly; filtered-but-unqueued work is not drained.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Stops the worker and waits for it to finish.
    pub async fn stop_and_join(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.join.await;
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Publishes a state change, logging the transition.
pub(crate) fn set_state(tx: &watch::Sender<ConnectionState>, state: ConnectionState) {
    if *tx.borrow() != state {
        tracing::info!("🔄 Source state -> {:?}", state);
    }
    let _ = tx.send(state);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_display() {
        assert_eq!(
            format!("{}", SourceError::QuotaExhausted),
            "API quota exhausted"
        );
        assert!(format!("{}", SourceError::Transient("timeout".into())).contains("timeout"));
    }

    #[tokio::test]
    async fn test_handle_state_and_stop() {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, mut shutdown_rx) = mpsc::unbounded_channel();
        let join = tokio::spawn(async move {
            shutdown_rx.recv().await;
            let _ = state_tx.send(ConnectionState::Stopped);
        });

        let handle = SourceHandle::new(
            SourceId(1),
            SourceKind::YouTube,
            state_rx,
            shutdown_tx,
            join,
        );
        assert_eq!(handle.state(), ConnectionState::Connecting);

        let mut watched = handle.subscribe_state();
        handle.stop_and_join().await;
        watched.changed().await.unwrap();
        assert_eq!(*watched.borrow(), ConnectionState::Stopped);
    }
}
