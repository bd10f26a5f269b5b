//! Quota-limited polling source (YouTube live chat).
//!
//! The worker repeatedly asks the chat API for the next batch using a
//! continuation token and waits the interval the API dictates. Quota
//! exhaustion is terminal for the source: the daily quota resets outside our
//! control, so the worker reports and stops instead of burning requests.
//! Transient failures retry the same request with backoff, keeping the token
//! so no messages are skipped (at-least-once; duplicates are filtered
//! downstream).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use super::backoff::Backoff;
use super::{set_state, ConnectionState, RawChatEvent, SourceError, SourceHandle, SourceId};
use crate::chat::SourceKind;
use crate::pipeline::SourcePipeline;

/// Consecutive transient failures tolerated before the source gives up.
const MAX_CONSECUTIVE_ERRORS: u32 = 5;
/// Floor for the poll interval regardless of what the API returns.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One page of chat messages plus paging metadata.
#[derive(Debug, Clone)]
pub struct PollBatch {
    pub messages: Vec<RawChatEvent>,
    pub next_token: Option<String>,
    /// Minimum delay the API asks us to wait before the next request.
    pub min_interval: Duration,
}

#[derive(Debug, Error)]
pub enum PollError {
    /// Daily quota used up. Not retryable from here.
    #[error("API quota exceeded")]
    QuotaExceeded,

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Video is not a live stream or has no active chat")]
    NotLive,
}

impl From<PollError> for SourceError {
    fn from(e: PollError) -> Self {
        match e {
            PollError::QuotaExceeded => SourceError::QuotaExhausted,
            PollError::Transient(msg) => SourceError::Transient(msg),
            PollError::NotLive => {
                SourceError::Protocol("video has no active live chat".to_string())
            }
        }
    }
}

/// Polling chat API collaborator. The production implementation speaks the
/// YouTube Data API v3; tests drive the worker with scripted batches.
#[async_trait]
pub trait LiveChatApi: Send + Sync {
    async fn fetch(&self, page_token: Option<&str>) -> Result<PollBatch, PollError>;
}

/// Accepts a watch URL, short URL, embed URL, studio URL or a bare video id.
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if !input.contains("youtube.com") && !input.contains("youtu.be") {
        let bare = input.strip_prefix("watch?v=").unwrap_or(input);
        return Some(bare.to_string());
    }

    let stripped = input
        .strip_prefix("https://")
        .or_else(|| input.strip_prefix("http://"))
        .unwrap_or(input);
    let (host, path) = stripped.split_once('/')?;
    let (path, query) = match path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path, None),
    };

    if host.contains("youtu.be") {
        return path.split('/').next().filter(|s| !s.is_empty()).map(String::from);
    }
    if path.starts_with("watch") {
        return query?
            .split('&')
            .find_map(|kv| kv.strip_prefix("v="))
            .map(String::from);
    }
    if let Some(rest) = path.strip_prefix("embed/") {
        return rest.split('/').next_back().map(String::from);
    }
    // studio.youtube.com/video/<id>/livestreaming
    if let Some(rest) = path.strip_prefix("video/") {
        return rest.split('/').next().filter(|s| !s.is_empty()).map(String::from);
    }

    None
}

/// Production client for the YouTube Data API v3.
pub struct YouTubeDataApi {
    api_key: String,
    live_chat_id: String,
    client: reqwest::Client,
}

impl YouTubeDataApi {
    /// Resolves the active live chat id for a video and prepares the client.
    pub async fn connect(api_key: &str, url_or_id: &str) -> Result<Self, PollError> {
        let video_id = extract_video_id(url_or_id)
            .ok_or_else(|| PollError::Transient("could not determine video id".to_string()))?;

        tracing::info!("🎬 Resolving live chat id for video {}", video_id);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| PollError::Transient(e.to_string()))?;

        let url = format!(
            "https://www.googleapis.com/youtube/v3/videos?part=liveStreamingDetails&id={}&key={}",
            urlencoding::encode(&video_id),
            urlencoding::encode(api_key),
        );

        let response = client.get(&url).send().await.map_err(to_transient)?;
        let json = Self::check_response(response).await?;

        let live_chat_id = json
            .get("items")
            .and_then(|v| v.as_array()?.first())
            .and_then(|item| item.get("liveStreamingDetails"))
            .and_then(|d| d.get("activeLiveChatId"))
            .and_then(|v| v.as_str())
            .ok_or(PollError::NotLive)?
            .to_string();

        tracing::info!("✅ Connected to YouTube live chat {}", live_chat_id);

        Ok(Self {
            api_key: api_key.to_string(),
            live_chat_id,
            client,
        })
    }

    /// Maps HTTP/API errors onto the poll taxonomy. Quota reasons come back
    /// as 403 with a machine-readable reason field.
    async fn check_response(response: reqwest::Response) -> Result<serde_json::Value, PollError> {
        let status = response.status();
        let json: serde_json::Value = response.json().await.map_err(to_transient)?;

        if status.is_success() {
            return Ok(json);
        }

        let reason = json
            .get("error")
            .and_then(|e| e.get("errors"))
            .and_then(|v| v.as_array()?.first())
            .and_then(|e| e.get("reason"))
            .and_then(|v| v.as_str())
            .unwrap_or("");

        match reason {
            "quotaExceeded" | "dailyLimitExceeded" => Err(PollError::QuotaExceeded),
            "liveChatEnded" | "liveChatNotFound" | "liveChatDisabled" => Err(PollError::NotLive),
            _ => Err(PollError::Transient(format!(
                "HTTP {} (reason: {})",
                status,
                if reason.is_empty() { "unknown" } else { reason }
            ))),
        }
    }
}

fn to_transient(e: reqwest::Error) -> PollError {
    PollError::Transient(e.to_string())
}

#[async_trait]
impl LiveChatApi for YouTubeDataApi {
    async fn fetch(&self, page_token: Option<&str>) -> Result<PollBatch, PollError> {
        // Request only the fields we consume to keep the payload small.
        let fields = "nextPageToken,pollingIntervalMillis,\
             items(id,snippet(displayMessage),authorDetails(displayName,isChatOwner,isChatSponsor,isChatModerator))";

        let mut url = format!(
            "https://www.googleapis.com/youtube/v3/liveChat/messages?part=snippet,authorDetails&liveChatId={}&key={}&fields={}",
            urlencoding::encode(&self.live_chat_id),
            urlencoding::encode(&self.api_key),
            urlencoding::encode(fields),
        );
        if let Some(token) = page_token {
            url.push_str("&pageToken=");
            url.push_str(&urlencoding::encode(token));
        }

        let response = self.client.get(&url).send().await.map_err(to_transient)?;
        let json = Self::check_response(response).await?;

        let next_token = json
            .get("nextPageToken")
            .and_then(|v| v.as_str())
            .map(String::from);

        let min_interval = json
            .get("pollingIntervalMillis")
            .and_then(|v| v.as_u64())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(5));

        let messages = json
            .get("items")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().map(parse_item).collect())
            .unwrap_or_default();

        Ok(PollBatch {
            messages,
            next_token,
            min_interval,
        })
    }
}

fn parse_item(item: &serde_json::Value) -> RawChatEvent {
    let author_details = item.get("authorDetails");
    let is_member = ["isChatOwner", "isChatSponsor", "isChatModerator"]
        .iter()
        .any(|key| {
            author_details
                .and_then(|d| d.get(*key))
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
        });

    RawChatEvent {
        id: item.get("id").and_then(|v| v.as_str()).map(String::from),
        author: author_details
            .and_then(|d| d.get("displayName"))
            .and_then(|v| v.as_str())
            .map(String::from),
        text: item
            .get("snippet")
            .and_then(|s| s.get("displayMessage"))
            .and_then(|v| v.as_str())
            .map(String::from),
        is_member,
        source: SourceKind::YouTube,
    }
}

/// Spawns the polling worker for an already-connected chat API.
pub fn spawn(id: SourceId, api: Arc<dyn LiveChatApi>, pipeline: SourcePipeline) -> SourceHandle {
    let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();

    let join = tokio::spawn(run_polling(api, pipeline, state_tx, shutdown_rx));

    SourceHandle::new(id, SourceKind::YouTube, state_rx, shutdown_tx, join)
}

async fn run_polling(
    api: Arc<dyn LiveChatApi>,
    mut pipeline: SourcePipeline,
    state_tx: watch::Sender<ConnectionState>,
    mut shutdown_rx: mpsc::UnboundedReceiver<()>,
) {
    let mut page_token: Option<String> = None;
    let mut backoff = Backoff::for_polling();
    let mut consecutive_errors: u32 = 0;
    let mut request_count: u64 = 0;

    tracing::info!("🚀 YouTube polling worker started");

    loop {
        request_count += 1;

        let result = tokio::select! {
            _ = shutdown_rx.recv() => {
                set_state(&state_tx, ConnectionState::Stopped);
                tracing::info!("🛑 YouTube polling worker stopped");
                return;
            }
            result = api.fetch(page_token.as_deref()) => result,
        };

        match result {
            Ok(batch) => {
                consecutive_errors = 0;
                backoff.reset();
                set_state(&state_tx, ConnectionState::Live);

                if !batch.messages.is_empty() {
                    tracing::debug!(
                        "📬 Poll #{}: {} messages",
                        request_count,
                        batch.messages.len()
                    );
                }
                for event in batch.messages {
                    pipeline.handle_event(event).await;
                }

                // A missing token means the API lost the cursor; keep the old
                // one so the next request resumes from the same position.
                if batch.next_token.is_some() {
                    page_token = batch.next_token;
                }

                let wait = batch.min_interval.max(MIN_POLL_INTERVAL);
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        set_state(&state_tx, ConnectionState::Stopped);
                        return;
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            Err(PollError::QuotaExceeded) => {
                tracing::error!(
                    "🚨 YouTube API quota exhausted after {} requests; stopping source until restarted",
                    request_count
                );
                set_state(&state_tx, ConnectionState::QuotaExhausted);
                return;
            }
            Err(PollError::NotLive) => {
                tracing::error!("❌ Live chat ended or unavailable");
                set_state(&state_tx, ConnectionState::Failed);
                return;
            }
            Err(PollError::Transient(e)) => {
                consecutive_errors += 1;
                tracing::warn!(
                    "⚠️ Transient poll error ({}/{}): {}",
                    consecutive_errors,
                    MAX_CONSECUTIVE_ERRORS,
                    e
                );

                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    tracing::error!("🚨 Too many consecutive poll errors, giving up");
                    set_state(&state_tx, ConnectionState::Failed);
                    return;
                }

                set_state(&state_tx, ConnectionState::Reconnecting);
                let delay = backoff.next_delay();
                tracing::debug!("⏳ Retrying same page token in {:?}", delay);
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        set_state(&state_tx, ConnectionState::Stopped);
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
