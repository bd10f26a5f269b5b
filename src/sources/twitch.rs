//! Persistent-connection source (Twitch IRC over WebSocket).
//!
//! One long-lived connection per active channel. On unexpected disconnect
//! the worker re-subscribes with jittered exponential backoff; whatever was
//! said during the gap is gone (Twitch offers no replay), which is an
//! accepted at-most-once window. A manual stop always wins over reconnect.

use std::collections::VecDeque;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use regex::Regex;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use super::backoff::Backoff;
use super::{set_state, ConnectionState, RawChatEvent, SourceError, SourceHandle, SourceId};
use crate::chat::SourceKind;
use crate::pipeline::SourcePipeline;

const TWITCH_IRC_WS_URL: &str = "wss://irc-ws.chat.twitch.tv:443";
/// A connection that stayed live this long resets the reconnect backoff.
const SUSTAINED_LIVE: Duration = Duration::from_secs(60);
/// Idle read timeout before we proactively ping the server.
const PING_AFTER_IDLE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct TwitchConfig {
    pub channel: String,
    pub nickname: String,
    /// OAuth token, with or without the "oauth:" prefix.
    pub token: String,
}

/// One framed IRC connection. `next_line` yielding `Ok(None)` means the
/// server closed the stream (a disconnect, not a caller stop).
#[async_trait]
pub trait IrcTransport: Send {
    async fn send_line(&mut self, line: &str) -> Result<(), SourceError>;
    async fn next_line(&mut self) -> Result<Option<String>, SourceError>;
}

/// Connection factory so tests can script transports.
#[async_trait]
pub trait IrcConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn IrcTransport>, SourceError>;
}

/// Production connector: IRC framed over a WebSocket.
pub struct WsIrcConnector {
    url: String,
}

impl WsIrcConnector {
    pub fn new() -> Self {
        Self {
            url: TWITCH_IRC_WS_URL.to_string(),
        }
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for WsIrcConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IrcConnector for WsIrcConnector {
    async fn connect(&self) -> Result<Box<dyn IrcTransport>, SourceError> {
        tracing::info!("🌐 Connecting to {}", self.url);
        let (ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| SourceError::Disconnected(e.to_string()))?;
        Ok(Box::new(WsIrcTransport {
            ws,
            buffered: VecDeque::new(),
        }))
    }
}

struct WsIrcTransport {
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    // One WebSocket text frame may carry several CRLF-separated IRC lines.
    buffered: VecDeque<String>,
}

#[async_trait]
impl IrcTransport for WsIrcTransport {
    async fn send_line(&mut self, line: &str) -> Result<(), SourceError> {
        self.ws
            .send(Message::Text(format!("{line}\r\n").into()))
            .await
            .map_err(|e| SourceError::Disconnected(e.to_string()))
    }

    async fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        loop {
            if let Some(line) = self.buffered.pop_front() {
                return Ok(Some(line));
            }

            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    self.buffered.extend(
                        text.split("\r\n")
                            .filter(|l| !l.is_empty())
                            .map(String::from),
                    );
                }
                // tungstenite answers pings during reads; nothing to do here
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(SourceError::Disconnected(e.to_string())),
            }
        }
    }
}

/// Extracts a bare channel name from a channel URL, `#name`, `@name` or a
/// plain name.
pub fn parse_channel(input: &str) -> Option<String> {
    let input = input.trim().to_lowercase();
    if input.is_empty() {
        return None;
    }

    let name = if input.starts_with("http://") || input.starts_with("https://") {
        let rest = input
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        let (host, path) = rest.split_once('/')?;
        if !host.contains("twitch.tv") {
            return None;
        }
        path.split('/').next().unwrap_or_default().to_string()
    } else {
        input
    };

    let name: String = name
        .trim_start_matches(['@', '#'])
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn privmsg_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r":(\w+)!\w+@[\w.]+\.tmi\.twitch\.tv PRIVMSG #\w+ :(.*)").unwrap()
    })
}

/// Parses one IRC line into a raw chat event. Non-PRIVMSG lines yield `None`.
pub fn parse_privmsg(line: &str) -> Option<RawChatEvent> {
    let (tags, rest) = if let Some(stripped) = line.strip_prefix('@') {
        let (tags_str, rest) = stripped.split_once(' ')?;
        (parse_tags(tags_str), rest)
    } else {
        (Vec::new(), line)
    };

    let caps = privmsg_pattern().captures(rest)?;
    let username = caps.get(1)?.as_str().to_string();
    let text = caps.get(2)?.as_str().to_string();

    let tag = |key: &str| {
        tags.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };

    // Display name tag beats the login name when present.
    let author = match tag("display-name") {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => username,
    };
    let is_member =
        tag("subscriber") == Some("1") || tag("mod") == Some("1") || tag("vip") == Some("1");

    Some(RawChatEvent {
        id: tag("id").map(String::from),
        author: Some(author),
        text: Some(text),
        is_member,
        source: SourceKind::Twitch,
    })
}

fn parse_tags(tags_str: &str) -> Vec<(String, String)> {
    tags_str
        .split(';')
        .filter_map(|tag| {
            let (key, value) = tag.split_once('=')?;
            // IRCv3 escaping for tag values
            let value = value
                .replace(r"\s", " ")
                .replace(r"\:", ";")
                .replace(r"\\", "\\");
            Some((key.to_string(), value))
        })
        .collect()
}

/// Spawns the persistent-connection worker.
pub fn spawn(
    id: SourceId,
    connector: Box<dyn IrcConnector>,
    config: TwitchConfig,
    pipeline: SourcePipeline,
) -> SourceHandle {
    let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();

    let join = tokio::spawn(run_persistent(
        connector,
        config,
        pipeline,
        state_tx,
        shutdown_rx,
    ));

    SourceHandle::new(id, SourceKind::Twitch, state_rx, shutdown_tx, join)
}

async fn run_persistent(
    connector: Box<dyn IrcConnector>,
    config: TwitchConfig,
    mut pipeline: SourcePipeline,
    state_tx: watch::Sender<ConnectionState>,
    mut shutdown_rx: mpsc::UnboundedReceiver<()>,
) {
    let Some(channel) = parse_channel(&config.channel) else {
        tracing::error!("❌ Invalid Twitch channel: {}", config.channel);
        set_state(&state_tx, ConnectionState::Failed);
        return;
    };
    let token = config.token.trim_start_matches("oauth:").to_string();
    let nickname = config.nickname.to_lowercase();

    let mut backoff = Backoff::for_reconnect();
    let mut first_attempt = true;

    tracing::info!("🚀 Twitch worker started for #{}", channel);

    loop {
        if first_attempt {
            set_state(&state_tx, ConnectionState::Connecting);
            first_attempt = false;
        } else {
            set_state(&state_tx, ConnectionState::Reconnecting);
            let delay = backoff.next_delay();
            tracing::info!("⏳ Reconnecting to #{} in {:?}", channel, delay);
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    set_state(&state_tx, ConnectionState::Stopped);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let mut transport = tokio::select! {
            _ = shutdown_rx.recv() => {
                set_state(&state_tx, ConnectionState::Stopped);
                return;
            }
            result = connector.connect() => match result {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!("⚠️ Connect failed: {}", e);
                    continue;
                }
            },
        };

        if let Err(e) = login(&mut *transport, &token, &nickname, &channel).await {
            tracing::warn!("⚠️ Login attempt failed: {}", e);
            continue;
        }

        let session = read_loop(
            &mut *transport,
            &channel,
            &mut pipeline,
            &state_tx,
            &mut shutdown_rx,
        )
        .await;

        match session {
            SessionEnd::Stopped => {
                let _ = transport.send_line(&format!("PART #{channel}")).await;
                set_state(&state_tx, ConnectionState::Stopped);
                tracing::info!("🛑 Twitch worker stopped");
                return;
            }
            SessionEnd::AuthFailed => {
                // Bad credentials will not get better by retrying; renewal is
                // the credential layer's job.
                tracing::error!("❌ Twitch login rejected");
                set_state(&state_tx, ConnectionState::Failed);
                return;
            }
            SessionEnd::Disconnected { lived } => {
                tracing::warn!("🔌 Disconnected from #{} after {:?}", channel, lived);
                if lived >= SUSTAINED_LIVE {
                    backoff.reset();
                }
            }
        }
    }
}

enum SessionEnd {
    /// Caller-initiated stop.
    Stopped,
    /// Credentials rejected; terminal for the source.
    AuthFailed,
    /// Server-side drop; reconnect.
    Disconnected { lived: Duration },
}

async fn login(
    transport: &mut dyn IrcTransport,
    token: &str,
    nickname: &str,
    channel: &str,
) -> Result<(), SourceError> {
    transport
        .send_line("CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership")
        .await?;
    transport.send_line(&format!("PASS oauth:{token}")).await?;
    transport.send_line(&format!("NICK {nickname}")).await?;
    transport.send_line(&format!("JOIN #{channel}")).await?;
    Ok(())
}

async fn read_loop(
    transport: &mut dyn IrcTransport,
    channel: &str,
    pipeline: &mut SourcePipeline,
    state_tx: &watch::Sender<ConnectionState>,
    shutdown_rx: &mut mpsc::UnboundedReceiver<()>,
) -> SessionEnd {
    enum ReadEvent {
        Stop,
        IdlePing,
        Line(Result<Option<String>, SourceError>),
    }

    let connected_at = Instant::now();

    loop {
        let event = tokio::select! {
            _ = shutdown_rx.recv() => ReadEvent::Stop,
            line = transport.next_line() => ReadEvent::Line(line),
            _ = tokio::time::sleep(PING_AFTER_IDLE) => ReadEvent::IdlePing,
        };

        let line = match event {
            ReadEvent::Stop => return SessionEnd::Stopped,
            ReadEvent::IdlePing => {
                // Keep the connection warm when chat is quiet.
                if transport.send_line("PING :tmi.twitch.tv").await.is_err() {
                    return SessionEnd::Disconnected {
                        lived: connected_at.elapsed(),
                    };
                }
                continue;
            }
            ReadEvent::Line(line) => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                return SessionEnd::Disconnected {
                    lived: connected_at.elapsed(),
                }
            }
            Err(e) => {
                tracing::warn!("⚠️ Read error: {}", e);
                return SessionEnd::Disconnected {
                    lived: connected_at.elapsed(),
                };
            }
        };

        if line.contains("Login authentication failed") {
            return SessionEnd::AuthFailed;
        }

        if line.starts_with("PING") {
            if transport.send_line("PONG :tmi.twitch.tv").await.is_err() {
                return SessionEnd::Disconnected {
                    lived: connected_at.elapsed(),
                };
            }
            continue;
        }

        if line.contains(&format!("JOIN #{channel}")) {
            set_state(state_tx, ConnectionState::Live);
            continue;
        }

        if let Some(event) = parse_privmsg(&line) {
            pipeline.handle_event(event).await;
        }
    }
}
