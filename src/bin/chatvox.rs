//! chatvox CLI: reads live chat, speaks it.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use chatvox::config::{AppConfig, ConfigManager};
use chatvox::filter::scoring::{HttpToxicityScorer, ToxicityScorer};
use chatvox::filter::translate::{HttpTranslator, Translator};
use chatvox::playback::output::RodioOutput;
use chatvox::playback::synth::HttpSynthesizer;
use chatvox::sources::twitch::TwitchConfig;
use chatvox::{ChatvoxResult, Collaborators, Orchestrator, SourceSpec, VoiceProfile};

#[derive(Debug, Parser)]
#[command(name = "chatvox", about = "Live stream chat to speech bridge")]
struct Args {
    /// Path to config.toml (defaults to the XDG config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// YouTube watch URL or video id to read chat from
    #[arg(long)]
    youtube: Option<String>,

    /// YouTube Data API key (or CHATVOX_YT_API_KEY)
    #[arg(long)]
    youtube_api_key: Option<String>,

    /// Twitch channel name or URL to read chat from
    #[arg(long)]
    twitch: Option<String>,

    /// Twitch IRC nickname (or CHATVOX_TWITCH_NICK)
    #[arg(long)]
    twitch_nick: Option<String>,

    /// Twitch OAuth token (or CHATVOX_TWITCH_TOKEN)
    #[arg(long)]
    twitch_token: Option<String>,

    /// Override the configured voice speaker
    #[arg(long)]
    speaker: Option<String>,

    /// Override the configured volume (0.0-1.0)
    #[arg(long)]
    volume: Option<f32>,

    /// Override the configured speech rate (0.5-2.0)
    #[arg(long)]
    speed: Option<f32>,

    /// Override the configured queue depth (1-200)
    #[arg(long)]
    queue_capacity: Option<usize>,
}

#[tokio::main]
async fn main() -> ChatvoxResult<()> {
    let args = Args::parse();

    let config_manager = match &args.config {
        Some(path) => ConfigManager::with_path(path.clone())?,
        None => ConfigManager::new()?,
    };
    let mut config = config_manager.load_config().unwrap_or_else(|e| {
        eprintln!("Config load failed, using defaults: {e}");
        AppConfig::default()
    });

    apply_overrides(&mut config, &args);

    let _log_guard = chatvox::logging::init_logging(&config.log)?;
    tracing::info!("🎬 Starting chatvox");

    // Collaborators: TTS + audio always; scoring/translation when configured
    let synthesizer = Arc::new(HttpSynthesizer::new(config.playback.synthesizer_config()));
    match synthesizer.test_connection().await {
        Ok(true) => {}
        Ok(false) => tracing::warn!("⚠️ TTS server answered but is not healthy"),
        Err(e) => tracing::warn!("⚠️ TTS server not reachable yet: {}", e),
    }

    let toxicity_scorer: Option<Arc<dyn ToxicityScorer>> = config
        .services
        .toxicity_endpoint
        .as_ref()
        .map(|endpoint| Arc::new(HttpToxicityScorer::new(endpoint.clone())) as _);
    let translator: Option<Arc<dyn Translator>> = config
        .services
        .translation_endpoint
        .as_ref()
        .map(|endpoint| Arc::new(HttpTranslator::new(endpoint.clone())) as _);

    let orchestrator = Arc::new(Orchestrator::new(
        Collaborators {
            synthesizer,
            audio_output: Arc::new(RodioOutput::new()),
            toxicity_scorer,
            translator,
        },
        config.filters.clone(),
        config.normalizer.clone(),
        config.voice.to_settings(),
        config.playback.queue_capacity,
        config.playback.playback_options(),
    ));

    let mut added = 0;
    if let Some(youtube) = &args.youtube {
        let api_key = args
            .youtube_api_key
            .clone()
            .or_else(|| std::env::var("CHATVOX_YT_API_KEY").ok())
            .ok_or_else(|| {
                chatvox::ChatvoxError::Config(
                    "--youtube requires --youtube-api-key or CHATVOX_YT_API_KEY".to_string(),
                )
            })?;
        let id = orchestrator
            .add_source(SourceSpec::YouTube {
                api_key,
                url_or_id: youtube.clone(),
            })
            .await?;
        tracing::info!("📺 YouTube source {} attached", id);
        added += 1;
    }

    if let Some(twitch) = &args.twitch {
        let nickname = args
            .twitch_nick
            .clone()
            .or_else(|| std::env::var("CHATVOX_TWITCH_NICK").ok());
        let token = args
            .twitch_token
            .clone()
            .or_else(|| std::env::var("CHATVOX_TWITCH_TOKEN").ok());
        let (nickname, token) = match (nickname, token) {
            (Some(n), Some(t)) => (n, t),
            _ => {
                return Err(chatvox::ChatvoxError::Config(
                    "--twitch requires --twitch-nick and --twitch-token".to_string(),
                ))
            }
        };
        let id = orchestrator
            .add_source(SourceSpec::Twitch(TwitchConfig {
                channel: twitch.clone(),
                nickname,
                token,
            }))
            .await?;
        tracing::info!("💜 Twitch source {} attached", id);
        added += 1;
    }

    if added == 0 {
        return Err(chatvox::ChatvoxError::Config(
            "no sources given; pass --youtube and/or --twitch".to_string(),
        ));
    }

    // Ctrl+Cシグナルハンドラー
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .map_err(|e| chatvox::ChatvoxError::Config(format!("Failed to set signal handler: {e}")))?;

    // Periodic status line until shutdown
    let mut status_interval = tokio::time::interval(tokio::time::Duration::from_secs(30));
    status_interval.tick().await; // first tick fires immediately
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("🛑 終了シグナルを受信しました");
                break;
            }
            _ = status_interval.tick() => {
                tracing::info!(
                    "📊 {} | in queue: {} | dropped: {}",
                    orchestrator.stats().summary(),
                    orchestrator.queue_len(),
                    orchestrator.dropped_count(),
                );
                for (id, state) in orchestrator.connection_states() {
                    tracing::debug!("🔌 source {}: {:?}", id, state);
                }
            }
        }
    }

    orchestrator.shutdown().await?;
    tracing::info!("👋 chatvox shutting down");
    Ok(())
}

fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(speaker) = &args.speaker {
        // keep the override consistent with the speaker table
        let profile = VoiceProfile::new(config.voice.language, speaker.clone());
        config.voice.speaker = profile.speaker;
    }
    if let Some(volume) = args.volume {
        config.voice.volume = volume;
    }
    if let Some(speed) = args.speed {
        config.voice.speed = speed;
    }
    if let Some(capacity) = args.queue_capacity {
        config.playback.queue_capacity = capacity;
    }
}
