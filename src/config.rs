//! アプリケーション設定管理モジュール
//!
//! XDGディレクトリを使用した設定ファイルの永続化と管理を提供します。

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chat::{VoiceLanguage, VoiceProfile};
use crate::filter::FilterConfig;
use crate::normalize::NormalizerConfig;
use crate::pipeline::VoiceSettings;
use crate::playback::synth::HttpSynthesizerConfig;
use crate::playback::PlaybackOptions;
use crate::queue::DEFAULT_CAPACITY;

/// 音声設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub language: VoiceLanguage,
    pub speaker: String,
    pub volume: f32,
    pub speed: f32,
    /// 投稿者名を読み上げる
    pub read_author_names: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            language: VoiceLanguage::En,
            speaker: VoiceLanguage::En.default_speaker().to_string(),
            volume: 1.0,
            speed: 1.0,
            read_author_names: false,
        }
    }
}

impl VoiceConfig {
    pub fn to_settings(&self) -> VoiceSettings {
        VoiceSettings {
            profile: VoiceProfile::new(self.language, self.speaker.clone()),
            volume: self.volume,
            speed: self.speed,
            read_author_names: self.read_author_names,
        }
    }
}

/// 読み上げキュー・再生設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// キュー深度（読み上げ待ちメッセージ数の上限）
    pub queue_capacity: usize,
    /// メッセージ間の待機時間（ミリ秒）
    pub delay_between_ms: u64,
    /// TTSサーバーのホスト
    pub tts_host: String,
    /// TTSサーバーのポート
    pub tts_port: u16,
    /// 話者名 → TTSサーバーの話者ID
    pub speaker_ids: HashMap<String, u32>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_CAPACITY,
            delay_between_ms: 1500,
            tts_host: "localhost".to_string(),
            tts_port: 50021,
            speaker_ids: HashMap::new(),
        }
    }
}

impl PlaybackConfig {
    pub fn synthesizer_config(&self) -> HttpSynthesizerConfig {
        HttpSynthesizerConfig {
            host: self.tts_host.clone(),
            port: self.tts_port,
            speaker_ids: self.speaker_ids.clone(),
        }
    }

    pub fn playback_options(&self) -> PlaybackOptions {
        PlaybackOptions {
            inter_utterance_delay: Duration::from_millis(self.delay_between_ms),
        }
    }
}

/// 外部サービス設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// 毒性スコアリングサービスのエンドポイント（Noneで無効）
    pub toxicity_endpoint: Option<String>,
    /// 翻訳サービスのエンドポイント（Noneで無効）
    pub translation_endpoint: Option<String>,
}

/// ログ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// ログレベル (trace/debug/info/warn/error)
    pub log_level: String,
    /// ファイル出力有効化
    pub enable_file_logging: bool,
    /// カスタムログディレクトリ（Noneの場合はXDGデフォルト使用）
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            enable_file_logging: false,
            log_dir: None,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// 設定管理マネージャー
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// 新しい設定マネージャーを作成
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::with_path(config_path)
    }

    pub fn with_path(config_path: PathBuf) -> Result<Self> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        Ok(Self { config_path })
    }

    /// XDGディレクトリに基づく設定ファイルパスを取得
    fn default_config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("dev", "sifyfy", "chatvox")
            .context("Failed to get project directories")?;

        let config_file = project_dirs.config_dir().join("config.toml");
        debug!("Config file path: {}", config_file.display());
        Ok(config_file)
    }

    /// 設定を読み込み
    pub fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!(
                "Config file not found, using default settings: {}",
                self.config_path.display()
            );
            return Ok(AppConfig::default());
        }

        let config_content = fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;

        let config: AppConfig = toml::from_str(&config_content).with_context(|| {
            format!(
                "Failed to parse config file: {}",
                self.config_path.display()
            )
        })?;

        info!(
            "✅ Configuration loaded from: {}",
            self.config_path.display()
        );

        Ok(config)
    }

    /// 設定を保存
    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        let config_content =
            toml::to_string_pretty(config).context("Failed to serialize config")?;

        fs::write(&self.config_path, config_content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;

        info!("💾 Configuration saved to: {}", self.config_path.display());
        Ok(())
    }
}
