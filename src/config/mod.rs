//! Configuration Module
//!
//! Handles application configuration loading, validation, and management.
//! API keys are never hard-coded: they come from the config file, the
//! environment, or a .env file loaded at startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// News API configuration
    #[serde(default)]
    pub news: NewsConfig,

    /// Speech services (recognition + synthesis)
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Headline translation service
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Microphone capture parameters
    #[serde(default)]
    pub audio: AudioConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// News API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    /// API key (loaded from NEWSAPI_KEY env var when not set here)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the headlines endpoint
    #[serde(default = "default_news_base_url")]
    pub base_url: String,
}

fn default_news_base_url() -> String {
    "https://newsapi.org".to_string()
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_news_base_url(),
        }
    }
}

/// Speech service configurations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Speech-to-text (Whisper-compatible API)
    #[serde(default)]
    pub stt: SttConfig,

    /// Text-to-speech (OpenAI-compatible API)
    #[serde(default)]
    pub tts: TtsConfig,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    /// API key (loaded from GROQ_API_KEY env var when not set here)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL (OpenAI-compatible, default: Groq)
    #[serde(default = "default_stt_base_url")]
    pub base_url: String,

    /// Transcription model
    #[serde(default = "default_stt_model")]
    pub model: String,
}

fn default_stt_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_stt_model() -> String {
    "whisper-large-v3-turbo".to_string()
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_stt_base_url(),
            model: default_stt_model(),
        }
    }
}

/// Text-to-speech configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// API key (loaded from OPENAI_API_KEY env var when not set here)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL (OpenAI-compatible)
    #[serde(default = "default_tts_base_url")]
    pub base_url: String,

    /// Synthesis model
    #[serde(default = "default_tts_model")]
    pub model: String,

    /// Voice name
    #[serde(default = "default_tts_voice")]
    pub voice: String,
}

fn default_tts_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_tts_voice() -> String {
    "alloy".to_string()
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_tts_base_url(),
            model: default_tts_model(),
            voice: default_tts_voice(),
        }
    }
}

/// Translation service configuration (LibreTranslate-compatible)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// Optional API key (loaded from LIBRETRANSLATE_API_KEY env var)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the translation endpoint
    #[serde(default = "default_translation_base_url")]
    pub base_url: String,
}

fn default_translation_base_url() -> String {
    "https://libretranslate.com".to_string()
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_translation_base_url(),
        }
    }
}

/// Microphone capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Fixed recording duration in seconds
    #[serde(default = "default_record_secs")]
    pub record_secs: u64,

    /// Target sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_record_secs() -> u64 {
    5
}

fn default_sample_rate() -> u32 {
    44_100
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            record_secs: default_record_secs(),
            sample_rate: default_sample_rate(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (used when RUST_LOG is not set)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Default configuration file path: `<config_dir>/voicetide/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("voicetide").join("config.toml"))
    }

    /// Load configuration from the default location, falling back to
    /// defaults when no file exists. Environment overrides are applied last.
    pub fn load() -> Result<Self> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::read_toml(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from an explicit path
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::read_toml(path.as_ref())?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn read_toml(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Overlay API keys from the environment. Env vars win over file values
    /// so a .env file is enough to run without any config.toml.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("NEWSAPI_KEY") {
            self.news.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            self.speech.stt.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.speech.tts.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("LIBRETRANSLATE_API_KEY") {
            self.translation.api_key = Some(key);
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.audio.record_secs == 0 || self.audio.record_secs > 60 {
            anyhow::bail!(
                "audio.record_secs must be between 1 and 60 (got {})",
                self.audio.record_secs
            );
        }
        if self.audio.sample_rate < 8_000 {
            anyhow::bail!(
                "audio.sample_rate must be at least 8000 Hz (got {})",
                self.audio.sample_rate
            );
        }
        Ok(())
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Whether the news API key is available (file or env)
    pub fn has_news_key(&self) -> bool {
        self.news.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.news.base_url, "https://newsapi.org");
        assert_eq!(config.audio.record_secs, 5);
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.speech.stt.model, "whisper-large-v3-turbo");
        assert_eq!(config.speech.tts.voice, "alloy");
        assert!(config.news.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_str = r#"
            [news]
            api_key = "abc123"

            [audio]
            record_secs = 3
        "#;
        let config: Config = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.news.api_key.as_deref(), Some("abc123"));
        assert_eq!(config.news.base_url, "https://newsapi.org");
        assert_eq!(config.audio.record_secs, 3);
        assert_eq!(config.audio.sample_rate, 44_100);
    }

    #[test]
    fn test_validate_rejects_bad_audio_values() {
        let mut config = Config::default();
        config.audio.record_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.audio.record_secs = 120;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.audio.sample_rate = 4_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.news.api_key = Some("round-trip-key".to_string());
        config.audio.record_secs = 7;
        config.save(&path).expect("save");

        let loaded = Config::read_toml(&path).expect("reload");
        assert_eq!(loaded.news.api_key.as_deref(), Some("round-trip-key"));
        assert_eq!(loaded.audio.record_secs, 7);
    }

    #[test]
    fn test_has_news_key() {
        let mut config = Config::default();
        assert!(!config.has_news_key());
        config.news.api_key = Some(String::new());
        assert!(!config.has_news_key());
        config.news.api_key = Some("k".to_string());
        assert!(config.has_news_key());
    }
}
