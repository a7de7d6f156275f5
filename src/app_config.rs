use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::PipelineOptions;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (DeepL style, detected when absent)
    #[serde(default)]
    pub source_language: Option<String>,

    /// Target language code (DeepL style, e.g. "EN-US")
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Translation service settings
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Speech synthesis settings
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Card pipeline tuning
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Where decks and media end up
    #[serde(default)]
    pub output: OutputConfig,

    /// Import into a running Anki after export
    #[serde(default)]
    pub anki: AnkiConnectConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// DeepL translation configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// DeepL authentication key
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Service endpoint URL; picked from the key type when empty
    #[serde(default = "String::new")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl TranslationConfig {
    /// Get the endpoint to use, honoring the DeepL free/pro key split
    pub fn get_endpoint(&self) -> String {
        if !self.endpoint.is_empty() {
            return self.endpoint.clone();
        }

        // Free-tier keys carry a ":fx" suffix and only work against api-free
        if self.api_key.ends_with(":fx") {
            default_deepl_free_endpoint()
        } else {
            default_deepl_pro_endpoint()
        }
    }
}

/// OpenAI speech configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpeechConfig {
    /// Whether cards get audio
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// API key for the service
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Service endpoint URL
    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,

    /// Speech model name
    #[serde(default = "default_speech_model")]
    pub model: String,

    /// Voice name
    #[serde(default = "default_speech_voice")]
    pub voice: String,

    /// Request timeout in seconds
    #[serde(default = "default_speech_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: String::new(),
            endpoint: default_openai_endpoint(),
            model: default_speech_model(),
            voice: default_speech_voice(),
            timeout_secs: default_speech_timeout_secs(),
        }
    }
}

/// Pipeline tuning knobs
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineSettings {
    /// Maximum number of cards processed at once (speech API rate limits)
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,

    /// Number of progress events buffered between pipeline and display
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// How often the display drains progress events, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long an aborted run waits for in-flight cards, in milliseconds
    #[serde(default = "default_abort_grace_ms")]
    pub abort_grace_ms: u64,

    /// How long the pipeline waits for the display to make room for progress, in milliseconds
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrent_requests: default_concurrent_requests(),
            channel_capacity: default_channel_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
            abort_grace_ms: default_abort_grace_ms(),
            stall_timeout_ms: default_stall_timeout_ms(),
        }
    }
}

impl PipelineSettings {
    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Build pipeline options from these settings
    pub fn to_options(&self, audio_enabled: bool) -> PipelineOptions {
        PipelineOptions {
            concurrency: self.concurrent_requests,
            audio_enabled,
            channel_capacity: self.channel_capacity,
            abort_grace: Duration::from_millis(self.abort_grace_ms),
            stall_timeout: Duration::from_millis(self.stall_timeout_ms),
        }
    }
}

/// Output locations
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct OutputConfig {
    /// Directory exported decks are written to
    #[serde(default)]
    pub deck_dir: Option<PathBuf>,

    /// Directory synthesized audio is written to while a run is active
    #[serde(default)]
    pub media_dir: Option<PathBuf>,
}

impl OutputConfig {
    /// Deck directory, defaulting to the user data directory
    pub fn get_deck_dir(&self) -> Result<PathBuf> {
        match &self.deck_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(data_dir()?.join("Decks")),
        }
    }

    /// Media directory, defaulting to the user data directory
    pub fn get_media_dir(&self) -> Result<PathBuf> {
        match &self.media_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(data_dir()?.join("media")),
        }
    }
}

/// AnkiConnect import settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnkiConnectConfig {
    /// Whether finished decks are imported into Anki
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address the AnkiConnect add-on listens on
    #[serde(default = "default_anki_connect_endpoint")]
    pub endpoint: String,

    /// Note type cards are added with
    #[serde(default = "default_anki_model_name")]
    pub model_name: String,

    /// Request timeout in seconds
    #[serde(default = "default_anki_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnkiConnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_anki_connect_endpoint(),
            model_name: default_anki_model_name(),
            timeout_secs: default_anki_timeout_secs(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Matching `log` filter
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

const APP_DIRNAME: &str = "kobo-anki";

fn data_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
        .ok_or_else(|| anyhow!("Could not determine data directory"))?;
    Ok(base_dir.join(APP_DIRNAME))
}

fn default_target_language() -> String {
    "EN-US".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_speech_timeout_secs() -> u64 {
    60
}

fn default_concurrent_requests() -> usize {
    2
}

fn default_channel_capacity() -> usize {
    64
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_abort_grace_ms() -> u64 {
    2000
}

fn default_stall_timeout_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

fn default_deepl_free_endpoint() -> String {
    "https://api-free.deepl.com".to_string()
}

fn default_deepl_pro_endpoint() -> String {
    "https://api.deepl.com".to_string()
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_speech_model() -> String {
    "tts-1".to_string()
}

fn default_speech_voice() -> String {
    "nova".to_string()
}

fn default_anki_connect_endpoint() -> String {
    "http://localhost:8765".to_string()
}

fn default_anki_model_name() -> String {
    "kobo-anki".to_string()
}

fn default_anki_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Load the configuration from a JSON file, writing a default one when missing
    pub fn load_or_create<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();
        if config_path.exists() {
            let file = File::open(config_path)
                .with_context(|| format!("Failed to open config file: {:?}", config_path))?;
            let reader = BufReader::new(file);
            let config: Config = serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;
            return Ok(config);
        }

        warn!("Config file not found at {:?}, creating default config.", config_path);
        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;
        std::fs::write(config_path, config_json)
            .with_context(|| format!("Failed to write default config to file: {:?}", config_path))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.target_language.trim().is_empty() {
            return Err(anyhow!("Target language must not be empty"));
        }

        if self.translation.api_key.is_empty() {
            return Err(anyhow!("DeepL API key is required for translation"));
        }

        if self.speech.enabled && self.speech.api_key.is_empty() {
            return Err(anyhow!("OpenAI API key is required for audio generation"));
        }

        if self.pipeline.concurrent_requests == 0 {
            return Err(anyhow!("pipeline.concurrent_requests must be at least 1"));
        }

        if self.pipeline.channel_capacity == 0 {
            return Err(anyhow!("pipeline.channel_capacity must be at least 1"));
        }

        if self.anki.enabled && url::Url::parse(&self.anki.endpoint).is_err() {
            return Err(anyhow!("anki.endpoint '{}' is not a valid URL", self.anki.endpoint));
        }

        // The display must drain progress at sub-second latency
        if self.pipeline.poll_interval_ms == 0 || self.pipeline.poll_interval_ms > 1000 {
            return Err(anyhow!("pipeline.poll_interval_ms must be between 1 and 1000"));
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: None,
            target_language: default_target_language(),
            translation: TranslationConfig::default(),
            speech: SpeechConfig::default(),
            pipeline: PipelineSettings::default(),
            output: OutputConfig::default(),
            anki: AnkiConnectConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
