use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::Path;
use std::time::Duration;

use crate::audio::{Encoder, MergeStrategy};
use crate::backends::edge::{DEFAULT_QUOTE_PITCH, EDGE_OUTPUT_FORMAT};
use crate::document::NewlineMode;
use crate::synthesis::pause::{
    DEFAULT_BREAK_DURATION_MS, DEFAULT_QUOTE_MARKER, DEFAULT_QUOTE_PAUSE_MS, PauseProtocol,
};
use crate::synthesis::retry::RetryPolicy;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Language of the book as a locale hint (e.g. "en-US", "zh-CN")
    pub language: String,

    /// TTS backend config
    pub tts: TtsConfig,

    /// Chunking settings
    #[serde(default)]
    pub segmentation: SegmentationConfig,

    /// Pause markers and durations
    #[serde(default)]
    pub pauses: PauseConfig,

    /// Fragment merging
    #[serde(default)]
    pub audio: AudioConfig,

    /// Retry and token renewal
    #[serde(default)]
    pub retry: RetryConfig,

    /// Output selection and layout
    #[serde(default)]
    pub output: OutputConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// TTS provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TtsProvider {
    // @provider: Azure Cognitive Services Speech
    #[default]
    Azure,
    // @provider: OpenAI speech API
    #[serde(rename = "openai")]
    OpenAI,
    // @provider: Any server exposing the OpenAI speech API
    #[serde(rename = "openai_compatible")]
    OpenAICompatible,
    // @provider: Edge read-aloud voices through the edge-tts client
    Edge,
    // @provider: Local piper executable
    Piper,
    // @provider: In-process tone generator
    Mock,
}

impl TtsProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Azure => "Azure",
            Self::OpenAI => "OpenAI",
            Self::OpenAICompatible => "OpenAI-compatible",
            Self::Edge => "Edge",
            Self::Piper => "Piper",
            Self::Mock => "Mock",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Azure => "azure".to_string(),
            Self::OpenAI => "openai".to_string(),
            Self::OpenAICompatible => "openai_compatible".to_string(),
            Self::Edge => "edge".to_string(),
            Self::Piper => "piper".to_string(),
            Self::Mock => "mock".to_string(),
        }
    }

    pub fn all() -> [TtsProvider; 6] {
        [
            Self::Azure,
            Self::OpenAI,
            Self::OpenAICompatible,
            Self::Edge,
            Self::Piper,
            Self::Mock,
        ]
    }
}

// Implement Display trait for TtsProvider
impl std::fmt::Display for TtsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

// Implement FromStr trait for TtsProvider
impl std::str::FromStr for TtsProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "azure" => Ok(Self::Azure),
            "openai" => Ok(Self::OpenAI),
            "openai_compatible" | "compatible" => Ok(Self::OpenAICompatible),
            "edge" | "edge_tts" => Ok(Self::Edge),
            "piper" => Ok(Self::Piper),
            "mock" => Ok(Self::Mock),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name (OpenAI model, piper voice model path, mock behavior)
    #[serde(default = "String::new")]
    pub model: String,

    // @field: Voice name
    #[serde(default = "String::new")]
    pub voice: String,

    // @field: Provider output format string
    #[serde(default = "String::new")]
    pub output_format: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Service region (Azure)
    #[serde(default = "String::new")]
    pub region: String,

    // @field: Executable path (Piper, edge-tts)
    #[serde(default = "String::new")]
    pub executable: String,

    // @field: Speaking rate such as "+10%" (Edge)
    #[serde(default = "default_edge_percent")]
    pub voice_rate: String,

    // @field: Volume such as "-5%" (Edge)
    #[serde(default = "default_edge_percent")]
    pub voice_volume: String,

    // @field: Pitch such as "+0Hz" (Edge)
    #[serde(default = "default_edge_pitch")]
    pub voice_pitch: String,

    // @field: Pitch used for quoted text (Edge)
    #[serde(default = "default_edge_quote_pitch")]
    pub quote_pitch: String,

    // @field: HTTP proxy URL (Edge)
    #[serde(default = "String::new")]
    pub proxy: String,

    // @field: Phoneme length multiplier, higher is slower (Piper)
    #[serde(default)]
    pub length_scale: Option<f64>,

    // @field: Seconds of silence after each sentence (Piper)
    #[serde(default)]
    pub sentence_silence: Option<f64>,

    // @field: Max concurrent chunk requests
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,

    // @field: Max chars per request, 0 for the backend default
    #[serde(default)]
    pub max_chars_per_request: usize,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: TtsProvider) -> Self {
        let base = Self {
            provider_type: provider_type.to_lowercase_string(),
            model: String::new(),
            voice: String::new(),
            output_format: String::new(),
            api_key: String::new(),
            endpoint: String::new(),
            region: String::new(),
            executable: String::new(),
            voice_rate: default_edge_percent(),
            voice_volume: default_edge_percent(),
            voice_pitch: default_edge_pitch(),
            quote_pitch: default_edge_quote_pitch(),
            proxy: String::new(),
            length_scale: None,
            sentence_silence: None,
            concurrent_requests: default_concurrent_requests(),
            max_chars_per_request: 0,
            timeout_secs: default_timeout_secs(),
        };

        match provider_type {
            TtsProvider::Azure => Self {
                voice: default_azure_voice(),
                output_format: default_azure_output_format(),
                region: default_azure_region(),
                ..base
            },
            TtsProvider::OpenAI => Self {
                model: default_openai_model(),
                voice: default_openai_voice(),
                output_format: default_openai_format(),
                endpoint: default_openai_endpoint(),
                ..base
            },
            TtsProvider::OpenAICompatible => Self {
                model: default_openai_model(),
                voice: default_openai_voice(),
                output_format: default_openai_format(),
                endpoint: default_compatible_endpoint(),
                ..base
            },
            TtsProvider::Edge => Self {
                executable: default_edge_executable(),
                voice: default_azure_voice(),
                output_format: EDGE_OUTPUT_FORMAT.to_string(),
                concurrent_requests: 3,
                ..base
            },
            TtsProvider::Piper => Self {
                executable: default_piper_executable(),
                output_format: "wav".to_string(),
                concurrent_requests: 1,
                timeout_secs: default_piper_timeout_secs(),
                ..base
            },
            TtsProvider::Mock => Self {
                model: "working".to_string(),
                output_format: "wav".to_string(),
                ..base
            },
        }
    }
}

/// TTS service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TtsConfig {
    /// TTS provider to use
    #[serde(default)]
    pub provider: TtsProvider,

    /// Available TTS providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,
}

/// Chunking settings
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SegmentationConfig {
    /// Override of the backend's chunk size limit
    #[serde(default)]
    pub max_chars: Option<usize>,

    /// Paragraph delimiting for plain-text books
    #[serde(default)]
    pub newline_mode: NewlineMode,
}

/// Pause markers and durations
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PauseConfig {
    /// Break marker, defaults to the backend's marker
    #[serde(default)]
    pub break_marker: Option<String>,

    /// Silence inserted at every break, in milliseconds
    #[serde(default = "default_break_duration_ms")]
    pub break_duration_ms: u64,

    /// Marker wrapped around quotes
    #[serde(default = "default_quote_marker")]
    pub quote_marker: String,

    /// Silence around quotes, in milliseconds
    #[serde(default = "default_quote_pause_ms")]
    pub quote_pause_ms: u64,

    /// Whether quotes get their own pauses at all
    #[serde(default = "default_true")]
    pub quote_pauses: bool,
}

impl Default for PauseConfig {
    fn default() -> Self {
        Self {
            break_marker: None,
            break_duration_ms: default_break_duration_ms(),
            quote_marker: default_quote_marker(),
            quote_pause_ms: default_quote_pause_ms(),
            quote_pauses: true,
        }
    }
}

impl PauseConfig {
    /// Build the pause protocol, falling back to the backend's break marker
    pub fn protocol(&self, backend_marker: &str) -> Result<PauseProtocol> {
        let break_marker = self.break_marker.as_deref().unwrap_or(backend_marker);
        let quote = self
            .quote_pauses
            .then_some((self.quote_marker.as_str(), self.quote_pause_ms));
        PauseProtocol::new(break_marker, self.break_duration_ms, quote)
            .map_err(|e| anyhow!("Invalid pause configuration: {}", e))
    }
}

/// Fragment merging and final encoding
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AudioConfig {
    #[serde(default)]
    pub merge_strategy: MergeStrategy,

    /// ffmpeg used to encode decoded chapters to MP3, AAC or FLAC
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Seconds one chapter encode may take
    #[serde(default = "default_encode_timeout_secs")]
    pub encode_timeout_secs: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            merge_strategy: MergeStrategy::default(),
            ffmpeg_path: default_ffmpeg_path(),
            encode_timeout_secs: default_encode_timeout_secs(),
        }
    }
}

impl AudioConfig {
    pub fn encoder(&self) -> Encoder {
        Encoder::new(
            self.ffmpeg_path.clone(),
            Duration::from_secs(self.encode_timeout_secs),
        )
    }
}

/// Retry and token renewal settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryConfig {
    /// Attempts per chunk, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff time in milliseconds, doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Renew access tokens this many seconds before they expire
    #[serde(default = "default_token_safety_margin_secs")]
    pub token_safety_margin_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_retry_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            token_safety_margin_secs: default_token_safety_margin_secs(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
        }
    }

    pub fn token_safety_margin(&self) -> Duration {
        Duration::from_secs(self.token_safety_margin_secs)
    }
}

/// Output selection and layout
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    /// First chapter to convert (1-based)
    #[serde(default = "default_chapter_start")]
    pub chapter_start: usize,

    /// Last chapter to convert, -1 for the last one
    #[serde(default = "default_chapter_end")]
    pub chapter_end: i64,

    /// Also write each chapter's text next to its audio
    #[serde(default)]
    pub output_text: bool,

    /// Chapters converted at the same time
    #[serde(default = "default_parallel_chapters")]
    pub parallel_chapters: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            chapter_start: default_chapter_start(),
            chapter_end: default_chapter_end(),
            output_text: false,
            parallel_chapters: default_parallel_chapters(),
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

fn default_concurrent_requests() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_piper_timeout_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    12
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_token_safety_margin_secs() -> u64 {
    30
}

fn default_break_duration_ms() -> u64 {
    DEFAULT_BREAK_DURATION_MS
}

fn default_quote_marker() -> String {
    DEFAULT_QUOTE_MARKER.to_string()
}

fn default_quote_pause_ms() -> u64 {
    DEFAULT_QUOTE_PAUSE_MS
}

fn default_chapter_start() -> usize {
    1
}

fn default_chapter_end() -> i64 {
    -1
}

fn default_parallel_chapters() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_azure_voice() -> String {
    "en-US-GuyNeural".to_string()
}

fn default_azure_output_format() -> String {
    "audio-24khz-48kbitrate-mono-mp3".to_string()
}

fn default_azure_region() -> String {
    "eastus".to_string()
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_compatible_endpoint() -> String {
    "http://localhost:8880/v1".to_string()
}

fn default_openai_model() -> String {
    "tts-1".to_string()
}

fn default_openai_voice() -> String {
    "alloy".to_string()
}

fn default_openai_format() -> String {
    "mp3".to_string()
}

fn default_piper_executable() -> String {
    "piper".to_string()
}

fn default_edge_executable() -> String {
    "edge-tts".to_string()
}

fn default_edge_percent() -> String {
    "+0%".to_string()
}

fn default_edge_pitch() -> String {
    "+0Hz".to_string()
}

fn default_edge_quote_pitch() -> String {
    DEFAULT_QUOTE_PITCH.to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_encode_timeout_secs() -> u64 {
    600
}

impl Config {
    /// Load the configuration file, writing a default one if it is missing
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            let content = serde_json::to_string_pretty(&config)?;
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write default config: {}", path.display()))?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        // Validate language
        let _language_name = crate::language_utils::get_language_name(&self.language)?;

        if self.segmentation.max_chars == Some(0) {
            return Err(anyhow!("segmentation.max_chars must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be at least 1"));
        }
        if self.output.parallel_chapters == 0 {
            return Err(anyhow!("output.parallel_chapters must be at least 1"));
        }
        if self.output.chapter_start == 0 {
            return Err(anyhow!("output.chapter_start is 1-based"));
        }
        if self.output.chapter_end != -1 && self.output.chapter_end < self.output.chapter_start as i64
        {
            return Err(anyhow!(
                "output.chapter_end ({}) is before chapter_start ({})",
                self.output.chapter_end,
                self.output.chapter_start
            ));
        }
        self.pauses.protocol(crate::synthesis::pause::DEFAULT_BREAK_MARKER)?;

        // Validate credentials for hosted providers
        match self.tts.provider {
            TtsProvider::Azure => {
                if self.tts.get_api_key().is_empty() {
                    return Err(anyhow!(
                        "Azure subscription key is required (api_key or MS_TTS_KEY)"
                    ));
                }
                if self.tts.get_region().is_empty() {
                    return Err(anyhow!("Azure region is required (region or MS_TTS_REGION)"));
                }
            }
            TtsProvider::OpenAI => {
                if self.tts.get_api_key().is_empty() {
                    return Err(anyhow!(
                        "OpenAI API key is required (api_key or OPENAI_API_KEY)"
                    ));
                }
            }
            _ => {}
        }

        if self.tts.get_concurrent_requests() == 0 {
            return Err(anyhow!("concurrent_requests must be at least 1"));
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            language: "en-US".to_string(),
            tts: TtsConfig::default(),
            segmentation: SegmentationConfig::default(),
            pauses: PauseConfig::default(),
            audio: AudioConfig::default(),
            retry: RetryConfig::default(),
            output: OutputConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

fn env_or_empty(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

impl TtsConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: &TtsProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers
            .iter()
            .find(|p| p.provider_type == provider_str)
    }

    /// Active provider settings, falling back to the provider defaults
    pub fn active_provider(&self) -> ProviderConfig {
        self.get_active_provider_config()
            .cloned()
            .unwrap_or_else(|| ProviderConfig::new(self.provider))
    }

    /// Get the API key for the active provider, then the environment
    pub fn get_api_key(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.api_key.is_empty() {
                return provider_config.api_key.clone();
            }
        }

        match self.provider {
            TtsProvider::Azure => env_or_empty("MS_TTS_KEY"),
            TtsProvider::OpenAI | TtsProvider::OpenAICompatible => env_or_empty("OPENAI_API_KEY"),
            _ => String::new(),
        }
    }

    /// Get the region for the active provider, then the environment
    pub fn get_region(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.region.is_empty() {
                return provider_config.region.clone();
            }
        }
        match env_or_empty("MS_TTS_REGION") {
            region if !region.is_empty() => region,
            _ if self.provider == TtsProvider::Azure => default_azure_region(),
            _ => String::new(),
        }
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        if self.provider == TtsProvider::OpenAICompatible {
            let from_env = env_or_empty("OPENAI_BASE_URL");
            if !from_env.is_empty() {
                return from_env;
            }
        }
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.endpoint.is_empty() {
                return provider_config.endpoint.clone();
            }
        }

        // Default fallback based on provider type
        match self.provider {
            TtsProvider::OpenAI => default_openai_endpoint(),
            TtsProvider::OpenAICompatible => default_compatible_endpoint(),
            _ => String::new(),
        }
    }

    /// Concurrent chunk requests for the active provider
    pub fn get_concurrent_requests(&self) -> usize {
        self.get_active_provider_config()
            .map(|p| p.concurrent_requests)
            .unwrap_or_else(default_concurrent_requests)
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: TtsProvider::default(),
            available_providers: TtsProvider::all()
                .into_iter()
                .map(ProviderConfig::new)
                .collect(),
        }
    }
}
