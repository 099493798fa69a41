/*!
 * TTS backend implementations.
 *
 * This module contains the capability interface every backend implements and
 * the registry that picks one by its configuration key:
 * - Azure: Cognitive Services Speech (SSML, bearer tokens)
 * - Edge: the free Edge read-aloud voices through the `edge-tts` command
 * - OpenAI: OpenAI speech API and compatible servers
 * - Piper: local piper executable
 * - Mock: in-process tone generator for tests and dry runs
 */

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::{Config, TtsProvider};
use crate::audio::AudioContainer;
use crate::errors::BackendError;
use crate::synthesis::pause::DEFAULT_BREAK_MARKER;

pub mod azure;
pub mod edge;
pub mod mock;
pub mod openai;
pub mod piper;

/// One chunk to synthesize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub index: usize,
    pub text: String,
    /// Pause to render before the text, for backends with inline pauses
    pub pause_before_ms: u64,
    /// Pause to render after the text, for backends with inline pauses
    pub pause_after_ms: u64,
    /// The text sits inside a quote
    pub quoted: bool,
}

impl SynthesisRequest {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            pause_before_ms: 0,
            pause_after_ms: 0,
            quoted: false,
        }
    }

    pub fn quoted(mut self, quoted: bool) -> Self {
        self.quoted = quoted;
        self
    }
}

/// Bearer token for token-based backends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, valid_for: Duration) -> Self {
        let valid_for = chrono::Duration::from_std(valid_for).unwrap_or(chrono::Duration::zero());
        Self {
            value: value.into(),
            expires_at: Utc::now() + valid_for,
        }
    }

    /// Whether the token is still usable `margin` before it expires
    pub fn is_fresh(&self, margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::zero());
        Utc::now() < self.expires_at - margin
    }
}

/// How a backend deals with pauses between chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseHandling {
    /// Pauses become decoded silence spliced in by the assembler
    Silence,
    /// Pauses are rendered by the backend inside the request
    Inline,
    /// The backend has no notion of pauses; they are dropped
    Ignore,
}

/// Common trait for all TTS backends
///
/// This trait defines the interface that all backend implementations must
/// follow, allowing them to be used interchangeably by the orchestrator.
#[async_trait]
pub trait SynthesisBackend: Send + Sync + Debug {
    /// Registry key of the backend
    fn name(&self) -> &str;

    /// Synthesize one chunk into an audio fragment
    ///
    /// # Arguments
    /// * `request` - The chunk and its inline pauses
    /// * `token` - The current access token, for backends that need one
    async fn invoke(
        &self,
        request: &SynthesisRequest,
        token: Option<&AccessToken>,
    ) -> Result<Bytes, BackendError>;

    /// Whether `invoke` needs an access token
    fn requires_token(&self) -> bool {
        false
    }

    /// Obtain a fresh access token
    async fn renew_token(&self) -> Result<AccessToken, BackendError> {
        Err(BackendError::Fatal(format!(
            "{} does not use access tokens",
            self.name()
        )))
    }

    fn pause_handling(&self) -> PauseHandling;

    /// Marker the backend expects for breaks when none is configured
    fn break_marker(&self) -> &str {
        DEFAULT_BREAK_MARKER
    }

    /// Chunk size limit for the given language
    fn max_chunk_chars(&self, language: &str) -> usize;

    /// Price per 1000 characters, `None` when free or unknown
    fn price_per_thousand_chars(&self) -> Option<f64>;

    /// Container of the returned fragments
    fn container(&self) -> AudioContainer;

    /// Bitrate named by the output format, used for the final encode
    fn bitrate_kbps(&self) -> Option<u32> {
        None
    }

    /// Check model, voice and format settings before any request is made
    fn validate_config(&self) -> Result<(), BackendError>;
}

/// Build the backend selected in the configuration
pub fn create_backend(config: &Config) -> Result<Arc<dyn SynthesisBackend>> {
    let provider = config.tts.active_provider();
    let timeout = Duration::from_secs(provider.timeout_secs);

    let backend: Arc<dyn SynthesisBackend> = match config.tts.provider {
        TtsProvider::Azure => Arc::new(azure::AzureBackend::new(
            config.tts.get_api_key(),
            config.tts.get_region(),
            provider.voice,
            provider.output_format,
            config.language.clone(),
            timeout,
        )),
        TtsProvider::OpenAI => Arc::new(openai::OpenAIBackend::new(
            config.tts.get_api_key(),
            config.tts.get_endpoint(),
            provider.model,
            provider.voice,
            provider.output_format,
            timeout,
        )),
        TtsProvider::OpenAICompatible => Arc::new(openai::OpenAIBackend::compatible(
            config.tts.get_api_key(),
            config.tts.get_endpoint(),
            provider.model,
            provider.voice,
            provider.output_format,
            timeout,
        )),
        TtsProvider::Edge => Arc::new(
            edge::EdgeBackend::new(provider.executable, provider.voice, timeout)
                .with_prosody(edge::Prosody {
                    rate: provider.voice_rate,
                    volume: provider.voice_volume,
                    pitch: provider.voice_pitch,
                })
                .with_quote_pitch(provider.quote_pitch)
                .with_proxy(Some(provider.proxy).filter(|p| !p.is_empty())),
        ),
        TtsProvider::Piper => Arc::new(
            piper::PiperBackend::new(provider.executable, provider.model, timeout)
                .with_length_scale(provider.length_scale)
                .with_sentence_silence(provider.sentence_silence),
        ),
        TtsProvider::Mock => Arc::new(mock::MockBackend::new(provider.model.parse()?)),
    };

    backend.validate_config()?;
    Ok(backend)
}
