use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error};
use reqwest::{Client, header};
use serde::Serialize;
use std::time::Duration;

use super::{AccessToken, PauseHandling, SynthesisBackend, SynthesisRequest};
use crate::audio::AudioContainer;
use crate::errors::BackendError;

/// Voices offered by the hosted API
pub const OPENAI_VOICES: &[&str] = &[
    "alloy", "ash", "coral", "echo", "fable", "onyx", "nova", "sage", "shimmer",
];

/// Response formats offered by the hosted API that can be merged into chapters
pub const OPENAI_FORMATS: &[&str] = &["mp3", "aac", "flac", "wav"];

/// Models and their price per 1000 characters
const OPENAI_MODELS: &[(&str, f64)] = &[("tts-1", 0.015), ("tts-1-hd", 0.03)];

const MAX_INPUT_CHARS: usize = 4000;

/// Speech request body
#[derive(Debug, Serialize)]
pub struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

/// OpenAI speech client, also used for compatible local servers
#[derive(Debug)]
pub struct OpenAIBackend {
    /// HTTP client for API requests
    client: Client,
    api_key: String,
    /// Base URL up to and including `/v1`
    endpoint: String,
    model: String,
    voice: String,
    response_format: String,
    /// Compatible servers accept any model and voice and are not billed
    compatible: bool,
}

impl OpenAIBackend {
    /// Create a client for the hosted OpenAI API
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
        response_format: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            voice: voice.into(),
            response_format: response_format.into(),
            compatible: false,
        }
    }

    /// Create a client for a server exposing the same API
    pub fn compatible(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
        response_format: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            compatible: true,
            ..Self::new(api_key, endpoint, model, voice, response_format, timeout)
        }
    }

    fn speech_url(&self) -> String {
        format!("{}/audio/speech", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl SynthesisBackend for OpenAIBackend {
    fn name(&self) -> &str {
        if self.compatible {
            "openai_compatible"
        } else {
            "openai"
        }
    }

    async fn invoke(
        &self,
        request: &SynthesisRequest,
        _token: Option<&AccessToken>,
    ) -> Result<Bytes, BackendError> {
        let body = SpeechRequest {
            model: &self.model,
            voice: &self.voice,
            input: &request.text,
            response_format: &self.response_format,
        };
        debug!(
            "{} request for chunk {}: {} chars",
            self.name(),
            request.index,
            request.text.chars().count()
        );

        let mut builder = self.client.post(self.speech_url()).json(&body);
        if !self.api_key.is_empty() {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.api_key));
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("{} API error ({}): {}", self.name(), status, error_text);
            // A static API key cannot be renewed, so 401 is final
            return Err(match BackendError::from_status(status.as_u16(), error_text) {
                BackendError::TokenRejected(message) => BackendError::Fatal(message),
                other => other,
            });
        }

        Ok(response.bytes().await?)
    }

    fn pause_handling(&self) -> PauseHandling {
        PauseHandling::Ignore
    }

    fn max_chunk_chars(&self, _language: &str) -> usize {
        MAX_INPUT_CHARS
    }

    fn price_per_thousand_chars(&self) -> Option<f64> {
        if self.compatible {
            return None;
        }
        OPENAI_MODELS
            .iter()
            .find(|(model, _)| *model == self.model)
            .map(|(_, price)| *price)
    }

    fn container(&self) -> AudioContainer {
        AudioContainer::from_output_format(&self.response_format).unwrap_or(AudioContainer::Mp3)
    }

    fn validate_config(&self) -> Result<(), BackendError> {
        if self.endpoint.is_empty() {
            return Err(BackendError::Fatal("Speech endpoint is missing".to_string()));
        }
        if self.compatible {
            return match AudioContainer::from_output_format(&self.response_format) {
                Some(container) if container.is_mergeable() => Ok(()),
                _ => Err(BackendError::Fatal(format!(
                    "Response format {} cannot be merged into chapters",
                    self.response_format
                ))),
            };
        }
        if self.api_key.is_empty() {
            return Err(BackendError::Fatal("OpenAI API key is missing".to_string()));
        }
        if !OPENAI_MODELS.iter().any(|(model, _)| *model == self.model) {
            return Err(BackendError::Fatal(format!(
                "Unsupported OpenAI TTS model: {}",
                self.model
            )));
        }
        if !OPENAI_VOICES.contains(&self.voice.as_str()) {
            return Err(BackendError::Fatal(format!(
                "Unsupported OpenAI voice: {}",
                self.voice
            )));
        }
        if !OPENAI_FORMATS.contains(&self.response_format.as_str()) {
            return Err(BackendError::Fatal(format!(
                "Unsupported OpenAI response format: {}",
                self.response_format
            )));
        }
        Ok(())
    }
}
