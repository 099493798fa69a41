use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error};
use reqwest::{Client, header};
use std::time::Duration;

use super::{AccessToken, PauseHandling, SynthesisBackend, SynthesisRequest};
use crate::audio::{AudioContainer, bitrate_from_output_format};
use crate::errors::BackendError;
use crate::language_utils::is_chinese;

/// Lifetime of an issued token (tokens are valid for ten minutes)
pub const TOKEN_TTL: Duration = Duration::from_secs(9 * 60 + 1);

/// Longest single SSML break Azure accepts
const MAX_BREAK_MS: u64 = 5000;

const PRICE_PER_THOUSAND_CHARS: f64 = 0.016;

/// Azure Cognitive Services Speech client
#[derive(Debug)]
pub struct AzureBackend {
    /// HTTP client for API requests
    client: Client,
    /// Subscription key, exchanged for bearer tokens
    subscription_key: String,
    region: String,
    voice: String,
    output_format: String,
    /// Locale used for `xml:lang`
    language: String,
}

impl AzureBackend {
    /// Create a new Azure client
    pub fn new(
        subscription_key: impl Into<String>,
        region: impl Into<String>,
        voice: impl Into<String>,
        output_format: impl Into<String>,
        language: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            subscription_key: subscription_key.into(),
            region: region.into(),
            voice: voice.into(),
            output_format: output_format.into(),
            language: language.into(),
        }
    }

    fn token_url(&self) -> String {
        format!(
            "https://{}.api.cognitive.microsoft.com/sts/v1.0/issuetoken",
            self.region
        )
    }

    fn tts_url(&self) -> String {
        format!(
            "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
            self.region
        )
    }

    /// Build the SSML document for one request
    pub fn build_ssml(&self, request: &SynthesisRequest) -> String {
        format!(
            "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='{}'><voice name='{}'>{}{}{}</voice></speak>",
            self.language,
            self.voice,
            break_tags(request.pause_before_ms),
            escape_xml(&request.text),
            break_tags(request.pause_after_ms),
        )
    }
}

/// `<break>` elements totalling `duration_ms`
fn break_tags(duration_ms: u64) -> String {
    let mut tags = String::new();
    let mut remaining = duration_ms;
    while remaining > 0 {
        let step = remaining.min(MAX_BREAK_MS);
        tags.push_str(&format!("<break time='{}ms' />", step));
        remaining -= step;
    }
    tags
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[async_trait]
impl SynthesisBackend for AzureBackend {
    fn name(&self) -> &str {
        "azure"
    }

    async fn invoke(
        &self,
        request: &SynthesisRequest,
        token: Option<&AccessToken>,
    ) -> Result<Bytes, BackendError> {
        let token =
            token.ok_or_else(|| BackendError::TokenRenewal("No access token held".to_string()))?;
        let ssml = self.build_ssml(request);
        debug!("Azure request for chunk {}: {} bytes of SSML", request.index, ssml.len());

        let response = self
            .client
            .post(self.tts_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", token.value))
            .header(header::CONTENT_TYPE, "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", &self.output_format)
            .header(header::USER_AGENT, "voxbook")
            .body(ssml)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Azure TTS error ({}): {}", status, error_text);
            return Err(BackendError::from_status(status.as_u16(), error_text));
        }

        Ok(response.bytes().await?)
    }

    fn requires_token(&self) -> bool {
        true
    }

    async fn renew_token(&self) -> Result<AccessToken, BackendError> {
        let response = self
            .client
            .post(self.token_url())
            .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
            .header(header::CONTENT_LENGTH, "0")
            .send()
            .await
            .map_err(|e| BackendError::TokenRenewal(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Azure token endpoint error ({}): {}", status, error_text);
            return Err(match BackendError::from_status(status.as_u16(), error_text) {
                BackendError::Transient(message) => BackendError::TokenRenewal(message),
                // Bad subscription keys are not retried
                BackendError::TokenRejected(message) | BackendError::Fatal(message) => {
                    BackendError::Fatal(message)
                }
                other => other,
            });
        }

        let value = response
            .text()
            .await
            .map_err(|e| BackendError::TokenRenewal(e.to_string()))?;
        debug!("Renewed Azure access token");
        Ok(AccessToken::new(value, TOKEN_TTL))
    }

    fn pause_handling(&self) -> PauseHandling {
        PauseHandling::Inline
    }

    fn max_chunk_chars(&self, language: &str) -> usize {
        if is_chinese(language) { 1800 } else { 3000 }
    }

    fn price_per_thousand_chars(&self) -> Option<f64> {
        Some(PRICE_PER_THOUSAND_CHARS)
    }

    fn container(&self) -> AudioContainer {
        AudioContainer::from_output_format(&self.output_format).unwrap_or(AudioContainer::Mp3)
    }

    fn bitrate_kbps(&self) -> Option<u32> {
        bitrate_from_output_format(&self.output_format)
    }

    fn validate_config(&self) -> Result<(), BackendError> {
        if self.subscription_key.is_empty() {
            return Err(BackendError::Fatal(
                "Azure subscription key is missing".to_string(),
            ));
        }
        if self.region.is_empty() {
            return Err(BackendError::Fatal("Azure region is missing".to_string()));
        }
        if self.voice.is_empty() {
            return Err(BackendError::Fatal("Azure voice is missing".to_string()));
        }
        match AudioContainer::from_output_format(&self.output_format) {
            Some(container) if container.is_mergeable() => Ok(()),
            Some(container) => Err(BackendError::Fatal(format!(
                "Azure output format {} produces {} fragments, which can be neither decoded nor concatenated",
                self.output_format, container
            ))),
            None => Err(BackendError::Fatal(format!(
                "Unsupported Azure output format: {}",
                self.output_format
            ))),
        }
    }
}
