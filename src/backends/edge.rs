/*!
 * Edge read-aloud voices.
 *
 * The service speaks a private websocket protocol, so synthesis goes through
 * the `edge-tts` command line client, one process per chunk. Quoted chunks
 * are spoken at a raised pitch instead of getting extra silence.
 */

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{AccessToken, PauseHandling, SynthesisBackend, SynthesisRequest};
use crate::audio::AudioContainer;
use crate::errors::BackendError;

const MAX_INPUT_CHARS: usize = 3000;

/// The only format the read-aloud service returns
pub const EDGE_OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

/// Pitch used for quoted text unless configured
pub const DEFAULT_QUOTE_PITCH: &str = "+30Hz";

static PERCENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]\d+%$").expect("percent pattern is valid"));
static HERTZ_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]\d+Hz$").expect("hertz pattern is valid"));

/// Voice adjustments passed to every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prosody {
    /// Speaking rate, e.g. `+10%`
    pub rate: String,
    /// Volume, e.g. `-20%`
    pub volume: String,
    /// Pitch, e.g. `+0Hz`
    pub pitch: String,
}

impl Default for Prosody {
    fn default() -> Self {
        Self {
            rate: "+0%".to_string(),
            volume: "+0%".to_string(),
            pitch: "+0Hz".to_string(),
        }
    }
}

/// `edge-tts` client
#[derive(Debug, Clone)]
pub struct EdgeBackend {
    executable: String,
    voice: String,
    prosody: Prosody,
    quote_pitch: String,
    proxy: Option<String>,
    timeout: Duration,
}

impl EdgeBackend {
    pub fn new(executable: impl Into<String>, voice: impl Into<String>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            voice: voice.into(),
            prosody: Prosody::default(),
            quote_pitch: DEFAULT_QUOTE_PITCH.to_string(),
            proxy: None,
            timeout,
        }
    }

    pub fn with_prosody(mut self, prosody: Prosody) -> Self {
        self.prosody = prosody;
        self
    }

    pub fn with_quote_pitch(mut self, quote_pitch: impl Into<String>) -> Self {
        self.quote_pitch = quote_pitch.into();
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Command line for one chunk read from `text_file`
    pub fn command_args(
        &self,
        request: &SynthesisRequest,
        text_file: &Path,
        media_file: &Path,
    ) -> Vec<String> {
        let pitch = if request.quoted {
            &self.quote_pitch
        } else {
            &self.prosody.pitch
        };

        // `--rate=-10%` keeps negative values from parsing as flags
        let mut args = vec![
            "--voice".to_string(),
            self.voice.clone(),
            format!("--rate={}", self.prosody.rate),
            format!("--volume={}", self.prosody.volume),
            format!("--pitch={}", pitch),
            "--file".to_string(),
            text_file.to_string_lossy().to_string(),
            "--write-media".to_string(),
            media_file.to_string_lossy().to_string(),
        ];
        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
        args
    }

    async fn run(&self, request: &SynthesisRequest) -> Result<Bytes, BackendError> {
        let work_dir = tempfile::tempdir()
            .map_err(|e| BackendError::Transient(format!("Temporary directory: {}", e)))?;
        let text_file = work_dir.path().join("chunk.txt");
        let media_file = work_dir.path().join("chunk.mp3");
        tokio::fs::write(&text_file, &request.text)
            .await
            .map_err(|e| BackendError::Transient(format!("Writing chunk text: {}", e)))?;

        let child = Command::new(&self.executable)
            .args(self.command_args(request, &text_file, &media_file))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BackendError::Fatal(format!("Failed to start {}: {}", self.executable, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| BackendError::Transient("edge-tts timed out".to_string()))?
            .map_err(|e| BackendError::Transient(format!("Waiting for edge-tts: {}", e)))?;

        // Failures are almost always the service hanging up, so they are retried
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("edge-tts exited with {}: {}", output.status, stderr.trim());
            return Err(BackendError::Transient(format!(
                "edge-tts exited with {}",
                output.status
            )));
        }

        let audio = tokio::fs::read(&media_file)
            .await
            .map_err(|e| BackendError::Transient(format!("Reading edge-tts output: {}", e)))?;
        if audio.is_empty() {
            return Err(BackendError::Transient("edge-tts returned no audio".to_string()));
        }
        Ok(Bytes::from(audio))
    }
}

#[async_trait]
impl SynthesisBackend for EdgeBackend {
    fn name(&self) -> &str {
        "edge"
    }

    async fn invoke(
        &self,
        request: &SynthesisRequest,
        _token: Option<&AccessToken>,
    ) -> Result<Bytes, BackendError> {
        debug!(
            "edge-tts request for chunk {}{}",
            request.index,
            if request.quoted { " (quoted)" } else { "" }
        );
        self.run(request).await
    }

    fn pause_handling(&self) -> PauseHandling {
        PauseHandling::Silence
    }

    fn max_chunk_chars(&self, _language: &str) -> usize {
        MAX_INPUT_CHARS
    }

    fn price_per_thousand_chars(&self) -> Option<f64> {
        None
    }

    fn container(&self) -> AudioContainer {
        AudioContainer::Mp3
    }

    fn bitrate_kbps(&self) -> Option<u32> {
        crate::audio::bitrate_from_output_format(EDGE_OUTPUT_FORMAT)
    }

    fn validate_config(&self) -> Result<(), BackendError> {
        if self.executable.is_empty() {
            return Err(BackendError::Fatal("edge-tts executable is missing".to_string()));
        }
        if self.voice.is_empty() {
            return Err(BackendError::Fatal("Edge voice is missing".to_string()));
        }
        for (name, value) in [("rate", &self.prosody.rate), ("volume", &self.prosody.volume)] {
            if !PERCENT_PATTERN.is_match(value) {
                return Err(BackendError::Fatal(format!(
                    "Edge voice {} must look like +10% or -5%, got '{}'",
                    name, value
                )));
            }
        }
        for (name, value) in [("pitch", &self.prosody.pitch), ("quote pitch", &self.quote_pitch)] {
            if !HERTZ_PATTERN.is_match(value) {
                return Err(BackendError::Fatal(format!(
                    "Edge {} must look like +30Hz or -5Hz, got '{}'",
                    name, value
                )));
            }
        }
        Ok(())
    }
}
