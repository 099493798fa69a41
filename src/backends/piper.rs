use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{AccessToken, PauseHandling, SynthesisBackend, SynthesisRequest};
use crate::audio::AudioContainer;
use crate::errors::BackendError;

const MAX_INPUT_CHARS: usize = 3000;

/// Local piper process, one invocation per chunk
#[derive(Debug, Clone)]
pub struct PiperBackend {
    executable: String,
    /// Path to the `.onnx` voice model
    model: String,
    /// Phoneme length multiplier; above 1 speaks slower
    length_scale: Option<f64>,
    /// Seconds of silence piper puts after each sentence
    sentence_silence: Option<f64>,
    timeout: Duration,
}

impl PiperBackend {
    pub fn new(executable: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            model: model.into(),
            length_scale: None,
            sentence_silence: None,
            timeout,
        }
    }

    pub fn with_length_scale(mut self, length_scale: Option<f64>) -> Self {
        self.length_scale = length_scale;
        self
    }

    pub fn with_sentence_silence(mut self, sentence_silence: Option<f64>) -> Self {
        self.sentence_silence = sentence_silence;
        self
    }

    /// Command line writing one chunk to `output_path`
    pub fn command_args(&self, output_path: &std::path::Path) -> Vec<String> {
        let mut args = vec![
            "--model".to_string(),
            self.model.clone(),
            "--output_file".to_string(),
            output_path.to_string_lossy().to_string(),
        ];
        if let Some(length_scale) = self.length_scale {
            args.push("--length_scale".to_string());
            args.push(length_scale.to_string());
        }
        if let Some(sentence_silence) = self.sentence_silence {
            args.push("--sentence_silence".to_string());
            args.push(sentence_silence.to_string());
        }
        args
    }

    async fn run(&self, text: &str) -> Result<Bytes, BackendError> {
        let output_dir = tempfile::tempdir()
            .map_err(|e| BackendError::Transient(format!("Temporary directory: {}", e)))?;
        let output_path = output_dir.path().join("chunk.wav");

        let mut child = Command::new(&self.executable)
            .args(self.command_args(&output_path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BackendError::Fatal(format!("Failed to start {}: {}", self.executable, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| BackendError::Transient(format!("Writing to piper: {}", e)))?;
            // Closing stdin tells piper the input is complete
            drop(stdin);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| BackendError::Transient("piper timed out".to_string()))?
            .map_err(|e| BackendError::Transient(format!("Waiting for piper: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("piper exited with {}: {}", output.status, stderr.trim());
            return Err(BackendError::Fatal(format!(
                "piper exited with {}",
                output.status
            )));
        }

        let audio = tokio::fs::read(&output_path)
            .await
            .map_err(|e| BackendError::Transient(format!("Reading piper output: {}", e)))?;
        Ok(Bytes::from(audio))
    }
}

#[async_trait]
impl SynthesisBackend for PiperBackend {
    fn name(&self) -> &str {
        "piper"
    }

    async fn invoke(
        &self,
        request: &SynthesisRequest,
        _token: Option<&AccessToken>,
    ) -> Result<Bytes, BackendError> {
        debug!("piper request for chunk {}", request.index);
        self.run(&request.text).await
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
        AudioContainer::Wav
    }

    fn validate_config(&self) -> Result<(), BackendError> {
        if self.executable.is_empty() {
            return Err(BackendError::Fatal("piper executable is missing".to_string()));
        }
        if self.model.is_empty() {
            return Err(BackendError::Fatal("piper voice model is missing".to_string()));
        }
        if self.length_scale.is_some_and(|v| v <= 0.0) {
            return Err(BackendError::Fatal("piper length_scale must be positive".to_string()));
        }
        if self.sentence_silence.is_some_and(|v| v < 0.0) {
            return Err(BackendError::Fatal(
                "piper sentence_silence cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}
