/*!
 * Final chapter encoding.
 *
 * A decoded chapter is encoded exactly once, into the container the backend
 * was configured for. WAV is written in-process; MP3, AAC and FLAC are piped
 * through an external `ffmpeg`.
 */

use log::{debug, error};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::format::AudioContainer;
use super::pcm::PcmBuffer;
use crate::errors::SynthesisError;

/// Container and bitrate of the encoded chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeTarget {
    pub container: AudioContainer,
    /// `None` keeps the encoder's default
    pub bitrate_kbps: Option<u32>,
}

impl EncodeTarget {
    pub fn new(container: AudioContainer, bitrate_kbps: Option<u32>) -> Self {
        Self {
            container,
            bitrate_kbps,
        }
    }
}

/// External encoder settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoder {
    /// ffmpeg executable
    pub program: String,
    pub timeout: Duration,
}

impl Default for Encoder {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

impl Encoder {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Arguments that read WAV on stdin and write `target` to stdout
    pub fn ffmpeg_args(target: &EncodeTarget) -> Result<Vec<String>, SynthesisError> {
        let (codec, format) = match target.container {
            AudioContainer::Mp3 => ("libmp3lame", "mp3"),
            AudioContainer::Aac => ("aac", "adts"),
            AudioContainer::Flac => ("flac", "flac"),
            other => {
                return Err(SynthesisError::InvalidArgument(format!(
                    "Chapters cannot be encoded to {}",
                    other
                )));
            }
        };

        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "wav",
            "-i",
            "pipe:0",
            "-c:a",
            codec,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        // FLAC is lossless, a bitrate means nothing to it
        if let Some(kbps) = target.bitrate_kbps.filter(|_| target.container != AudioContainer::Flac) {
            args.push("-b:a".to_string());
            args.push(format!("{}k", kbps));
        }
        args.extend(["-f".to_string(), format.to_string(), "pipe:1".to_string()]);
        Ok(args)
    }

    /// Encode PCM into the target container
    pub async fn encode(
        &self,
        pcm: &PcmBuffer,
        target: &EncodeTarget,
    ) -> Result<Vec<u8>, SynthesisError> {
        let wav = pcm.to_wav()?;
        if target.container == AudioContainer::Wav {
            return Ok(wav);
        }

        let args = Self::ffmpeg_args(target)?;
        debug!(
            "Encoding {} bytes of WAV to {} with {}",
            wav.len(),
            target.container,
            self.program
        );

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SynthesisError::Assembly(format!("Failed to start {}: {}", self.program, e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SynthesisError::Assembly("Encoder stdin unavailable".to_string()))?;
        // stdout must be drained while writing, or ffmpeg stalls on a full pipe
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&wav).await;
            drop(stdin);
            result
        });

        let output = tokio::select! {
            result = child.wait_with_output() => result.map_err(|e| {
                SynthesisError::Assembly(format!("Waiting for {}: {}", self.program, e))
            })?,
            _ = tokio::time::sleep(self.timeout) => {
                return Err(SynthesisError::Assembly(format!(
                    "{} timed out after {:?}",
                    self.program, self.timeout
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("{} exited with {}: {}", self.program, output.status, stderr.trim());
            return Err(SynthesisError::Assembly(format!(
                "Encoding to {} failed: {}",
                target.container,
                stderr.trim()
            )));
        }

        writer
            .await
            .map_err(|e| SynthesisError::Assembly(format!("Encoder input task: {}", e)))?
            .map_err(|e| SynthesisError::Assembly(format!("Writing to encoder: {}", e)))?;

        if output.stdout.is_empty() {
            return Err(SynthesisError::Assembly(format!(
                "{} produced no {} output",
                self.program, target.container
            )));
        }
        Ok(output.stdout)
    }
}
