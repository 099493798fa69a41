/*!
 * Audio containers and output formats.
 *
 * Backends describe their output with provider-specific format strings
 * (`audio-24khz-48kbitrate-mono-mp3`, `opus`, ...). This module maps them to
 * a container with a file extension and knows which containers survive raw
 * byte concatenation.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Audio container of a fragment or an output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioContainer {
    Mp3,
    Aac,
    Wav,
    Pcm,
    Ogg,
    Opus,
    Webm,
    Flac,
    Amr,
    Silk,
}

impl AudioContainer {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Wav => "wav",
            Self::Pcm => "pcm",
            Self::Ogg => "ogg",
            Self::Opus => "opus",
            Self::Webm => "webm",
            Self::Flac => "flac",
            Self::Amr => "amr",
            Self::Silk => "silk",
        }
    }

    /// Whether independently encoded fragments can be joined byte for byte
    ///
    /// MPEG audio and ADTS AAC are frame streams with no global header, and
    /// headerless PCM is just samples. Everything else carries a header or
    /// page sequence that breaks when fragments are appended.
    pub fn is_concat_safe(&self) -> bool {
        matches!(self, Self::Mp3 | Self::Aac | Self::Pcm)
    }

    /// Whether the bundled decoder understands this container
    pub fn is_decodable(&self) -> bool {
        matches!(self, Self::Mp3 | Self::Aac | Self::Wav | Self::Flac)
    }

    /// Whether at least one merge strategy can handle this container
    pub fn is_mergeable(&self) -> bool {
        self.is_decodable() || self.is_concat_safe()
    }

    /// Map a provider output-format string to a container
    ///
    /// Azure-style names are matched by their distinguishing part
    /// (`riff-24khz-16bit-mono-pcm` is WAV, `raw-16khz-16bit-mono-pcm` is bare
    /// PCM); short names like `mp3` or `opus` map directly.
    pub fn from_output_format(format: &str) -> Option<Self> {
        let format = format.to_lowercase();
        let container = if format.contains("amr") {
            Self::Amr
        } else if format.starts_with("ogg") {
            Self::Ogg
        } else if format.contains("truesilk") || format == "silk" {
            Self::Silk
        } else if format.starts_with("riff") || format == "wav" {
            Self::Wav
        } else if format.starts_with("raw") || format == "pcm" {
            Self::Pcm
        } else if format.starts_with("webm") {
            Self::Webm
        } else if format.contains("opus") {
            Self::Opus
        } else if format.contains("mp3") {
            Self::Mp3
        } else if format == "aac" {
            Self::Aac
        } else if format == "flac" {
            Self::Flac
        } else {
            return None;
        };
        Some(container)
    }
}

/// Bitrate in kbit/s named by a provider format string
///
/// Understands `48kbitrate` and `32kbps` parts; formats without one
/// (`mp3`, `riff-24khz-16bit-mono-pcm`) yield `None`.
pub fn bitrate_from_output_format(format: &str) -> Option<u32> {
    format.to_lowercase().split('-').find_map(|part| {
        part.strip_suffix("kbitrate")
            .or_else(|| part.strip_suffix("kbps"))
            .and_then(|n| n.parse().ok())
    })
}

impl fmt::Display for AudioContainer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for AudioContainer {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_output_format(s).ok_or_else(|| anyhow::anyhow!("Unknown audio format: {}", s))
    }
}

/// How fragments are merged into one chapter stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Decode to PCM, insert silence, encode once to the backend's container
    #[default]
    DecodeConcatEncode,
    /// Append fragment bytes as returned
    RawConcat,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::DecodeConcatEncode => write!(f, "decode_concat_encode"),
            Self::RawConcat => write!(f, "raw_concat"),
        }
    }
}

impl FromStr for MergeStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "decode_concat_encode" | "decode" => Ok(Self::DecodeConcatEncode),
            "raw_concat" | "raw" => Ok(Self::RawConcat),
            _ => Err(anyhow::anyhow!("Invalid merge strategy: {}", s)),
        }
    }
}
