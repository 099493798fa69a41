/*!
 * Audio assembly.
 *
 * Merges per-chunk synthesis results, in sequence order, into one chapter
 * stream. Decode-concat-encode splices generated silence at every pause and
 * encodes once into the backend's container; raw concatenation appends
 * fragment bytes untouched.
 */

use bytes::Bytes;
use log::{debug, warn};

use super::encode::{EncodeTarget, Encoder};
use super::format::{AudioContainer, MergeStrategy};
use super::pcm::PcmBuffer;
use crate::errors::SynthesisError;
use crate::synthesis::pause::PauseSpec;

/// Layout used when no fragment carries audio
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Audio produced for one chunk
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentAudio {
    /// Decoded samples
    Pcm(PcmBuffer),
    /// Bytes exactly as returned by the backend
    Encoded(Bytes),
}

/// The outcome of synthesizing one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisResult {
    pub chunk_index: usize,
    pub audio: FragmentAudio,
    /// Retries spent before the call succeeded
    pub retries: u32,
}

/// A finished chapter stream
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledAudio {
    pub bytes: Vec<u8>,
    pub container: AudioContainer,
}

impl AssembledAudio {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Merges ordered fragments into a single stream
#[derive(Debug, Clone)]
pub struct AudioAssembler {
    strategy: MergeStrategy,
    /// Container of the raw fragments, and of the assembled output
    source: AudioContainer,
    bitrate_kbps: Option<u32>,
    encoder: Encoder,
}

impl AudioAssembler {
    pub fn new(strategy: MergeStrategy, source: AudioContainer) -> Self {
        Self {
            strategy,
            source,
            bitrate_kbps: None,
            encoder: Encoder::default(),
        }
    }

    /// Bitrate of the final encode
    pub fn with_bitrate(mut self, bitrate_kbps: Option<u32>) -> Self {
        self.bitrate_kbps = bitrate_kbps;
        self
    }

    pub fn with_encoder(mut self, encoder: Encoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// Container of the assembled output
    pub fn output_container(&self) -> AudioContainer {
        self.source
    }

    /// Check that raw concatenation can honour the request
    pub fn check_raw_concat(&self, needs_silence: bool) -> Result<(), SynthesisError> {
        if self.strategy != MergeStrategy::RawConcat {
            return Ok(());
        }
        if !self.source.is_concat_safe() {
            return Err(SynthesisError::InvalidArgument(format!(
                "Raw concatenation is not safe for {} fragments",
                self.source
            )));
        }
        if needs_silence {
            return Err(SynthesisError::InvalidArgument(
                "Raw concatenation cannot insert decoded silence for pauses".to_string(),
            ));
        }
        Ok(())
    }

    /// Merge decoded results and pauses into one PCM stream
    ///
    /// `results` may arrive in any order; they are placed by `chunk_index`,
    /// which must cover `0..results.len()` exactly.
    pub fn merge_pcm(
        &self,
        mut results: Vec<SynthesisResult>,
        pauses: &[PauseSpec],
    ) -> Result<PcmBuffer, SynthesisError> {
        sort_and_check(&mut results)?;
        concat_decoded(&results, pauses)
    }

    /// Assemble results into one stream
    ///
    /// Ordering follows `merge_pcm`. No results yields an empty stream.
    pub async fn assemble(
        &self,
        mut results: Vec<SynthesisResult>,
        pauses: &[PauseSpec],
    ) -> Result<AssembledAudio, SynthesisError> {
        sort_and_check(&mut results)?;

        let container = self.output_container();
        if results.is_empty() {
            return Ok(AssembledAudio {
                bytes: Vec::new(),
                container,
            });
        }

        let bytes = match self.strategy {
            MergeStrategy::RawConcat => {
                self.check_raw_concat(pauses.iter().any(|p| p.duration_ms > 0))?;
                concat_raw(&results)?
            }
            MergeStrategy::DecodeConcatEncode => {
                let pcm = concat_decoded(&results, pauses)?;
                let target = EncodeTarget::new(container, self.bitrate_kbps);
                self.encoder.encode(&pcm, &target).await?
            }
        };

        debug!(
            "Assembled {} fragments and {} pauses into {} bytes of {}",
            results.len(),
            pauses.len(),
            bytes.len(),
            container
        );
        Ok(AssembledAudio { bytes, container })
    }
}

fn sort_and_check(results: &mut [SynthesisResult]) -> Result<(), SynthesisError> {
    results.sort_by_key(|r| r.chunk_index);
    for (expected, result) in results.iter().enumerate() {
        if result.chunk_index != expected {
            return Err(SynthesisError::Assembly(format!(
                "Missing or duplicate fragment at position {} (found chunk {})",
                expected, result.chunk_index
            )));
        }
    }
    Ok(())
}

fn concat_raw(results: &[SynthesisResult]) -> Result<Vec<u8>, SynthesisError> {
    let mut out = Vec::new();
    for result in results {
        match &result.audio {
            FragmentAudio::Encoded(bytes) => out.extend_from_slice(bytes),
            FragmentAudio::Pcm(_) => {
                return Err(SynthesisError::Assembly(format!(
                    "Chunk {} was decoded but raw concatenation expects encoded bytes",
                    result.chunk_index
                )));
            }
        }
    }
    Ok(out)
}

fn concat_decoded(
    results: &[SynthesisResult],
    pauses: &[PauseSpec],
) -> Result<PcmBuffer, SynthesisError> {
    if results.is_empty() {
        return Ok(PcmBuffer::empty(DEFAULT_SAMPLE_RATE, 1));
    }

    let layout = results.iter().find_map(|r| match &r.audio {
        FragmentAudio::Pcm(pcm) if !pcm.is_empty() => Some((pcm.sample_rate, pcm.channels)),
        _ => None,
    });
    // Undecodable fragments arrive empty; a chapter of nothing but those is not audio
    let (sample_rate, channels) = match layout {
        Some(layout) => layout,
        None if results.iter().all(|r| matches!(r.audio, FragmentAudio::Pcm(_))) => {
            return Err(SynthesisError::Assembly(format!(
                "None of the {} fragments contained audio",
                results.len()
            )));
        }
        None => (DEFAULT_SAMPLE_RATE, 1),
    };
    let mut output = PcmBuffer::empty(sample_rate, channels);

    let pause_after = |index: Option<usize>| -> u64 {
        pauses
            .iter()
            .filter(|p| p.after_chunk == index)
            .map(|p| p.duration_ms)
            .sum()
    };

    output.append_silence(pause_after(None));
    for result in results {
        match &result.audio {
            FragmentAudio::Pcm(pcm) => {
                if pcm.is_empty() {
                    warn!("Chunk {} has no audio, continuing", result.chunk_index);
                }
                output.append(pcm);
            }
            FragmentAudio::Encoded(_) => {
                return Err(SynthesisError::Assembly(format!(
                    "Chunk {} was not decoded before assembly",
                    result.chunk_index
                )));
            }
        }
        output.append_silence(pause_after(Some(result.chunk_index)));
    }
    Ok(output)
}
