/*!
 * In-memory PCM audio.
 *
 * Decoded fragments are held as interleaved 16-bit samples. Fragments that
 * arrive at different rates or channel counts are converted to the first
 * fragment's layout before concatenation.
 */

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::errors::SynthesisError;

/// Interleaved signed 16-bit PCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl PcmBuffer {
    pub const SAMPLE_WIDTH_BYTES: u16 = 2;

    pub fn new(sample_rate: u32, channels: u16, samples: Vec<i16>) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            samples,
        }
    }

    /// An empty buffer, used in place of a fragment that failed to decode
    pub fn empty(sample_rate: u32, channels: u16) -> Self {
        Self::new(sample_rate, channels, Vec::new())
    }

    /// Digital silence of the given length
    pub fn silence(sample_rate: u32, channels: u16, duration_ms: u64) -> Self {
        let frames = (sample_rate as u64 * duration_ms / 1000) as usize;
        Self::new(
            sample_rate,
            channels,
            vec![0; frames * channels.max(1) as usize],
        )
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames() as u64 * 1000 / self.sample_rate as u64
    }

    /// Convert to another layout (channel mix, then linear resample)
    pub fn convert(&self, sample_rate: u32, channels: u16) -> PcmBuffer {
        let channels = channels.max(1);
        let mixed = self.remix(channels);
        if self.sample_rate == sample_rate || mixed.is_empty() {
            return PcmBuffer::new(sample_rate, channels, mixed);
        }
        PcmBuffer::new(
            sample_rate,
            channels,
            resample(&mixed, channels, self.sample_rate, sample_rate),
        )
    }

    fn remix(&self, channels: u16) -> Vec<i16> {
        if channels == self.channels {
            return self.samples.clone();
        }
        let src = self.channels as usize;
        let dst = channels as usize;
        let mut out = Vec::with_capacity(self.frames() * dst);

        for frame in self.samples.chunks_exact(src) {
            if dst == 1 {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                out.push((sum / src as i32) as i16);
            } else {
                // Mono or fewer channels spread over the extra outputs
                for ch in 0..dst {
                    out.push(frame[ch.min(src - 1)]);
                }
            }
        }
        out
    }

    /// Append another buffer, converting it to this layout
    pub fn append(&mut self, other: &PcmBuffer) {
        if other.sample_rate == self.sample_rate && other.channels == self.channels {
            self.samples.extend_from_slice(&other.samples);
        } else {
            let converted = other.convert(self.sample_rate, self.channels);
            self.samples.extend_from_slice(&converted.samples);
        }
    }

    /// Append silence in this buffer's layout
    pub fn append_silence(&mut self, duration_ms: u64) {
        let silence = PcmBuffer::silence(self.sample_rate, self.channels, duration_ms);
        self.samples.extend_from_slice(&silence.samples);
    }

    /// Encode as a 16-bit PCM WAV file
    pub fn to_wav(&self) -> Result<Vec<u8>, SynthesisError> {
        let spec = WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec)
                .map_err(|e| SynthesisError::Assembly(format!("WAV header: {}", e)))?;
            for &sample in &self.samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| SynthesisError::Assembly(format!("WAV samples: {}", e)))?;
            }
            writer
                .finalize()
                .map_err(|e| SynthesisError::Assembly(format!("WAV finalize: {}", e)))?;
        }
        Ok(cursor.into_inner())
    }
}

/// Linear interpolation resampler over interleaved frames
fn resample(samples: &[i16], channels: u16, from_rate: u32, to_rate: u32) -> Vec<i16> {
    let channels = channels as usize;
    let in_frames = samples.len() / channels;
    if in_frames == 0 || from_rate == 0 {
        return Vec::new();
    }
    let out_frames = (in_frames as u64 * to_rate as u64 / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let mut out = Vec::with_capacity(out_frames * channels);

    for frame in 0..out_frames {
        let position = frame as f64 * step;
        let index = position.floor() as usize;
        let fraction = position - index as f64;
        let next = (index + 1).min(in_frames - 1);
        for ch in 0..channels {
            let a = samples[index.min(in_frames - 1) * channels + ch] as f64;
            let b = samples[next * channels + ch] as f64;
            out.push((a + (b - a) * fraction).round() as i16);
        }
    }
    out
}
