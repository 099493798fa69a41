/*!
 * Audio handling.
 *
 * - `format`: containers, extensions and merge strategies
 * - `pcm`: in-memory 16-bit PCM, silence and WAV encoding
 * - `decode`: fragment decoding with symphonia
 * - `encode`: final encode into the output container
 * - `assembler`: ordered merging of fragments and pauses
 * - `tags`: metadata handed to the external tagger
 */

pub mod assembler;
pub mod decode;
pub mod encode;
pub mod format;
pub mod pcm;
pub mod tags;

pub use assembler::{AssembledAudio, AudioAssembler, FragmentAudio, SynthesisResult};
pub use decode::decode_fragment;
pub use encode::{EncodeTarget, Encoder};
pub use format::{AudioContainer, MergeStrategy, bitrate_from_output_format};
pub use pcm::PcmBuffer;
pub use tags::{AudioTags, NoopTagger, Tagger};
