/*!
 * Text segmentation.
 *
 * Splits flattened chapter text into ordered chunks no longer than a
 * backend's character limit. Sentences are packed greedily; sentences that
 * are too long on their own are split at the best punctuation inside the
 * limit, and as a last resort at the limit itself. Pause markers are hard
 * boundaries and are recorded as `PauseSpec`s instead of chunk text.
 *
 * Lengths are measured in Unicode scalar values (code points).
 */

use log::debug;
use unicode_segmentation::UnicodeSegmentation;

use crate::errors::SynthesisError;
use crate::language_utils::{SegmentationUnit, segmentation_unit};

use super::pause::{MarkedPiece, PauseKind, PauseProtocol, PauseSpec};

/// Below this limit punctuation scanning is skipped and text is cut by unit
pub const PUNCTUATION_SCAN_THRESHOLD: usize = 5;

/// Split point classes in precedence order
///
/// The punctuation stays with the left part. A pattern ending in a space
/// consumes the space.
const SPLIT_CLASSES: &[&[&str]] = &[
    &["。", "！", "？", ". ", "! ", "? "],
    &["；", ";"],
    &["，", ","],
    &["：", ":"],
    &["）", ")", "]", "】", "}", "」", "』"],
    &["、"],
    &["—", "–", "-"],
    &[" "],
];

/// A bounded unit of text submitted as one TTS request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub sequence_index: usize,
    pub text: String,
    /// Text between an opening and a closing quote marker
    pub quoted: bool,
}

/// Output of segmenting one chapter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmentation {
    pub chunks: Vec<Chunk>,
    pub pauses: Vec<PauseSpec>,
}

impl Segmentation {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_chars(&self) -> usize {
        self.chunks.iter().map(|c| char_len(&c.text)).sum()
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte offset just past the first `n` code points of `text`
fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices()
        .nth(n)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Language-aware chunker for one backend limit
#[derive(Debug, Clone)]
pub struct Segmenter {
    max_chars: usize,
    unit: SegmentationUnit,
    protocol: PauseProtocol,
}

impl Segmenter {
    /// Create a segmenter; `max_chars` must be positive
    pub fn new(
        max_chars: usize,
        language_hint: &str,
        protocol: PauseProtocol,
    ) -> Result<Self, SynthesisError> {
        if max_chars == 0 {
            return Err(SynthesisError::InvalidArgument(
                "Maximum chunk size must be positive".to_string(),
            ));
        }
        Ok(Self {
            max_chars,
            unit: segmentation_unit(language_hint),
            protocol,
        })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn protocol(&self) -> &PauseProtocol {
        &self.protocol
    }

    /// Segment marked text into chunks and pauses
    ///
    /// Consecutive markers with no speakable text between them collapse into
    /// one pause carrying the longest duration. A marker before any text
    /// yields a leading pause (`after_chunk == None`). Text with no chunks at
    /// all yields no pauses.
    pub fn segment(&self, text: &str) -> Segmentation {
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut pauses: Vec<PauseSpec> = Vec::new();
        let mut pending: Option<(u64, PauseKind)> = None;
        let mut quoted = false;

        for piece in self.protocol.split(text) {
            match piece {
                MarkedPiece::Pause(marker) => {
                    if marker.kind == PauseKind::Quote {
                        quoted = !quoted;
                    }
                    pending = match pending {
                        Some((duration, _)) if duration >= marker.duration_ms => pending,
                        _ => Some((marker.duration_ms, marker.kind)),
                    };
                }
                MarkedPiece::Text(segment) => {
                    let parts = self.pack(segment);
                    if parts.is_empty() {
                        continue;
                    }
                    if let Some((duration_ms, kind)) = pending.take() {
                        pauses.push(PauseSpec {
                            after_chunk: chunks.len().checked_sub(1),
                            duration_ms,
                            kind,
                        });
                    }
                    for part in parts {
                        chunks.push(Chunk {
                            sequence_index: chunks.len(),
                            text: part,
                            quoted,
                        });
                    }
                }
            }
        }

        if let Some((duration_ms, kind)) = pending {
            if !chunks.is_empty() {
                pauses.push(PauseSpec {
                    after_chunk: Some(chunks.len() - 1),
                    duration_ms,
                    kind,
                });
            }
        }
        if chunks.is_empty() {
            pauses.clear();
        }

        debug!(
            "Segmented {} characters into {} chunks and {} pauses (limit {})",
            char_len(text),
            chunks.len(),
            pauses.len(),
            self.max_chars
        );
        Segmentation { chunks, pauses }
    }

    /// Greedy sentence packing of marker-free text
    fn pack(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = String::new();
        let mut current_len = 0;

        for raw in text.split_sentence_bounds() {
            let sentence = collapse_whitespace(raw);
            if sentence.is_empty() {
                continue;
            }
            let len = char_len(&sentence);

            if len > self.max_chars {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                out.extend(self.split_long(&sentence));
                continue;
            }

            let joiner = joiner(&current, &sentence);
            if current.is_empty() {
                current = sentence;
                current_len = len;
            } else if current_len + joiner.len() + len <= self.max_chars {
                current.push_str(joiner);
                current.push_str(&sentence);
                current_len += joiner.len() + len;
            } else {
                out.push(std::mem::replace(&mut current, sentence));
                current_len = len;
            }
        }

        if !current.is_empty() {
            out.push(current);
        }
        out
    }

    /// Split a sentence longer than the limit
    fn split_long(&self, sentence: &str) -> Vec<String> {
        if self.max_chars < PUNCTUATION_SCAN_THRESHOLD {
            return self.split_by_unit(sentence);
        }

        let mut parts = Vec::new();
        let mut rest = sentence.trim();

        while !rest.is_empty() {
            if char_len(rest) <= self.max_chars {
                parts.push(rest.to_string());
                break;
            }

            let window_end = byte_offset(rest, self.max_chars);
            let (left_end, resume) = self
                .find_split_point(rest, window_end)
                .unwrap_or_else(|| (hard_split_offset(rest, window_end), None));
            let resume = resume.unwrap_or(left_end);

            let left = rest[..left_end].trim();
            if !left.is_empty() {
                parts.push(left.to_string());
            }
            rest = rest[resume..].trim_start();
        }
        parts
    }

    /// Find the rightmost split point of the highest-priority class
    ///
    /// Returns the end of the left part and, when a space is consumed, the
    /// offset where the remainder starts.
    fn find_split_point(&self, rest: &str, window_end: usize) -> Option<(usize, Option<usize>)> {
        let window = &rest[..window_end];

        for class in SPLIT_CLASSES {
            let best = class
                .iter()
                .filter_map(|&pattern| {
                    let kept = pattern.trim_end();
                    window
                        .rmatch_indices(pattern)
                        .map(|(pos, _)| (pos + kept.len(), pos + pattern.len()))
                        .find(|&(left_end, resume)| {
                            !window[..left_end].trim().is_empty()
                                && self.is_unit_boundary(rest, resume)
                        })
                })
                .max_by_key(|&(left_end, _)| left_end);

            if let Some((left_end, resume)) = best {
                return Some((left_end, Some(resume)));
            }
        }
        None
    }

    /// Whether cutting at `offset` keeps whole units on both sides
    fn is_unit_boundary(&self, text: &str, offset: usize) -> bool {
        match self.unit {
            SegmentationUnit::CodePoint => true,
            SegmentationUnit::Word => {
                let before = text[..offset].chars().next_back();
                let after = text[offset..].chars().next();
                match (before, after) {
                    (None, _) | (_, None) => true,
                    (Some(b), Some(a)) => {
                        b.is_whitespace() || a.is_whitespace() || is_cjk(a) || is_cjk(b)
                    }
                }
            }
        }
    }

    /// Cut into raw units with no look-ahead, for very small limits
    fn split_by_unit(&self, sentence: &str) -> Vec<String> {
        match self.unit {
            SegmentationUnit::CodePoint => split_graphemes(sentence, self.max_chars),
            SegmentationUnit::Word => {
                let mut out = Vec::new();
                let mut current = String::new();
                for word in sentence.split_whitespace() {
                    let len = char_len(word);
                    if len > self.max_chars {
                        if !current.is_empty() {
                            out.push(std::mem::take(&mut current));
                        }
                        out.extend(split_graphemes(word, self.max_chars));
                    } else if current.is_empty() {
                        current = word.to_string();
                    } else if char_len(&current) + 1 + len <= self.max_chars {
                        current.push(' ');
                        current.push_str(word);
                    } else {
                        out.push(std::mem::replace(&mut current, word.to_string()));
                    }
                }
                if !current.is_empty() {
                    out.push(current);
                }
                out
            }
        }
    }
}

/// CJK ideographs and kana, which may be split between any two characters
fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF      // Hiragana, Katakana
        | 0x3400..=0x4DBF    // CJK Extension A
        | 0x4E00..=0x9FFF    // CJK Unified Ideographs
        | 0xF900..=0xFAFF    // Compatibility Ideographs
        | 0x20000..=0x2FA1F) // Supplementary ideographs
}

/// Full-width punctuation and symbols
fn is_wide_punctuation(c: char) -> bool {
    matches!(c as u32, 0x3000..=0x303F | 0xFF00..=0xFFEF)
}

/// Separator between two packed sentences; CJK text is joined without a space
fn joiner(left: &str, right: &str) -> &'static str {
    let wide = |c: Option<char>| c.is_some_and(|c| is_cjk(c) || is_wide_punctuation(c));
    if wide(left.chars().next_back()) || wide(right.chars().next()) {
        ""
    } else {
        " "
    }
}

/// Offset at or before `window_end` that does not cut a grapheme cluster
fn hard_split_offset(text: &str, window_end: usize) -> usize {
    let boundary = text
        .grapheme_indices(true)
        .map(|(offset, _)| offset)
        .take_while(|&offset| offset <= window_end)
        .last()
        .unwrap_or(0);

    // A single cluster wider than the window is cut at the code point
    if boundary == 0 { window_end } else { boundary }
}

/// Cut text into pieces of at most `max_chars` code points on grapheme boundaries
fn split_graphemes(text: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        if char_len(rest) <= max_chars {
            out.push(rest.to_string());
            break;
        }
        let cut = hard_split_offset(rest, byte_offset(rest, max_chars));
        out.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    out
}

/// Segment plain text with the default pause protocol
pub fn segment(
    text: &str,
    max_chars: usize,
    language_hint: &str,
) -> Result<Vec<Chunk>, SynthesisError> {
    let segmenter = Segmenter::new(max_chars, language_hint, PauseProtocol::default())?;
    Ok(segmenter.segment(text).chunks)
}
