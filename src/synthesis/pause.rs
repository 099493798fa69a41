/*!
 * Pause protocol.
 *
 * Reserved marker strings are threaded through flattened chapter text to mark
 * where silence belongs. The segmenter splits on them and records a
 * `PauseSpec` for each (coalesced) run of markers.
 */

use serde::{Deserialize, Serialize};

use crate::errors::SynthesisError;

/// Default marker inserted at `Break` nodes
pub const DEFAULT_BREAK_MARKER: &str = " @BRK#";

/// Default marker wrapped around `Quote` nodes
pub const DEFAULT_QUOTE_MARKER: &str = " @QTE#";

/// Default break duration in milliseconds
pub const DEFAULT_BREAK_DURATION_MS: u64 = 1250;

/// Default quote pause duration in milliseconds
pub const DEFAULT_QUOTE_PAUSE_MS: u64 = 400;

/// Which document construct produced a pause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseKind {
    Break,
    Quote,
}

/// A pause between chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseSpec {
    /// Chunk the pause follows; `None` means before the first chunk
    pub after_chunk: Option<usize>,
    pub duration_ms: u64,
    pub kind: PauseKind,
}

/// One reserved marker and what it stands for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseMarker {
    pub marker: String,
    pub kind: PauseKind,
    pub duration_ms: u64,
}

/// A piece of marked text: either plain text or a marker occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkedPiece<'a> {
    Text(&'a str),
    Pause(&'a PauseMarker),
}

/// The set of reserved markers for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseProtocol {
    break_marker: PauseMarker,
    quote_marker: Option<PauseMarker>,
}

impl Default for PauseProtocol {
    fn default() -> Self {
        Self {
            break_marker: PauseMarker {
                marker: DEFAULT_BREAK_MARKER.to_string(),
                kind: PauseKind::Break,
                duration_ms: DEFAULT_BREAK_DURATION_MS,
            },
            quote_marker: Some(PauseMarker {
                marker: DEFAULT_QUOTE_MARKER.to_string(),
                kind: PauseKind::Quote,
                duration_ms: DEFAULT_QUOTE_PAUSE_MS,
            }),
        }
    }
}

impl PauseProtocol {
    /// Protocol with only a break marker
    pub fn break_only(marker: &str, duration_ms: u64) -> Result<Self, SynthesisError> {
        Self::new(marker, duration_ms, None)
    }

    /// Protocol with a break marker and an optional quote marker
    pub fn new(
        break_marker: &str,
        break_duration_ms: u64,
        quote: Option<(&str, u64)>,
    ) -> Result<Self, SynthesisError> {
        if break_marker.trim().is_empty() {
            return Err(SynthesisError::InvalidArgument(
                "Break marker must contain a non-whitespace character".to_string(),
            ));
        }

        let quote_marker = match quote {
            Some((marker, _)) if marker.trim().is_empty() => {
                return Err(SynthesisError::InvalidArgument(
                    "Quote marker must contain a non-whitespace character".to_string(),
                ));
            }
            Some((marker, _)) if marker.contains(break_marker) || break_marker.contains(marker) => {
                return Err(SynthesisError::InvalidArgument(format!(
                    "Quote marker '{}' overlaps break marker '{}'",
                    marker, break_marker
                )));
            }
            Some((marker, duration_ms)) => Some(PauseMarker {
                marker: marker.to_string(),
                kind: PauseKind::Quote,
                duration_ms,
            }),
            None => None,
        };

        Ok(Self {
            break_marker: PauseMarker {
                marker: break_marker.to_string(),
                kind: PauseKind::Break,
                duration_ms: break_duration_ms,
            },
            quote_marker,
        })
    }

    pub fn break_marker(&self) -> &str {
        &self.break_marker.marker
    }

    pub fn quote_marker(&self) -> Option<&str> {
        self.quote_marker.as_ref().map(|m| m.marker.as_str())
    }

    fn markers(&self) -> impl Iterator<Item = &PauseMarker> {
        std::iter::once(&self.break_marker).chain(self.quote_marker.as_ref())
    }

    /// Whether `text` contains any reserved marker, with or without its padding
    pub fn contains_marker(&self, text: &str) -> bool {
        self.markers().any(|m| text.contains(m.marker.trim()))
    }

    /// Split text into plain pieces and marker occurrences, in order
    pub fn split<'a>(&'a self, text: &'a str) -> Vec<MarkedPiece<'a>> {
        let mut pieces = Vec::new();
        let mut rest = text;

        loop {
            let next = self
                .markers()
                .filter_map(|m| rest.find(&m.marker).map(|pos| (pos, m)))
                .min_by_key(|(pos, m)| (*pos, std::cmp::Reverse(m.marker.len())));

            match next {
                Some((pos, marker)) => {
                    if pos > 0 {
                        pieces.push(MarkedPiece::Text(&rest[..pos]));
                    }
                    pieces.push(MarkedPiece::Pause(marker));
                    rest = &rest[pos + marker.marker.len()..];
                }
                None => {
                    if !rest.is_empty() {
                        pieces.push(MarkedPiece::Text(rest));
                    }
                    return pieces;
                }
            }
        }
    }
}

/// Fold pauses into per-chunk leading/trailing durations
///
/// Returns `(before_ms, after_ms)` for each of `chunk_count` chunks. A pause
/// with no preceding chunk becomes leading silence of chunk 0.
pub fn fold_into_chunks(pauses: &[PauseSpec], chunk_count: usize) -> Vec<(u64, u64)> {
    let mut folded = vec![(0u64, 0u64); chunk_count];
    for pause in pauses {
        match pause.after_chunk {
            None => {
                if let Some(first) = folded.first_mut() {
                    first.0 += pause.duration_ms;
                }
            }
            Some(index) => {
                if let Some(slot) = folded.get_mut(index) {
                    slot.1 += pause.duration_ms;
                }
            }
        }
    }
    folded
}
