/*!
 * Tests for segmentation properties and pause marker handling
 */

use voxbook::synthesis::{PauseKind, PauseProtocol, PauseSpec, Segmenter, segment};

const ENGLISH: &str = "The rain had not stopped for three days. Water ran down the \
    gutters, pooled in the square, and crept under the doors of the houses nearest \
    the river; nobody slept well. \"Is it over?\" she asked, looking out of the \
    window. Not yet, he said. The bells of the old church rang twice.";

const CHINESE: &str = "春眠不觉晓，处处闻啼鸟。夜来风雨声，花落知多少。\
    床前明月光，疑是地上霜。举头望明月，低头思故乡。";

const LIMITS: &[usize] = &[5, 12, 40, 200];

fn corpus() -> Vec<(String, &'static str)> {
    vec![
        (ENGLISH.to_string(), "en-US"),
        (format!("{} ", ENGLISH).repeat(6), "en"),
        (CHINESE.to_string(), "zh-CN"),
        (CHINESE.repeat(20), "ja"),
        ("a".repeat(333), "en"),
        ("Tabs\tand\nnewlines   everywhere.\n\nSecond   paragraph here.".to_string(), "fr"),
    ]
}

fn without_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Test that no chunk exceeds the limit
#[test]
fn test_segment_shouldRespectLimitForAllInputs() {
    for (text, lang) in corpus() {
        for &limit in LIMITS {
            let chunks = segment(&text, limit, lang).unwrap();
            for chunk in &chunks {
                assert!(
                    chunk.text.chars().count() <= limit,
                    "chunk {:?} exceeds {} for {}",
                    chunk.text,
                    limit,
                    lang
                );
                assert!(!chunk.text.trim().is_empty());
            }
        }
    }
}

/// Test that chunks reproduce the input apart from whitespace
#[test]
fn test_segment_shouldPreserveContent() {
    for (text, lang) in corpus() {
        for &limit in LIMITS {
            let chunks = segment(&text, limit, lang).unwrap();
            let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
            assert_eq!(without_whitespace(&joined), without_whitespace(&text));
        }
    }
}

/// Test that sequence indices are dense and ordered
#[test]
fn test_segment_shouldNumberChunksSequentially() {
    let chunks = segment(ENGLISH, 40, "en").unwrap();
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.sequence_index, i);
    }
}

/// Test that segmenting a chunk again yields the same chunk
#[test]
fn test_segment_ofChunk_shouldBeIdempotent() {
    for (text, lang) in corpus() {
        for &limit in LIMITS {
            for chunk in segment(&text, limit, lang).unwrap() {
                let again = segment(&chunk.text, limit, lang).unwrap();
                assert_eq!(again.len(), 1, "{:?} resplit at {}", chunk.text, limit);
                assert_eq!(again[0].text, chunk.text);
            }
        }
    }
}

/// Test that the marker never leaks into chunk text
#[test]
fn test_segment_withMarkers_shouldIsolateThem() {
    let text = format!(
        "{} @BRK#{} @QTE#{} @QTE# @BRK#{}",
        ENGLISH, CHINESE, ENGLISH, ENGLISH
    );
    for &limit in LIMITS {
        let segmenter = Segmenter::new(limit, "en", PauseProtocol::default()).unwrap();
        let result = segmenter.segment(&text);
        for chunk in &result.chunks {
            assert!(!segmenter.protocol().contains_marker(&chunk.text), "{}", chunk.text);
        }
        // The trailing quote marker and the break after it coalesce
        assert_eq!(result.pauses.len(), 3);
    }
}

/// Test that chunks between quote markers are flagged as quoted
#[test]
fn test_segment_withQuote_shouldFlagOnlyQuotedChunks() {
    let segmenter = Segmenter::new(100, "en", PauseProtocol::default()).unwrap();
    let result = segmenter.segment("She read aloud. @QTE#Dear friend. @QTE# Then she stopped.");

    let quoted: Vec<_> = result.chunks.iter().map(|c| c.quoted).collect();
    assert_eq!(quoted, vec![false, true, false]);
}

/// Test the marker example from the segmentation contract
#[test]
fn test_segment_withBreakMarker_shouldEmitPauseBetweenChunks() {
    let segmenter = Segmenter::new(100, "en", PauseProtocol::default()).unwrap();
    let result = segmenter.segment("Part one @BRK# Part two");

    let texts: Vec<_> = result.chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["Part one", "Part two"]);
    assert_eq!(
        result.pauses,
        vec![PauseSpec {
            after_chunk: Some(0),
            duration_ms: 1250,
            kind: PauseKind::Break,
        }]
    );
}

/// Test that a leading marker becomes a pause before the first chunk
#[test]
fn test_segment_withLeadingMarker_shouldAttachPauseBeforeFirstChunk() {
    let segmenter = Segmenter::new(100, "en", PauseProtocol::default()).unwrap();
    let result = segmenter.segment(" @BRK#Hello there.");
    assert_eq!(result.chunks.len(), 1);
    assert_eq!(result.pauses.len(), 1);
    assert_eq!(result.pauses[0].after_chunk, None);
}

/// Test that a trailing marker becomes a pause after the last chunk
#[test]
fn test_segment_withTrailingMarker_shouldAttachPauseAfterLastChunk() {
    let segmenter = Segmenter::new(100, "en", PauseProtocol::default()).unwrap();
    let result = segmenter.segment("One. @BRK#Two. @BRK#");
    assert_eq!(result.chunks.len(), 2);
    let anchors: Vec<_> = result.pauses.iter().map(|p| p.after_chunk).collect();
    assert_eq!(anchors, vec![Some(0), Some(1)]);
}

/// Test that consecutive markers coalesce into the longest pause
#[test]
fn test_segment_withConsecutiveMarkers_shouldKeepLongestPause() {
    let segmenter = Segmenter::new(100, "en", PauseProtocol::default()).unwrap();
    let result = segmenter.segment("Before. @QTE# @BRK#   @QTE#After.");
    assert_eq!(result.chunks.len(), 2);
    assert_eq!(
        result.pauses,
        vec![PauseSpec {
            after_chunk: Some(0),
            duration_ms: 1250,
            kind: PauseKind::Break,
        }]
    );
}

/// Test that a lone marker yields nothing at all
#[test]
fn test_segment_withOnlyMarker_shouldYieldNoChunksOrPauses() {
    let segmenter = Segmenter::new(100, "en", PauseProtocol::default()).unwrap();
    let result = segmenter.segment(" @BRK#");
    assert!(result.is_empty());
    assert!(result.pauses.is_empty());
}

/// Test that a custom break marker is honoured
#[test]
fn test_segment_withCustomMarker_shouldSplitOnIt() {
    let protocol = PauseProtocol::break_only("<<pause>>", 700).unwrap();
    let segmenter = Segmenter::new(100, "en", protocol).unwrap();
    let result = segmenter.segment("First<<pause>>Second");
    assert_eq!(result.chunks.len(), 2);
    assert_eq!(result.pauses[0].duration_ms, 700);
}

/// Test the three-sentence packing example
#[test]
fn test_segment_withLimitFitsTwoSentences_shouldPackGreedily() {
    let chunks = segment("One two. Three four. Five six.", 20, "en").unwrap();
    let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["One two. Three four.", "Five six."]);
}
