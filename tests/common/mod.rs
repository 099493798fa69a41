/*!
 * Common test utilities for the voxbook test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use voxbook::app_config::{Config, TtsProvider};
use voxbook::audio::{AudioContainer, Encoder, MergeStrategy, decode_fragment};
use voxbook::document::{Book, Chapter, DocumentNode};
use voxbook::synthesis::{OrchestratorOptions, PauseProtocol, PipelineSettings, RetryPolicy};

/// Route `log` output through the test harness; `RUST_LOG` picks the level
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// A config that uses the offline mock backend
pub fn mock_config() -> Config {
    let mut config = Config::default();
    config.language = "en".to_string();
    config.tts.provider = TtsProvider::Mock;
    config
}

/// Retry policy with short delays, for use with tokio's paused clock
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: std::time::Duration::from_millis(10),
        max_delay: std::time::Duration::from_millis(100),
    }
}

/// Pipeline settings writing into `dir` with the default pause protocol
pub fn pipeline_settings(dir: &Path) -> PipelineSettings {
    PipelineSettings {
        language: "en".to_string(),
        max_chars: None,
        protocol: PauseProtocol::default(),
        merge_strategy: MergeStrategy::DecodeConcatEncode,
        encoder: Encoder::default(),
        orchestrator: OrchestratorOptions::default(),
        output_dir: dir.to_path_buf(),
        output_text: false,
    }
}

/// A chapter of `sentences` short sentences, one paragraph each
pub fn chapter_with_breaks(title: &str, sentences: usize) -> Chapter {
    let mut children = Vec::new();
    for i in 0..sentences {
        if i > 0 {
            children.push(DocumentNode::Break);
        }
        children.push(DocumentNode::text(format!("Sentence number {}.", i + 1)));
    }
    Chapter::new(title, children)
}

/// A small book with three chapters
pub fn sample_book() -> Book {
    Book {
        title: "Sample Book".to_string(),
        author: "Test Author".to_string(),
        chapters: vec![
            chapter_with_breaks("Opening", 2),
            chapter_with_breaks("Middle", 3),
            chapter_with_breaks("Ending", 1),
        ],
    }
}

/// Decode an assembled WAV file into its samples
pub fn read_samples(path: &Path) -> Result<Vec<i16>> {
    let bytes = fs::read(path)?;
    Ok(decode_fragment(&bytes, Some(AudioContainer::Wav))?.samples)
}

/// Distinct non-silent levels in order of appearance
///
/// Mock fragments are constant at `chunk index + 1`, so this reveals the
/// order in which fragments were assembled.
pub fn fragment_levels(samples: &[i16]) -> Vec<i16> {
    let mut levels: Vec<i16> = Vec::new();
    for &sample in samples.iter().filter(|&&s| s != 0) {
        if levels.last() != Some(&sample) {
            levels.push(sample);
        }
    }
    levels
}
