/*!
 * # voxbook - audiobooks from structured text
 *
 * A Rust library that turns books into per-chapter audio files using
 * text-to-speech backends.
 *
 * ## Features
 *
 * - Language-aware segmentation under a backend's request size limit
 * - In-band pause markers for breaks and quotes
 * - Concurrent chunk synthesis with bounded exponential backoff
 * - Shared access-token renewal for token-based backends
 * - Order-preserving reassembly with decoded silence or raw concatenation
 * - Backends:
 *   - Azure Cognitive Services Speech
 *   - OpenAI speech API and compatible servers
 *   - Edge read-aloud voices (edge-tts)
 *   - Piper (local)
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `document`: Book model and loaders
 * - `synthesis`: Segmentation, retry, orchestration and the chapter pipeline
 * - `audio`: Fragment decoding, PCM handling and assembly
 * - `backends`: TTS backend implementations
 * - `file_utils`: Safe file names and atomic writes
 * - `app_controller`: Book-level driver
 * - `language_utils`: Language hint utilities
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod audio;
pub mod backends;
pub mod document;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod synthesis;

// Re-export main types for easier usage
pub use app_config::{Config, TtsProvider};
pub use app_controller::{Controller, RunOptions, RunSummary};
pub use backends::{SynthesisBackend, create_backend};
pub use document::{Book, Chapter, DocumentNode};
pub use errors::{AppError, BackendError, SynthesisError};
pub use synthesis::{ChapterPipeline, Segmenter, segment};
