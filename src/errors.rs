/*!
 * Error types for the voxbook library.
 *
 * Backend failures are classified as transient or fatal so the retry
 * combinator knows what to repeat. Everything that cannot be resolved at the
 * chunk level ends up as a `SynthesisError` that aborts the whole chapter.
 */

use thiserror::Error;

/// Errors returned by a TTS backend for a single call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Network failure or 5xx-class response, safe to retry
    #[error("Transient backend failure: {0}")]
    Transient(String),

    /// Non-retryable rejection (bad credentials, invalid voice or format, 4xx)
    #[error("Backend rejected request: {0}")]
    Fatal(String),

    /// Access token could not be obtained
    #[error("Token renewal failed: {0}")]
    TokenRenewal(String),

    /// The backend refused the bearer token we sent; a fresh one is needed
    #[error("Access token rejected: {0}")]
    TokenRejected(String),

    /// Token renewal failed on every attempt of its retry budget
    #[error("Token renewal gave up after {attempts} attempts: {message}")]
    RenewalExhausted { attempts: u32, message: String },
}

impl BackendError {
    /// Whether the failure may go away if the same call is repeated
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::TokenRenewal(_) | Self::TokenRejected(_)
        )
    }

    /// Classify an HTTP status code returned by a backend
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = format!("HTTP {}: {}", status, message.into());
        match status {
            401 => Self::TokenRejected(message),
            408 | 429 => Self::Transient(message),
            s if s >= 500 => Self::Transient(message),
            _ => Self::Fatal(message),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => Self::from_status(status.as_u16(), error.to_string()),
            // Connection resets, DNS failures and timeouts all land here
            None => Self::Transient(error.to_string()),
        }
    }
}

/// A returned audio fragment could not be decoded
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unrecognised audio container: {0}")]
    UnknownFormat(String),

    #[error("No decodable audio track in fragment")]
    NoTrack,

    #[error("Decoder failure: {0}")]
    Codec(String),
}

/// Errors that abort the synthesis of a chapter
#[derive(Error, Debug)]
pub enum SynthesisError {
    /// Caller misuse, never retried
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A chunk exhausted its retries
    #[error("Chapter '{chapter}' failed at chunk {chunk_index} after {attempts} attempts: {source}")]
    FatalChapter {
        chapter: String,
        chunk_index: usize,
        attempts: u32,
        #[source]
        source: BackendError,
    },

    /// The backend rejected a chunk outright
    #[error("Chapter '{chapter}' rejected by backend at chunk {chunk_index}: {source}")]
    FatalBackend {
        chapter: String,
        chunk_index: usize,
        #[source]
        source: BackendError,
    },

    /// The run was interrupted before the chapter completed
    #[error("Chapter '{chapter}' cancelled")]
    Cancelled { chapter: String },

    /// The fragments could not be merged into one stream
    #[error("Audio assembly failed: {0}")]
    Assembly(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthesisError {
    /// Chunk index the error is attached to, if any
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Self::FatalChapter { chunk_index, .. } | Self::FatalBackend { chunk_index, .. } => {
                Some(*chunk_index)
            }
            _ => None,
        }
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error while producing a chapter
    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
