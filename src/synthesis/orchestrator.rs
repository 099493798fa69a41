/*!
 * Concurrent chunk synthesis for one chapter.
 *
 * Up to `concurrency` chunks are in flight at once. Every chunk is retried
 * under the shared backoff policy, results are put back in sequence order,
 * and the first chunk that cannot be synthesized aborts the chapter.
 *
 * Token-based backends share one access token per orchestrator. The token
 * is renewed under a lock so concurrent workers never renew twice.
 */

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::retry::{RetryError, RetryPolicy, with_backoff};
use crate::audio::assembler::DEFAULT_SAMPLE_RATE;
use crate::audio::{FragmentAudio, PcmBuffer, SynthesisResult, decode_fragment};
use crate::backends::{AccessToken, SynthesisBackend, SynthesisRequest};
use crate::errors::{BackendError, SynthesisError};

/// Called with `(completed, total)` after every finished chunk
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Tuning for one orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorOptions {
    /// Chunks in flight at once
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Renew the access token this long before it expires
    pub token_safety_margin: Duration,
    /// Decode fragments to PCM as they arrive
    pub decode_fragments: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry: RetryPolicy::default(),
            token_safety_margin: Duration::from_secs(30),
            decode_fragments: true,
        }
    }
}

/// Drives a backend over the chunks of one chapter
pub struct Orchestrator {
    backend: Arc<dyn SynthesisBackend>,
    options: OrchestratorOptions,
    token: Mutex<Option<AccessToken>>,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn SynthesisBackend>, options: OrchestratorOptions) -> Self {
        Self {
            backend,
            options,
            token: Mutex::new(None),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Synthesize every request, returning results ordered by chunk index
    ///
    /// `chapter` only labels log lines and errors.
    pub async fn synthesize(
        &self,
        chapter: &str,
        requests: &[SynthesisRequest],
    ) -> Result<Vec<SynthesisResult>, SynthesisError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let total = requests.len();
        let completed = AtomicUsize::new(0);
        let concurrency = self.options.concurrency.max(1);
        debug!(
            "{}: synthesizing {} chunks with {} (concurrency {})",
            chapter,
            total,
            self.backend.name(),
            concurrency
        );

        // Dropping the stream on the first error cancels the chunks still in flight
        let mut results: Vec<SynthesisResult> = stream::iter(requests)
            .map(|request| self.synthesize_one(chapter, request, total, &completed))
            .buffer_unordered(concurrency)
            .try_collect()
            .await?;

        results.sort_by_key(|r| r.chunk_index);
        Ok(results)
    }

    async fn synthesize_one(
        &self,
        chapter: &str,
        request: &SynthesisRequest,
        total: usize,
        completed: &AtomicUsize,
    ) -> Result<SynthesisResult, SynthesisError> {
        if self.cancel.is_cancelled() {
            return Err(SynthesisError::Cancelled {
                chapter: chapter.to_string(),
            });
        }

        info!("{}: chunk {} of {}", chapter, request.index + 1, total);
        let label = format!("{} chunk {}", chapter, request.index);
        let outcome = with_backoff(&self.options.retry, &label, &self.cancel, || {
            self.attempt(request)
        })
        .await
        .map_err(|e| self.chapter_error(chapter, request.index, e))?;

        let audio = self.to_fragment(request.index, outcome.value).await;

        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(progress) = &self.progress {
            progress(done, total);
        }

        Ok(SynthesisResult {
            chunk_index: request.index,
            audio,
            retries: outcome.retries,
        })
    }

    /// Decode on the blocking pool so other chunks keep their I/O going
    async fn to_fragment(&self, index: usize, bytes: Bytes) -> FragmentAudio {
        if !self.options.decode_fragments {
            return FragmentAudio::Encoded(bytes);
        }
        let container = self.backend.container();
        let decoded =
            tokio::task::spawn_blocking(move || decode_fragment(&bytes, Some(container))).await;

        match decoded {
            Ok(Ok(pcm)) => FragmentAudio::Pcm(pcm),
            Ok(Err(e)) => {
                warn!("Chunk {} could not be decoded, using silence: {}", index, e);
                FragmentAudio::Pcm(PcmBuffer::empty(DEFAULT_SAMPLE_RATE, 1))
            }
            Err(e) => {
                warn!("Decoding chunk {} did not finish, using silence: {}", index, e);
                FragmentAudio::Pcm(PcmBuffer::empty(DEFAULT_SAMPLE_RATE, 1))
            }
        }
    }

    /// One backend call with the current token
    async fn attempt(&self, request: &SynthesisRequest) -> Result<Bytes, BackendError> {
        let token = self.current_token().await?;
        match self.backend.invoke(request, token.as_ref()).await {
            Err(e @ BackendError::TokenRejected(_)) => {
                if let Some(token) = &token {
                    self.invalidate_token(&token.value).await;
                }
                Err(e)
            }
            other => other,
        }
    }

    /// The held token, renewed first if it is missing or about to expire
    async fn current_token(&self) -> Result<Option<AccessToken>, BackendError> {
        if !self.backend.requires_token() {
            return Ok(None);
        }

        let mut held = self.token.lock().await;
        if let Some(token) = held.as_ref() {
            if token.is_fresh(self.options.token_safety_margin) {
                return Ok(Some(token.clone()));
            }
        }

        debug!("Renewing access token for {}", self.backend.name());
        let renewal = with_backoff(&self.options.retry, "token renewal", &self.cancel, || {
            self.backend.renew_token()
        })
        .await;

        match renewal {
            Ok(outcome) => {
                *held = Some(outcome.value.clone());
                Ok(Some(outcome.value))
            }
            Err(RetryError::Exhausted { error, attempts }) => Err(BackendError::RenewalExhausted {
                attempts,
                message: error.to_string(),
            }),
            Err(RetryError::Rejected { error, .. }) => Err(error),
            Err(RetryError::Cancelled) => Err(BackendError::Fatal(
                "Token renewal cancelled".to_string(),
            )),
        }
    }

    /// Forget the held token if it is still the one that was rejected
    async fn invalidate_token(&self, rejected: &str) {
        let mut held = self.token.lock().await;
        if held.as_ref().is_some_and(|t| t.value == rejected) {
            debug!("Dropping rejected access token");
            *held = None;
        }
    }

    fn chapter_error(&self, chapter: &str, chunk_index: usize, error: RetryError) -> SynthesisError {
        if self.cancel.is_cancelled() {
            return SynthesisError::Cancelled {
                chapter: chapter.to_string(),
            };
        }
        match error {
            RetryError::Cancelled => SynthesisError::Cancelled {
                chapter: chapter.to_string(),
            },
            RetryError::Exhausted { error, attempts } => {
                error!(
                    "{}: chunk {} failed after {} attempts: {}",
                    chapter, chunk_index, attempts, error
                );
                SynthesisError::FatalChapter {
                    chapter: chapter.to_string(),
                    chunk_index,
                    attempts,
                    source: error,
                }
            }
            RetryError::Rejected {
                error: BackendError::RenewalExhausted { attempts, message },
                ..
            } => {
                let source = BackendError::RenewalExhausted { attempts, message };
                error!("{}: chunk {} has no access token: {}", chapter, chunk_index, source);
                SynthesisError::FatalChapter {
                    chapter: chapter.to_string(),
                    chunk_index,
                    attempts,
                    source,
                }
            }
            RetryError::Rejected { error, .. } => {
                error!("{}: chunk {} rejected: {}", chapter, chunk_index, error);
                SynthesisError::FatalBackend {
                    chapter: chapter.to_string(),
                    chunk_index,
                    source: error,
                }
            }
        }
    }
}
