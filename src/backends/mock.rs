/*!
 * Mock backend implementation for testing.
 *
 * This module provides a deterministic in-process backend that simulates
 * different behaviors:
 * - `MockBackend::working()` - Always succeeds with a WAV fragment
 * - `MockBackend::fail_first(n)` - Transient failures for the first n calls
 * - `MockBackend::always_transient()` - Never succeeds
 * - `MockBackend::fatal()` - Rejects every request
 * - `MockBehavior::RenewalFailure` - Needs a token the endpoint never issues
 *
 * Every fragment is a constant-level WAV whose sample value is
 * `chunk index + 1`, so assembled output reveals fragment order.
 */

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{AccessToken, PauseHandling, SynthesisBackend, SynthesisRequest};
use crate::audio::{AudioContainer, PcmBuffer};
use crate::errors::BackendError;

/// Sample rate of generated fragments
pub const MOCK_SAMPLE_RATE: u32 = 8000;

/// Frames per generated fragment (10 ms)
pub const MOCK_FRAMES_PER_CHUNK: usize = 80;

/// Behavior mode for the mock backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Transient failures for the first `failures` calls, then success
    FailFirst { failures: usize },
    /// Transient failure on every call
    AlwaysTransient,
    /// Non-retryable rejection on every call
    Fatal,
    /// Every `every`-th chunk index returns undecodable bytes
    CorruptFragments { every: usize },
    /// Succeeds after a random delay of up to `max_ms`
    RandomLatency { max_ms: u64 },
    /// Requires a token, and every renewal fails transiently
    RenewalFailure,
}

impl FromStr for MockBehavior {
    type Err = anyhow::Error;

    /// Parse `working`, `fail_first:N`, `transient`, `fatal`, `corrupt:N`, `latency:MS`
    /// or `renewal_failure`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s, None),
        };
        let number = |default: u64| -> anyhow::Result<u64> {
            arg.map(|a| {
                a.trim()
                    .parse::<u64>()
                    .map_err(|e| anyhow!("Invalid mock argument '{}': {}", a, e))
            })
            .unwrap_or(Ok(default))
        };

        match name.trim().to_lowercase().as_str() {
            "" | "working" => Ok(Self::Working),
            "fail_first" => Ok(Self::FailFirst {
                failures: number(2)? as usize,
            }),
            "transient" => Ok(Self::AlwaysTransient),
            "fatal" => Ok(Self::Fatal),
            "corrupt" => Ok(Self::CorruptFragments {
                every: number(2)?.max(1) as usize,
            }),
            "latency" => Ok(Self::RandomLatency {
                max_ms: number(50)?,
            }),
            "renewal_failure" => Ok(Self::RenewalFailure),
            _ => Err(anyhow!("Invalid mock behavior: {}", s)),
        }
    }
}

/// Mock backend for testing synthesis behavior
#[derive(Debug, Clone)]
pub struct MockBackend {
    behavior: MockBehavior,
    /// Calls to `invoke`, shared between clones
    call_count: Arc<AtomicUsize>,
    /// Calls to `renew_token`, failed ones included, shared between clones
    renewal_count: Arc<AtomicUsize>,
    /// Every request received, in arrival order
    requests: Arc<Mutex<Vec<SynthesisRequest>>>,
    /// Token lifetime; `None` for a token-less backend
    token_ttl: Option<Duration>,
    /// Simulated latency of the token endpoint
    renewal_delay: Duration,
    pause_handling: PauseHandling,
    max_chars: usize,
    price: Option<f64>,
    /// Container the mock claims to return
    container: AudioContainer,
}

impl MockBackend {
    /// Create a new mock backend with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            call_count: Arc::new(AtomicUsize::new(0)),
            renewal_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            token_ttl: None,
            renewal_delay: Duration::from_millis(20),
            pause_handling: PauseHandling::Silence,
            max_chars: 1000,
            price: None,
            container: AudioContainer::Wav,
        }
    }

    /// Create a working mock backend that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a mock that fails transiently `failures` times first
    pub fn fail_first(failures: usize) -> Self {
        Self::new(MockBehavior::FailFirst { failures })
    }

    /// Create a mock that never succeeds
    pub fn always_transient() -> Self {
        Self::new(MockBehavior::AlwaysTransient)
    }

    /// Create a mock that rejects every request
    pub fn fatal() -> Self {
        Self::new(MockBehavior::Fatal)
    }

    /// Require bearer tokens valid for `ttl`
    pub fn with_token(mut self, ttl: Duration) -> Self {
        self.token_ttl = Some(ttl);
        self
    }

    pub fn with_pause_handling(mut self, pause_handling: PauseHandling) -> Self {
        self.pause_handling = pause_handling;
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// Claim a different fragment container; fragments stay WAV
    pub fn with_container(mut self, container: AudioContainer) -> Self {
        self.container = container;
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn renewal_count(&self) -> usize {
        self.renewal_count.load(Ordering::SeqCst)
    }

    /// Requests received so far, sorted by chunk index
    pub fn received_requests(&self) -> Vec<SynthesisRequest> {
        let mut requests = self.requests.lock().clone();
        requests.sort_by_key(|r| r.index);
        requests
    }

    /// The fragment the mock returns for a chunk
    pub fn fragment_for(index: usize) -> Result<Bytes, BackendError> {
        let level = (index + 1).min(i16::MAX as usize) as i16;
        let pcm = PcmBuffer::new(MOCK_SAMPLE_RATE, 1, vec![level; MOCK_FRAMES_PER_CHUNK]);
        pcm.to_wav()
            .map(Bytes::from)
            .map_err(|e| BackendError::Fatal(e.to_string()))
    }

    fn check_token(&self, token: Option<&AccessToken>) -> Result<(), BackendError> {
        if !self.requires_token() {
            return Ok(());
        }
        match token {
            None => Err(BackendError::TokenRenewal("No access token held".to_string())),
            Some(token) if !token.is_fresh(Duration::ZERO) => {
                Err(BackendError::TokenRejected("Token expired".to_string()))
            }
            Some(_) => Ok(()),
        }
    }
}

#[async_trait]
impl SynthesisBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn invoke(
        &self,
        request: &SynthesisRequest,
        token: Option<&AccessToken>,
    ) -> Result<Bytes, BackendError> {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        self.check_token(token)?;

        match self.behavior {
            MockBehavior::Working | MockBehavior::RenewalFailure => {
                Self::fragment_for(request.index)
            }

            MockBehavior::FailFirst { failures } => {
                if count < failures {
                    Err(BackendError::Transient(format!(
                        "Simulated outage (call {})",
                        count + 1
                    )))
                } else {
                    Self::fragment_for(request.index)
                }
            }

            MockBehavior::AlwaysTransient => Err(BackendError::Transient(
                "Simulated HTTP 503".to_string(),
            )),

            MockBehavior::Fatal => Err(BackendError::Fatal("Simulated HTTP 400".to_string())),

            MockBehavior::CorruptFragments { every } => {
                if (request.index + 1) % every == 0 {
                    Ok(Bytes::from_static(b"this is not an audio file"))
                } else {
                    Self::fragment_for(request.index)
                }
            }

            MockBehavior::RandomLatency { max_ms } => {
                let delay = rand::rng().random_range(0..=max_ms);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Self::fragment_for(request.index)
            }
        }
    }

    fn requires_token(&self) -> bool {
        self.token_ttl.is_some() || self.behavior == MockBehavior::RenewalFailure
    }

    async fn renew_token(&self) -> Result<AccessToken, BackendError> {
        if !self.requires_token() {
            return Err(BackendError::Fatal("mock does not use access tokens".to_string()));
        }
        tokio::time::sleep(self.renewal_delay).await;
        let n = self.renewal_count.fetch_add(1, Ordering::SeqCst) + 1;

        match self.token_ttl {
            Some(ttl) if self.behavior != MockBehavior::RenewalFailure => {
                Ok(AccessToken::new(format!("mock-token-{}", n), ttl))
            }
            _ => Err(BackendError::TokenRenewal(
                "Simulated token endpoint HTTP 503".to_string(),
            )),
        }
    }

    fn pause_handling(&self) -> PauseHandling {
        self.pause_handling
    }

    fn max_chunk_chars(&self, _language: &str) -> usize {
        self.max_chars
    }

    fn price_per_thousand_chars(&self) -> Option<f64> {
        self.price
    }

    fn container(&self) -> AudioContainer {
        self.container
    }

    fn validate_config(&self) -> Result<(), BackendError> {
        if self.max_chars == 0 {
            return Err(BackendError::Fatal("mock max_chars must be positive".to_string()));
        }
        Ok(())
    }
}
