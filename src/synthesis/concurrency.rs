/*!
 * Backend-specific concurrency tuning.
 *
 * Default chunk-level concurrency per backend, based on how each one is
 * hosted and rate limited. Users can override it per provider.
 */

use crate::app_config::TtsProvider;

/// Backend concurrency profile with tuned defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendProfile {
    /// Concurrent chunk requests within one chapter
    pub max_concurrent_requests: usize,
    /// Chapters worth running side by side
    pub recommended_parallel_chapters: usize,
}

impl BackendProfile {
    /// Get the profile for a given provider
    pub fn for_provider(provider: TtsProvider) -> Self {
        match provider {
            TtsProvider::Azure => Self {
                max_concurrent_requests: 4,
                recommended_parallel_chapters: 2,
            },
            TtsProvider::OpenAI => Self {
                max_concurrent_requests: 5,
                recommended_parallel_chapters: 2,
            },
            TtsProvider::OpenAICompatible => Self {
                // Usually a single local GPU
                max_concurrent_requests: 2,
                recommended_parallel_chapters: 1,
            },
            TtsProvider::Edge => Self {
                // The free service drops connections under heavier load
                max_concurrent_requests: 3,
                recommended_parallel_chapters: 1,
            },
            TtsProvider::Piper => Self {
                max_concurrent_requests: 1,
                recommended_parallel_chapters: 1,
            },
            TtsProvider::Mock => Self {
                max_concurrent_requests: 4,
                recommended_parallel_chapters: 4,
            },
        }
    }

    /// Get effective concurrent requests, respecting any user override
    pub fn effective_concurrent_requests(&self, user_override: Option<usize>) -> usize {
        user_override
            .filter(|&n| n > 0)
            .unwrap_or(self.max_concurrent_requests)
    }
}
