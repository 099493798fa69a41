/*!
 * Integration tests for concurrent chunk synthesis
 *
 * Retry timing runs on tokio's paused clock, so multi-second backoffs
 * finish instantly while elapsed virtual time stays observable.
 */

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::common::fast_retry;
use voxbook::audio::FragmentAudio;
use voxbook::backends::SynthesisRequest;
use voxbook::backends::mock::{MockBackend, MockBehavior};
use voxbook::errors::{BackendError, SynthesisError};
use voxbook::synthesis::{Orchestrator, OrchestratorOptions, RetryPolicy};

fn requests(n: usize) -> Vec<SynthesisRequest> {
    (0..n)
        .map(|i| SynthesisRequest::new(i, format!("Chunk text {}.", i)))
        .collect()
}

fn options(concurrency: usize, retry: RetryPolicy) -> OrchestratorOptions {
    OrchestratorOptions {
        concurrency,
        retry,
        ..OrchestratorOptions::default()
    }
}

/// Test that out-of-order completion still yields ordered fragments
#[tokio::test]
async fn test_synthesize_withRandomLatency_shouldKeepChunkOrder() {
    let mock = MockBackend::new(MockBehavior::RandomLatency { max_ms: 15 });
    let orchestrator = Orchestrator::new(Arc::new(mock.clone()), options(8, fast_retry(3)));

    let results = orchestrator.synthesize("Latency", &requests(24)).await.unwrap();

    assert_eq!(results.len(), 24);
    assert_eq!(mock.call_count(), 24);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.chunk_index, i);
        assert_eq!(result.retries, 0);
        match &result.audio {
            FragmentAudio::Pcm(pcm) => assert_eq!(pcm.samples[0], i as i16 + 1),
            FragmentAudio::Encoded(_) => panic!("fragment {} was not decoded", i),
        }
    }
}

/// Test that a permanently failing chunk aborts after the attempt budget
#[tokio::test(start_paused = true)]
async fn test_synthesize_withAlwaysTransient_shouldExhaustAttempts() {
    let mock = MockBackend::always_transient();
    let orchestrator = Orchestrator::new(Arc::new(mock.clone()), options(1, fast_retry(4)));

    let err = orchestrator
        .synthesize("Doomed", &requests(3))
        .await
        .unwrap_err();

    match err {
        SynthesisError::FatalChapter {
            chapter,
            chunk_index,
            attempts,
            source,
        } => {
            assert_eq!(chapter, "Doomed");
            assert_eq!(chunk_index, 0);
            assert_eq!(attempts, 4);
            assert!(matches!(source, BackendError::Transient(_)));
        }
        other => panic!("unexpected error: {}", other),
    }
    // The first chunk fails and nothing after it is started
    assert_eq!(mock.call_count(), 4);
}

/// Test that transient failures are retried with exponential backoff
#[tokio::test(start_paused = true)]
async fn test_synthesize_withFailFirst_shouldRetryWithBackoff() {
    let mock = MockBackend::fail_first(2);
    let orchestrator =
        Orchestrator::new(Arc::new(mock.clone()), options(1, RetryPolicy::default()));

    let start = tokio::time::Instant::now();
    let results = orchestrator.synthesize("Flaky", &requests(1)).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(results[0].retries, 2);
    assert_eq!(mock.call_count(), 3);
    // 1s before the first retry, 2s before the second
    assert!(elapsed >= Duration::from_secs(3), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(4), "elapsed {:?}", elapsed);
}

/// Test that concurrent workers share a single token renewal
#[tokio::test]
async fn test_synthesize_withToken_shouldRenewOnce() {
    let mock = MockBackend::working().with_token(Duration::from_secs(600));
    let orchestrator = Orchestrator::new(Arc::new(mock.clone()), options(6, fast_retry(3)));

    let results = orchestrator.synthesize("Tokens", &requests(12)).await.unwrap();

    assert_eq!(results.len(), 12);
    assert_eq!(mock.renewal_count(), 1);
    assert_eq!(mock.call_count(), 12);
}

/// Test that a token inside the safety margin is renewed before use
#[tokio::test]
async fn test_synthesize_withTokenInsideMargin_shouldRenewEachTime() {
    let mock = MockBackend::working().with_token(Duration::from_secs(5));
    let orchestrator = Orchestrator::new(
        Arc::new(mock.clone()),
        OrchestratorOptions {
            concurrency: 1,
            retry: fast_retry(3),
            token_safety_margin: Duration::from_secs(30),
            ..OrchestratorOptions::default()
        },
    );

    orchestrator.synthesize("Margin", &requests(3)).await.unwrap();

    assert_eq!(mock.renewal_count(), 3);
}

/// Test that a cancelled run does not call the backend
#[tokio::test]
async fn test_synthesize_whenCancelledUpFront_shouldReturnCancelled() {
    let mock = MockBackend::working();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let orchestrator = Orchestrator::new(Arc::new(mock.clone()), options(4, fast_retry(3)))
        .with_cancellation(cancel);

    let result = orchestrator.synthesize("Stopped", &requests(5)).await;

    assert!(matches!(result, Err(SynthesisError::Cancelled { .. })));
    assert_eq!(mock.call_count(), 0);
}

/// Test that cancellation interrupts a retry backoff
#[tokio::test(start_paused = true)]
async fn test_synthesize_whenCancelledDuringBackoff_shouldStopRetrying() {
    let mock = MockBackend::always_transient();
    let cancel = CancellationToken::new();
    let orchestrator =
        Orchestrator::new(Arc::new(mock.clone()), options(1, RetryPolicy::default()))
            .with_cancellation(cancel.clone());

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        cancel.cancel();
    });

    let result = orchestrator.synthesize("Interrupted", &requests(2)).await;
    trigger.await.unwrap();

    assert!(matches!(result, Err(SynthesisError::Cancelled { .. })));
    // Attempts at 0s and 1s; the 2s backoff is cut short
    assert_eq!(mock.call_count(), 2);
}

/// Test that a rejected request is not retried
#[tokio::test]
async fn test_synthesize_withFatalBackend_shouldNotRetry() {
    let mock = MockBackend::fatal();
    let orchestrator = Orchestrator::new(Arc::new(mock.clone()), options(1, fast_retry(5)));

    let err = orchestrator
        .synthesize("Rejected", &requests(2))
        .await
        .unwrap_err();

    assert!(matches!(err, SynthesisError::FatalBackend { chunk_index: 0, .. }));
    assert_eq!(err.chunk_index(), Some(0));
    assert_eq!(mock.call_count(), 1);
}

/// Test that undecodable fragments become empty audio instead of failing
#[tokio::test]
async fn test_synthesize_withCorruptFragments_shouldSubstituteSilence() {
    let mock = MockBackend::new(MockBehavior::CorruptFragments { every: 2 });
    let orchestrator = Orchestrator::new(Arc::new(mock), options(2, fast_retry(3)));

    let results = orchestrator.synthesize("Corrupt", &requests(4)).await.unwrap();

    let lengths: Vec<usize> = results
        .iter()
        .map(|r| match &r.audio {
            FragmentAudio::Pcm(pcm) => pcm.samples.len(),
            FragmentAudio::Encoded(_) => usize::MAX,
        })
        .collect();
    assert_eq!(lengths, vec![80, 0, 80, 0]);
}

/// Test that a token endpoint that never recovers fails the chapter with its attempt count
#[tokio::test(start_paused = true)]
async fn test_synthesize_withFailingTokenRenewal_shouldFailChapterWithAttempts() {
    let mock = MockBackend::new(MockBehavior::RenewalFailure);
    let orchestrator = Orchestrator::new(Arc::new(mock.clone()), options(1, fast_retry(3)));

    let err = orchestrator
        .synthesize("Locked out", &requests(1))
        .await
        .unwrap_err();

    match err {
        SynthesisError::FatalChapter {
            chunk_index,
            attempts,
            source,
            ..
        } => {
            assert_eq!(chunk_index, 0);
            assert_eq!(attempts, 3);
            assert!(matches!(source, BackendError::RenewalExhausted { attempts: 3, .. }));
        }
        other => panic!("expected FatalChapter, got {:?}", other),
    }
    assert_eq!(mock.renewal_count(), 3);
    assert_eq!(mock.call_count(), 0);
}
