/*!
 * Speech synthesis core.
 *
 * - `pause`: the in-band pause marker protocol
 * - `segmenter`: language-aware chunking under a size limit
 * - `retry`: exponential backoff around backend calls
 * - `orchestrator`: concurrent chunk synthesis with shared token renewal
 * - `pipeline`: one chapter from document tree to audio file
 */

pub mod concurrency;
pub mod cost;
pub mod orchestrator;
pub mod pause;
pub mod pipeline;
pub mod retry;
pub mod segmenter;

pub use concurrency::BackendProfile;
pub use cost::{CostEstimate, estimate_cost};
pub use orchestrator::{Orchestrator, OrchestratorOptions, ProgressCallback};
pub use pause::{PauseKind, PauseProtocol, PauseSpec};
pub use pipeline::{BookInfo, ChapterOutput, ChapterPipeline, PipelineSettings};
pub use retry::{RetryError, RetryOutcome, RetryPolicy, with_backoff};
pub use segmenter::{Chunk, Segmentation, Segmenter, segment};
