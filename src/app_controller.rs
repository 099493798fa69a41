use anyhow::{Context, Result, anyhow};
use futures::stream::{self, StreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{error, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::app_config::Config;
use crate::audio::{NoopTagger, Tagger};
use crate::backends::{SynthesisBackend, create_backend};
use crate::document::{Book, Chapter, load_book};
use crate::errors::SynthesisError;
use crate::file_utils::FileManager;
use crate::synthesis::{
    BackendProfile, BookInfo, ChapterOutput, ChapterPipeline, CostEstimate, OrchestratorOptions,
    PipelineSettings, ProgressCallback,
};

// @module: Application controller for audiobook conversion

/// Switches that only exist on the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    // @field: Segment and estimate cost without calling the backend
    pub preview: bool,
    // @field: Skip the cost confirmation
    pub no_prompt: bool,
    // @field: Hide progress bars
    pub quiet: bool,
}

/// What a run produced
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Finished (or previewed) chapters in track order
    pub chapters: Vec<ChapterOutput>,
    /// `(chapter title, error)` for every chapter that failed
    pub failures: Vec<(String, String)>,
    pub cancelled: bool,
    pub estimate: Option<CostEstimate>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    fn merge(&mut self, other: RunSummary) {
        self.chapters.extend(other.chapters);
        self.failures.extend(other.failures);
        self.cancelled |= other.cancelled;
    }
}

/// Main application controller for audiobook conversion
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Backend shared by every chapter
    backend: Arc<dyn SynthesisBackend>,
    options: RunOptions,
    cancel: CancellationToken,
    tagger: Arc<dyn Tagger>,
}

impl Controller {
    // @method: Create a new controller with the backend named in the configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let backend = create_backend(&config)?;
        Ok(Self::with_backend(config, backend))
    }

    /// Create a controller around an existing backend
    pub fn with_backend(config: Config, backend: Arc<dyn SynthesisBackend>) -> Self {
        Self {
            config,
            backend,
            options: RunOptions::default(),
            cancel: CancellationToken::new(),
            tagger: Arc::new(NoopTagger),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_tagger(mut self, tagger: Arc<dyn Tagger>) -> Self {
        self.tagger = tagger;
        self
    }

    /// Convert one book file into chapter files under `output_dir`
    pub async fn run(&self, input_file: PathBuf, output_dir: PathBuf) -> Result<RunSummary> {
        if !input_file.exists() {
            return Err(anyhow!("Input file does not exist: {:?}", input_file));
        }
        let book = load_book(&input_file, self.config.segmentation.newline_mode)?;
        info!(
            "Loaded '{}' by {} ({} chapters)",
            book.title,
            book.author,
            book.chapters.len()
        );
        self.convert_book(&book, &output_dir).await
    }

    /// Run the workflow in folder mode, one output directory per book
    pub async fn run_folder(&self, input_dir: PathBuf) -> Result<RunSummary> {
        if !input_dir.exists() {
            return Err(anyhow!("Input directory does not exist: {:?}", input_dir));
        }

        let books = FileManager::find_book_files(&input_dir)?;
        if books.is_empty() {
            warn!("No book files found in {:?}", input_dir);
            return Ok(RunSummary::default());
        }
        info!("Found {} book(s) in {:?}", books.len(), input_dir);

        let mut summary = RunSummary::default();
        for book_file in books {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let output_dir = FileManager::output_dir_for(&book_file);

            match self.run(book_file.clone(), output_dir).await {
                Ok(book_summary) => summary.merge(book_summary),
                Err(e) => {
                    error!("Error processing {:?}: {:#}", book_file, e);
                    summary
                        .failures
                        .push((book_file.display().to_string(), format!("{:#}", e)));
                }
            }
        }
        Ok(summary)
    }

    /// Convert the selected chapters of a book
    pub async fn convert_book(&self, book: &Book, output_dir: &Path) -> Result<RunSummary> {
        let start_time = Instant::now();
        let selected = self.select_chapters(book)?;
        if selected.is_empty() {
            warn!("No chapters with text in '{}'", book.title);
            return Ok(RunSummary::default());
        }

        let pipeline = self.build_pipeline(output_dir)?;
        let total_chars = selected.iter().map(|(_, c)| c.char_count()).sum();
        let estimate = CostEstimate::new(total_chars, self.backend.price_per_thousand_chars());
        info!("{}", estimate.describe());

        if self.options.preview {
            return Ok(self.preview(&pipeline, &selected, estimate));
        }
        if !self.confirm(&estimate)? {
            warn!("Conversion declined");
            return Ok(RunSummary {
                estimate: Some(estimate),
                ..RunSummary::default()
            });
        }

        FileManager::ensure_dir(output_dir)?;
        let multi_progress = if self.options.quiet {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        let book_info = BookInfo {
            title: book.title.clone(),
            author: book.author.clone(),
        };
        let parallel = self.config.output.parallel_chapters.max(1);

        let mut outcomes: Vec<(usize, String, Result<ChapterOutput, SynthesisError>)> =
            stream::iter(selected)
                .map(|(track, chapter)| {
                    let pipeline = &pipeline;
                    let multi_progress = &multi_progress;
                    let book_info = &book_info;
                    async move {
                        let bar = self.chapter_bar(multi_progress, track, chapter);
                        let pb = bar.clone();
                        let progress: ProgressCallback = Arc::new(move |done, total| {
                            pb.set_length(total as u64);
                            pb.set_position(done as u64);
                        });
                        let result = pipeline
                            .run_chapter(chapter, track, book_info, Some(progress))
                            .await;
                        bar.finish_and_clear();
                        (track, chapter.title.clone(), result)
                    }
                })
                .buffer_unordered(parallel)
                .collect()
                .await;
        outcomes.sort_by_key(|(track, _, _)| *track);

        let mut summary = RunSummary {
            estimate: Some(estimate),
            ..RunSummary::default()
        };
        for (track, title, result) in outcomes {
            match result {
                Ok(output) => summary.chapters.push(output),
                Err(SynthesisError::Cancelled { .. }) => summary.cancelled = true,
                Err(e) => {
                    error!("Chapter {} '{}' failed: {}", track, title, e);
                    summary.failures.push((title, e.to_string()));
                }
            }
        }

        info!(
            "Converted {} of {} chapter(s) in {}",
            summary.chapters.len(),
            summary.chapters.len() + summary.failures.len(),
            Self::format_duration(start_time.elapsed())
        );
        Ok(summary)
    }

    /// Chapters in the configured range that have text, with their 1-based numbers
    pub fn select_chapters<'a>(
        &self,
        book: &'a Book,
    ) -> Result<Vec<(usize, &'a Chapter)>, SynthesisError> {
        let count = book.chapters.len();
        if count == 0 {
            return Ok(Vec::new());
        }

        let start = self.config.output.chapter_start;
        let end = match self.config.output.chapter_end {
            -1 => count,
            e if e < 1 => {
                return Err(SynthesisError::InvalidArgument(format!(
                    "chapter_end must be -1 or a chapter number, got {}",
                    e
                )));
            }
            e => e as usize,
        };
        if start == 0 || start > count || end < start || end > count {
            return Err(SynthesisError::InvalidArgument(format!(
                "Chapter range {}..={} does not fit a book with {} chapters",
                start, end, count
            )));
        }

        Ok(book
            .chapters
            .iter()
            .enumerate()
            .skip(start - 1)
            .take(end - start + 1)
            .filter(|(_, chapter)| !chapter.is_empty())
            .map(|(i, chapter)| (i + 1, chapter))
            .collect())
    }

    fn build_pipeline(&self, output_dir: &Path) -> Result<ChapterPipeline> {
        let provider = self.config.tts.get_active_provider_config();
        let profile = BackendProfile::for_provider(self.config.tts.provider);
        let concurrency =
            profile.effective_concurrent_requests(provider.map(|p| p.concurrent_requests));

        let parallel = self.config.output.parallel_chapters;
        if parallel > profile.recommended_parallel_chapters {
            warn!(
                "{} parallel chapters exceeds the {} recommended for {}",
                parallel,
                profile.recommended_parallel_chapters,
                self.config.tts.provider.display_name()
            );
        }

        let max_chars = self.config.segmentation.max_chars.or_else(|| {
            provider
                .map(|p| p.max_chars_per_request)
                .filter(|&m| m > 0)
        });
        let protocol = self.config.pauses.protocol(self.backend.break_marker())?;

        let settings = PipelineSettings {
            language: self.config.language.clone(),
            max_chars,
            protocol,
            merge_strategy: self.config.audio.merge_strategy,
            encoder: self.config.audio.encoder(),
            orchestrator: OrchestratorOptions {
                concurrency,
                retry: self.config.retry.policy(),
                token_safety_margin: self.config.retry.token_safety_margin(),
                decode_fragments: true,
            },
            output_dir: output_dir.to_path_buf(),
            output_text: self.config.output.output_text,
        };

        let pipeline = ChapterPipeline::new(self.backend.clone(), settings)
            .context("Failed to set up the chapter pipeline")?
            .with_cancellation(self.cancel.clone())
            .with_tagger(self.tagger.clone());
        Ok(pipeline)
    }

    fn preview(
        &self,
        pipeline: &ChapterPipeline,
        selected: &[(usize, &Chapter)],
        estimate: CostEstimate,
    ) -> RunSummary {
        let chapters: Vec<ChapterOutput> = selected
            .iter()
            .map(|(track, chapter)| {
                let segmentation = pipeline.preview(chapter);
                info!(
                    "Chapter {} '{}': {} characters in {} chunks, {} pauses",
                    track,
                    chapter.title,
                    segmentation.total_chars(),
                    segmentation.chunks.len(),
                    segmentation.pauses.len()
                );
                ChapterOutput {
                    title: chapter.title.clone(),
                    track_index: *track,
                    audio_path: None,
                    text_path: None,
                    chunks: segmentation.chunks.len(),
                    retries: 0,
                    chars: segmentation.total_chars(),
                }
            })
            .collect();

        RunSummary {
            chapters,
            estimate: Some(estimate),
            ..RunSummary::default()
        }
    }

    /// Ask before spending money; free backends never ask
    fn confirm(&self, estimate: &CostEstimate) -> Result<bool> {
        if self.options.no_prompt || estimate.cost().is_none() {
            return Ok(true);
        }

        print!("{}. Continue? [y/N] ", estimate.describe());
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin()
            .read_line(&mut answer)
            .context("Failed to read confirmation")?;
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }

    fn chapter_bar(&self, multi_progress: &MultiProgress, track: usize, chapter: &Chapter) -> ProgressBar {
        let bar = multi_progress.add(ProgressBar::new(0));
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style.progress_chars("=> "));
        bar.set_message(format!("{:04} {}", track, chapter.title));
        bar
    }

    fn format_duration(duration: std::time::Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
