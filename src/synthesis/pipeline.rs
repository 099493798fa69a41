/*!
 * Chapter pipeline.
 *
 * Flattens a chapter, segments it, synthesizes the chunks, assembles the
 * fragments and writes one audio file. Output is written atomically, so a
 * failed or cancelled chapter leaves no file behind.
 */

use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::orchestrator::{Orchestrator, OrchestratorOptions, ProgressCallback};
use super::pause::{PauseProtocol, PauseSpec, fold_into_chunks};
use super::segmenter::{Segmentation, Segmenter};
use crate::audio::{AudioAssembler, AudioTags, Encoder, MergeStrategy, NoopTagger, Tagger};
use crate::backends::{PauseHandling, SynthesisBackend, SynthesisRequest};
use crate::document::Chapter;
use crate::errors::SynthesisError;
use crate::file_utils::{FileManager, make_safe_filename};

/// Everything a pipeline needs besides the backend
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub language: String,
    /// Chunk size override; the backend limit still applies
    pub max_chars: Option<usize>,
    pub protocol: PauseProtocol,
    pub merge_strategy: MergeStrategy,
    /// Used when decoded chapters are encoded to a compressed container
    pub encoder: Encoder,
    pub orchestrator: OrchestratorOptions,
    pub output_dir: PathBuf,
    /// Also write the text of each chapter next to its audio
    pub output_text: bool,
}

/// Book-level metadata passed on to the tagger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookInfo {
    pub title: String,
    pub author: String,
}

/// What a finished chapter produced
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterOutput {
    pub title: String,
    pub track_index: usize,
    /// `None` when the chapter had nothing to speak
    pub audio_path: Option<PathBuf>,
    pub text_path: Option<PathBuf>,
    pub chunks: usize,
    pub retries: u32,
    pub chars: usize,
}

/// Converts chapters into audio files with one backend
pub struct ChapterPipeline {
    backend: Arc<dyn SynthesisBackend>,
    segmenter: Segmenter,
    assembler: AudioAssembler,
    settings: PipelineSettings,
    cancel: CancellationToken,
    tagger: Arc<dyn Tagger>,
}

impl ChapterPipeline {
    pub fn new(
        backend: Arc<dyn SynthesisBackend>,
        mut settings: PipelineSettings,
    ) -> Result<Self, SynthesisError> {
        let backend_limit = backend.max_chunk_chars(&settings.language);
        let max_chars = settings
            .max_chars
            .filter(|&m| m > 0)
            .map_or(backend_limit, |m| m.min(backend_limit));

        let segmenter = Segmenter::new(max_chars, &settings.language, settings.protocol.clone())?;
        let container = backend.container();
        if settings.merge_strategy == MergeStrategy::DecodeConcatEncode && !container.is_decodable() {
            return Err(SynthesisError::InvalidArgument(format!(
                "{} fragments cannot be decoded; use raw_concat or another output format",
                container
            )));
        }
        let assembler = AudioAssembler::new(settings.merge_strategy, container)
            .with_bitrate(backend.bitrate_kbps())
            .with_encoder(settings.encoder.clone());
        assembler.check_raw_concat(false)?;

        settings.orchestrator.decode_fragments =
            settings.merge_strategy == MergeStrategy::DecodeConcatEncode;

        Ok(Self {
            backend,
            segmenter,
            assembler,
            settings,
            cancel: CancellationToken::new(),
            tagger: Arc::new(NoopTagger),
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_tagger(mut self, tagger: Arc<dyn Tagger>) -> Self {
        self.tagger = tagger;
        self
    }

    pub fn segmenter(&self) -> &Segmenter {
        &self.segmenter
    }

    /// Segment a chapter without synthesizing it
    pub fn preview(&self, chapter: &Chapter) -> Segmentation {
        let text = chapter.flatten(self.segmenter.protocol());
        self.segmenter.segment(&text)
    }

    /// Output path of a chapter's audio
    pub fn audio_path(&self, chapter: &Chapter, track_index: usize) -> PathBuf {
        let extension = self.assembler.output_container().extension();
        self.settings
            .output_dir
            .join(make_safe_filename(track_index, &chapter.title, extension))
    }

    /// Turn segmentation into backend requests and the pauses left for the assembler
    fn build_requests(&self, segmentation: &Segmentation) -> (Vec<SynthesisRequest>, Vec<PauseSpec>) {
        let mut requests: Vec<SynthesisRequest> = segmentation
            .chunks
            .iter()
            .map(|c| SynthesisRequest::new(c.sequence_index, c.text.clone()).quoted(c.quoted))
            .collect();

        match self.backend.pause_handling() {
            PauseHandling::Silence => (requests, segmentation.pauses.clone()),
            PauseHandling::Inline => {
                let folded = fold_into_chunks(&segmentation.pauses, requests.len());
                for (request, (before, after)) in requests.iter_mut().zip(folded) {
                    request.pause_before_ms = before;
                    request.pause_after_ms = after;
                }
                (requests, Vec::new())
            }
            PauseHandling::Ignore => (requests, Vec::new()),
        }
    }

    /// Produce the audio file for one chapter
    ///
    /// `track_index` is the 1-based chapter number used in the file name.
    pub async fn run_chapter(
        &self,
        chapter: &Chapter,
        track_index: usize,
        book: &BookInfo,
        progress: Option<ProgressCallback>,
    ) -> Result<ChapterOutput, SynthesisError> {
        let segmentation = self.preview(chapter);
        let mut output = ChapterOutput {
            title: chapter.title.clone(),
            track_index,
            audio_path: None,
            text_path: None,
            chunks: segmentation.chunks.len(),
            retries: 0,
            chars: segmentation.total_chars(),
        };

        if segmentation.is_empty() {
            info!("Chapter '{}' has no speakable text, skipping", chapter.title);
            return Ok(output);
        }

        let (requests, pauses) = self.build_requests(&segmentation);
        self.assembler
            .check_raw_concat(pauses.iter().any(|p| p.duration_ms > 0))?;

        let mut orchestrator = Orchestrator::new(self.backend.clone(), self.settings.orchestrator.clone())
            .with_cancellation(self.cancel.clone());
        if let Some(progress) = progress {
            orchestrator = orchestrator.with_progress(progress);
        }

        let results = orchestrator.synthesize(&chapter.title, &requests).await?;
        output.retries = results.iter().map(|r| r.retries).sum();

        let assembled = self.assembler.assemble(results, &pauses).await?;
        if self.cancel.is_cancelled() {
            return Err(SynthesisError::Cancelled {
                chapter: chapter.title.clone(),
            });
        }

        let audio_path = self.audio_path(chapter, track_index);
        FileManager::write_atomic(&audio_path, &assembled.bytes).map_err(output_error)?;
        info!(
            "Wrote '{}' ({} chunks, {} retries) to {}",
            chapter.title,
            output.chunks,
            output.retries,
            audio_path.display()
        );

        if self.settings.output_text {
            let text_path = self
                .settings
                .output_dir
                .join(make_safe_filename(track_index, &chapter.title, "txt"));
            FileManager::write_to_file(&text_path, &chapter.text()).map_err(output_error)?;
            output.text_path = Some(text_path);
        }

        let tags = AudioTags {
            title: chapter.title.clone(),
            author: book.author.clone(),
            album_title: book.title.clone(),
            track_index,
        };
        if let Err(e) = self.tagger.tag(&audio_path, &tags) {
            warn!("Could not tag {}: {:#}", audio_path.display(), e);
        }

        output.audio_path = Some(audio_path);
        Ok(output)
    }
}

fn output_error(error: anyhow::Error) -> SynthesisError {
    SynthesisError::Io(std::io::Error::other(format!("{:#}", error)))
}
