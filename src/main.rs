// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use voxbook::app_config::{self, Config, TtsProvider};
use voxbook::app_controller::{Controller, RunOptions, RunSummary};
use voxbook::audio::MergeStrategy;
use voxbook::errors::AppError;
use voxbook::file_utils::FileManager;

/// CLI Wrapper for TtsProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTtsProvider {
    Azure,
    #[value(name = "openai")]
    OpenAI,
    #[value(name = "openai_compatible")]
    OpenAICompatible,
    Edge,
    Piper,
    Mock,
}

impl From<CliTtsProvider> for TtsProvider {
    fn from(cli_provider: CliTtsProvider) -> Self {
        match cli_provider {
            CliTtsProvider::Azure => TtsProvider::Azure,
            CliTtsProvider::OpenAI => TtsProvider::OpenAI,
            CliTtsProvider::OpenAICompatible => TtsProvider::OpenAICompatible,
            CliTtsProvider::Edge => TtsProvider::Edge,
            CliTtsProvider::Piper => TtsProvider::Piper,
            CliTtsProvider::Mock => TtsProvider::Mock,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// CLI Wrapper for MergeStrategy to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliMergeStrategy {
    #[value(name = "decode")]
    DecodeConcatEncode,
    #[value(name = "raw")]
    RawConcat,
}

impl From<CliMergeStrategy> for MergeStrategy {
    fn from(cli_strategy: CliMergeStrategy) -> Self {
        match cli_strategy {
            CliMergeStrategy::DecodeConcatEncode => MergeStrategy::DecodeConcatEncode,
            CliMergeStrategy::RawConcat => MergeStrategy::RawConcat,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a book into chapter audio files (default command)
    Convert(ConvertArgs),

    /// Generate shell completions for voxbook
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone)]
struct ConvertArgs {
    /// Input book file (.json or .txt) or directory of books
    #[arg(value_name = "INPUT_PATH")]
    input_path: Option<PathBuf>,

    /// Output directory, defaults to <book>_audio next to the input
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// TTS provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTtsProvider>,

    /// Language hint of the book (e.g. 'en-US', 'zh-CN')
    #[arg(long)]
    language: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Maximum characters per chunk (capped by the backend limit)
    #[arg(long)]
    max_chars: Option<usize>,

    /// How fragments are merged
    #[arg(long, value_enum)]
    merge_strategy: Option<CliMergeStrategy>,

    /// First chapter to convert (1-based)
    #[arg(long)]
    chapter_start: Option<usize>,

    /// Last chapter to convert, -1 for the last one
    #[arg(long, allow_hyphen_values = true)]
    chapter_end: Option<i64>,

    /// Chapters converted at the same time
    #[arg(long)]
    parallel_chapters: Option<usize>,

    /// Also write each chapter's text next to its audio
    #[arg(long)]
    output_text: bool,

    /// Segment and estimate cost without synthesizing
    #[arg(long)]
    preview: bool,

    /// Do not ask for confirmation before a paid conversion
    #[arg(short = 'y', long)]
    no_prompt: bool,
}

/// voxbook - audiobooks from structured text
///
/// Splits every chapter of a book into backend-sized chunks, synthesizes them
/// concurrently and writes one audio file per chapter.
#[derive(Parser, Debug)]
#[command(name = "voxbook")]
#[command(version)]
#[command(about = "Text-to-speech audiobook converter")]
#[command(args_conflicts_with_subcommands = true)]
#[command(long_about = "voxbook converts books into one audio file per chapter using TTS backends.

EXAMPLES:
    voxbook book.json                            # Convert using default config
    voxbook -p openai book.txt                   # Use a specific provider
    voxbook --preview book.json                  # Show chunks and cost only
    voxbook --chapter-start 3 --chapter-end 5 book.json
    voxbook --parallel-chapters 2 -y /books/     # Convert every book in a directory
    voxbook completions bash > voxbook.bash      # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. If the config file doesn't
    exist, a default one will be created automatically.

SUPPORTED PROVIDERS:
    azure             - Azure Speech (MS_TTS_KEY, MS_TTS_REGION)
    openai            - OpenAI speech API (OPENAI_API_KEY)
    openai_compatible - OpenAI-compatible server (OPENAI_BASE_URL)
    edge              - Edge voices through the edge-tts client (pip install edge-tts)
    piper             - Local piper executable
    mock              - Offline test tones")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    convert: ConvertArgs,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI colour and tag for log level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("\x1B[1;31m", "ERROR"),
            Level::Warn => ("\x1B[1;33m", "WARN "),
            Level::Info => ("\x1B[1;32m", "INFO "),
            Level::Debug => ("\x1B[1;36m", "DEBUG"),
            Level::Trace => ("\x1B[1;35m", "TRACE"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (colour, tag) = Self::style_for_level(record.level());
            let _ = writeln!(
                std::io::stderr(),
                "{}{} {} {}\x1B[0m",
                colour,
                now,
                tag,
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn level_filter(level: &app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The level is lowered or raised once the config is loaded
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "voxbook", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Convert(args)) => run_convert(args).await,
        None => run_convert(cli.convert).await,
    }
}

/// Load the config file and apply command line overrides
fn load_config(options: &ConvertArgs) -> Result<Config> {
    let config_path = Path::new(&options.config_path);
    if !config_path.exists() {
        warn!(
            "Config file not found at '{}', creating default config.",
            options.config_path
        );
    }
    let mut config = Config::load_or_create(config_path)?;

    if let Some(provider) = &options.provider {
        config.tts.provider = provider.clone().into();
    }
    if let Some(language) = &options.language {
        config.language = language.clone();
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }
    if let Some(max_chars) = options.max_chars {
        config.segmentation.max_chars = Some(max_chars);
    }
    if let Some(strategy) = &options.merge_strategy {
        config.audio.merge_strategy = strategy.clone().into();
    }
    if let Some(start) = options.chapter_start {
        config.output.chapter_start = start;
    }
    if let Some(end) = options.chapter_end {
        config.output.chapter_end = end;
    }
    if let Some(parallel) = options.parallel_chapters {
        config.output.parallel_chapters = parallel;
    }
    if options.output_text {
        config.output.output_text = true;
    }

    config
        .validate()
        .map_err(|e| AppError::Config(format!("{:#}", e)))?;
    Ok(config)
}

async fn run_convert(options: ConvertArgs) -> Result<()> {
    let input_path = options
        .input_path
        .clone()
        .ok_or_else(|| anyhow!("INPUT_PATH is required when no subcommand is specified"))?;

    if let Some(level) = &options.log_level {
        log::set_max_level(level_filter(&level.clone().into()));
    }
    let config = load_config(&options)?;
    log::set_max_level(level_filter(&config.log_level));

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, unfinished chapters will not be written");
            signal_cancel.cancel();
        }
    });

    let controller = Controller::with_config(config)?
        .with_cancellation(cancel)
        .with_options(RunOptions {
            preview: options.preview,
            no_prompt: options.no_prompt,
            quiet: false,
        });

    let summary = if input_path.is_file() {
        let output_dir = options
            .output_dir
            .clone()
            .unwrap_or_else(|| FileManager::output_dir_for(&input_path));
        controller.run(input_path, output_dir).await?
    } else if input_path.is_dir() {
        controller.run_folder(input_path).await?
    } else {
        return Err(AppError::File(format!("Input path does not exist: {:?}", input_path)).into());
    };

    report(&summary)
}

fn report(summary: &RunSummary) -> Result<()> {
    for chapter in &summary.chapters {
        match &chapter.audio_path {
            Some(path) => info!("Chapter {}: {}", chapter.track_index, path.display()),
            None => info!(
                "Chapter {} '{}': {} chunks, {} characters",
                chapter.track_index, chapter.title, chapter.chunks, chapter.chars
            ),
        }
    }
    if let Some(estimate) = &summary.estimate {
        info!("{}", estimate.describe());
    }

    if summary.cancelled {
        return Err(anyhow!("Conversion cancelled"));
    }
    if !summary.failures.is_empty() {
        for (title, message) in &summary.failures {
            error!("{}: {}", title, message);
        }
        return Err(anyhow!("{} chapter(s) failed", summary.failures.len()));
    }
    Ok(())
}
