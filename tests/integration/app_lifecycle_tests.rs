/*!
 * End-to-end tests for book conversion through the controller
 */

use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::common::{
    create_temp_dir, create_test_file, fragment_levels, init_logging, mock_config, read_samples,
    sample_book,
};
use voxbook::app_config::Config;
use voxbook::app_controller::{Controller, RunOptions};
use voxbook::backends::mock::{MockBackend, MockBehavior};

fn quiet() -> RunOptions {
    RunOptions {
        preview: false,
        no_prompt: true,
        quiet: true,
    }
}

/// Mock config whose retries finish quickly in real time
fn fast_config() -> Config {
    let mut config = mock_config();
    config.retry.max_attempts = 3;
    config.retry.backoff_base_ms = 1;
    config.retry.max_backoff_ms = 5;
    config
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

/// Test converting a whole book into one file per chapter
#[tokio::test]
async fn test_convertBook_shouldWriteOneFilePerChapter() {
    init_logging();
    let temp_dir = create_temp_dir().unwrap();
    let mock = MockBackend::working();
    let controller =
        Controller::with_backend(fast_config(), Arc::new(mock.clone())).with_options(quiet());

    let summary = controller
        .convert_book(&sample_book(), temp_dir.path())
        .await
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(
        file_names(temp_dir.path()),
        vec!["0001_Opening.wav", "0002_Middle.wav", "0003_Ending.wav"]
    );
    let tracks: Vec<_> = summary.chapters.iter().map(|c| c.track_index).collect();
    assert_eq!(tracks, vec![1, 2, 3]);
    assert_eq!(mock.call_count(), 6);

    let estimate = summary.estimate.unwrap();
    assert_eq!(estimate.total_chars, 6 * "Sentence number 1.".len());
    assert!(estimate.cost().is_none());

    let middle = read_samples(&temp_dir.path().join("0002_Middle.wav")).unwrap();
    assert_eq!(fragment_levels(&middle), vec![1, 2, 3]);
}

/// Test that parallel chapters still produce results in track order
#[tokio::test]
async fn test_convertBook_withParallelChapters_shouldKeepTrackOrder() {
    let temp_dir = create_temp_dir().unwrap();
    let mut config = fast_config();
    config.output.parallel_chapters = 3;
    let backend = MockBackend::new(MockBehavior::RandomLatency { max_ms: 10 });
    let controller = Controller::with_backend(config, Arc::new(backend)).with_options(quiet());

    let summary = controller
        .convert_book(&sample_book(), temp_dir.path())
        .await
        .unwrap();

    let titles: Vec<_> = summary.chapters.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["Opening", "Middle", "Ending"]);
    assert_eq!(file_names(temp_dir.path()).len(), 3);
}

/// Test that only the configured chapter range is converted
#[tokio::test]
async fn test_convertBook_withChapterRange_shouldConvertSubset() {
    let temp_dir = create_temp_dir().unwrap();
    let mut config = fast_config();
    config.output.chapter_start = 2;
    config.output.chapter_end = 2;
    let controller =
        Controller::with_backend(config, Arc::new(MockBackend::working())).with_options(quiet());

    let summary = controller
        .convert_book(&sample_book(), temp_dir.path())
        .await
        .unwrap();

    assert_eq!(summary.chapters.len(), 1);
    assert_eq!(file_names(temp_dir.path()), vec!["0002_Middle.wav"]);
}

/// Test that preview segments and estimates without writing anything
#[tokio::test]
async fn test_convertBook_withPreview_shouldNotSynthesize() {
    let temp_dir = create_temp_dir().unwrap();
    let output_dir = temp_dir.path().join("out");
    let mock = MockBackend::working().with_price(15.0);
    let controller = Controller::with_backend(fast_config(), Arc::new(mock.clone())).with_options(
        RunOptions {
            preview: true,
            no_prompt: false,
            quiet: true,
        },
    );

    let summary = controller
        .convert_book(&sample_book(), &output_dir)
        .await
        .unwrap();

    let chunks: Vec<_> = summary.chapters.iter().map(|c| c.chunks).collect();
    assert_eq!(chunks, vec![2, 3, 1]);
    assert!(summary.chapters.iter().all(|c| c.audio_path.is_none()));
    assert_eq!(summary.estimate.unwrap().cost(), Some(15.0));
    assert_eq!(mock.call_count(), 0);
    assert!(!output_dir.exists());
}

/// Test that failing chapters are reported without aborting the run
#[tokio::test]
async fn test_convertBook_withFatalBackend_shouldRecordFailures() {
    let temp_dir = create_temp_dir().unwrap();
    let controller =
        Controller::with_backend(fast_config(), Arc::new(MockBackend::fatal())).with_options(quiet());

    let summary = controller
        .convert_book(&sample_book(), temp_dir.path())
        .await
        .unwrap();

    assert!(!summary.is_success());
    assert!(!summary.cancelled);
    assert_eq!(summary.failures.len(), 3);
    assert_eq!(summary.failures[0].0, "Opening");
    assert!(file_names(temp_dir.path()).is_empty());
}

/// Test that a cancelled run is flagged and writes nothing
#[tokio::test]
async fn test_convertBook_whenCancelled_shouldReportCancellation() {
    let temp_dir = create_temp_dir().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let controller = Controller::with_backend(fast_config(), Arc::new(MockBackend::working()))
        .with_options(quiet())
        .with_cancellation(cancel);

    let summary = controller
        .convert_book(&sample_book(), temp_dir.path())
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert!(summary.failures.is_empty());
    assert!(file_names(temp_dir.path()).is_empty());
}

/// Test converting a plain-text book file with text output enabled
#[tokio::test]
async fn test_run_withTextFile_shouldConvertEveryHeading() {
    let temp_dir = create_temp_dir().unwrap();
    let content = "Title: Short Stories\nAuthor: A. Writer\n\n\
        # The Well\nThe well was deep.\n\nNobody looked down.\n\n\
        # The Hill\nThe hill was steep.\n";
    let input = create_test_file(temp_dir.path(), "stories.txt", content).unwrap();
    let output_dir = temp_dir.path().join("audio");

    let mut config = fast_config();
    config.output.output_text = true;
    let controller = Controller::with_config(config).unwrap().with_options(quiet());

    let summary = controller.run(input, output_dir.clone()).await.unwrap();

    assert!(summary.is_success());
    assert_eq!(
        file_names(&output_dir),
        vec![
            "0001_The_Well.txt",
            "0001_The_Well.wav",
            "0002_The_Hill.txt",
            "0002_The_Hill.wav"
        ]
    );
    let text = std::fs::read_to_string(output_dir.join("0002_The_Hill.txt")).unwrap();
    assert_eq!(text, "The hill was steep.");
}

/// Test that a missing input file is an error
#[tokio::test]
async fn test_run_withMissingFile_shouldFail() {
    let temp_dir = create_temp_dir().unwrap();
    let controller = Controller::with_backend(fast_config(), Arc::new(MockBackend::working()))
        .with_options(quiet());

    let result = controller
        .run(temp_dir.path().join("missing.txt"), temp_dir.path().join("out"))
        .await;

    assert!(result.is_err());
}

/// Test folder mode writes one output directory per book
#[tokio::test]
async fn test_runFolder_shouldConvertEachBook() {
    let temp_dir = create_temp_dir().unwrap();
    create_test_file(temp_dir.path(), "alpha.txt", "# One\nFirst book.\n").unwrap();
    let json = r#"{"title":"Beta","chapters":[{"title":"Only","children":[{"type":"text","content":"Second book."}]}]}"#;
    create_test_file(temp_dir.path(), "beta.json", json).unwrap();
    create_test_file(temp_dir.path(), "cover.png", "not a book").unwrap();

    let controller = Controller::with_backend(fast_config(), Arc::new(MockBackend::working()))
        .with_options(quiet());

    let summary = controller
        .run_folder(temp_dir.path().to_path_buf())
        .await
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.chapters.len(), 2);
    assert_eq!(
        file_names(&temp_dir.path().join("alpha_audio")),
        vec!["0001_One.wav"]
    );
    assert_eq!(
        file_names(&temp_dir.path().join("beta_audio")),
        vec!["0001_Only.wav"]
    );
}

/// Test that an empty folder is not an error
#[test]
fn test_runFolder_withNoBooks_shouldReturnEmptySummary() {
    init_logging();
    let temp_dir = create_temp_dir().unwrap();
    let controller = Controller::with_backend(fast_config(), Arc::new(MockBackend::working()))
        .with_options(quiet());

    let summary = tokio_test::block_on(async {
        controller
            .run_folder(temp_dir.path().to_path_buf())
            .await
            .unwrap()
    });

    assert!(summary.is_success());
    assert!(summary.chapters.is_empty());
}
