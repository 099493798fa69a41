/*!
 * Tests for configuration loading and validation
 */

use crate::common::{create_temp_dir, create_test_file, mock_config};
use voxbook::app_config::{Config, TtsProvider};
use voxbook::audio::MergeStrategy;

/// Test that a missing config file is created with defaults
#[test]
fn test_loadOrCreate_withMissingFile_shouldWriteDefaults() {
    let temp_dir = create_temp_dir().unwrap();
    let path = temp_dir.path().join("conf.json");

    let config = Config::load_or_create(&path).unwrap();

    assert!(path.exists());
    assert_eq!(config.language, "en-US");
    assert_eq!(config.tts.provider, TtsProvider::Azure);

    let reloaded = Config::load_or_create(&path).unwrap();
    assert_eq!(reloaded.tts.available_providers.len(), 6);
}

/// Test that values from an existing file are honoured
#[test]
fn test_loadOrCreate_withExistingFile_shouldReadValues() {
    let temp_dir = create_temp_dir().unwrap();
    let json = r#"{
        "language": "zh-CN",
        "tts": {"provider": "mock"},
        "segmentation": {"max_chars": 300},
        "audio": {"merge_strategy": "raw_concat"},
        "output": {"chapter_start": 2, "chapter_end": 4, "parallel_chapters": 3}
    }"#;
    let path = create_test_file(temp_dir.path(), "conf.json", json).unwrap();

    let config = Config::load_or_create(&path).unwrap();

    assert_eq!(config.language, "zh-CN");
    assert_eq!(config.tts.provider, TtsProvider::Mock);
    assert_eq!(config.segmentation.max_chars, Some(300));
    assert_eq!(config.audio.merge_strategy, MergeStrategy::RawConcat);
    assert_eq!(config.output.chapter_start, 2);
    assert_eq!(config.output.chapter_end, 4);
    assert_eq!(config.output.parallel_chapters, 3);
    assert!(config.validate().is_ok());
}

/// Test that an unparsable file is an error rather than a silent reset
#[test]
fn test_loadOrCreate_withInvalidJson_shouldFail() {
    let temp_dir = create_temp_dir().unwrap();
    let path = create_test_file(temp_dir.path(), "conf.json", "not json").unwrap();

    let err = Config::load_or_create(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

/// Test the validation rules on numeric settings
#[test]
fn test_validate_withOutOfRangeValues_shouldFail() {
    let mut config = mock_config();
    config.retry.max_attempts = 0;
    assert!(config.validate().is_err());

    let mut config = mock_config();
    config.output.parallel_chapters = 0;
    assert!(config.validate().is_err());

    let mut config = mock_config();
    config.output.chapter_start = 0;
    assert!(config.validate().is_err());
}

/// Test that an open-ended chapter range is valid
#[test]
fn test_validate_withOpenEndedRange_shouldPass() {
    let mut config = mock_config();
    config.output.chapter_start = 7;
    config.output.chapter_end = -1;
    assert!(config.validate().is_ok());
}

/// Test that a blank configured break marker is rejected
#[test]
fn test_validate_withBlankBreakMarker_shouldFail() {
    let mut config = mock_config();
    config.pauses.break_marker = Some("   ".to_string());
    assert!(config.validate().is_err());
}

/// Test that the piper provider validates without credentials
#[test]
fn test_validate_withPiper_shouldNotNeedCredentials() {
    let mut config = mock_config();
    config.tts.provider = TtsProvider::Piper;
    assert!(config.validate().is_ok());
    assert_eq!(config.tts.active_provider().concurrent_requests, 1);
}

/// Test that Edge prosody and Piper voice tuning are read from the provider list
#[test]
fn test_loadOrCreate_withVoiceTuning_shouldReadProviderFields() {
    let temp_dir = create_temp_dir().unwrap();
    let json = r#"{
        "language": "en-US",
        "tts": {
            "provider": "edge",
            "available_providers": [
                {"type": "edge", "voice": "en-GB-SoniaNeural", "voice_rate": "-10%", "proxy": "http://proxy:3128"},
                {"type": "piper", "model": "voice.onnx", "length_scale": 1.2, "sentence_silence": 0.3}
            ]
        },
        "audio": {"ffmpeg_path": "/usr/local/bin/ffmpeg"}
    }"#;
    let path = create_test_file(temp_dir.path(), "conf.json", json).unwrap();

    let config = Config::load_or_create(&path).unwrap();

    let edge = config.tts.active_provider();
    assert_eq!(edge.voice, "en-GB-SoniaNeural");
    assert_eq!(edge.voice_rate, "-10%");
    assert_eq!(edge.voice_volume, "+0%");
    assert_eq!(edge.quote_pitch, "+30Hz");
    assert_eq!(edge.proxy, "http://proxy:3128");

    let piper = config.tts.get_provider_config(&TtsProvider::Piper).unwrap();
    assert_eq!(piper.length_scale, Some(1.2));
    assert_eq!(piper.sentence_silence, Some(0.3));

    assert_eq!(config.audio.encoder().program, "/usr/local/bin/ffmpeg");
    assert!(config.validate().is_ok());
}
