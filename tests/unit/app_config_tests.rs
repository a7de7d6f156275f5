/*!
 * Tests for application configuration functionality
 */

use std::time::Duration;

use kobo_anki::app_config::{Config, LogLevel};
use kobo_anki::pipeline::PipelineOptions;
use crate::common;

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.source_language, None);
    assert_eq!(config.target_language, "EN-US");
    assert_eq!(config.translation.timeout_secs, 30);
    assert_eq!(config.speech.model, "tts-1");
    assert_eq!(config.speech.voice, "nova");
    assert_eq!(config.pipeline.concurrent_requests, 2);
    assert_eq!(config.pipeline.channel_capacity, 64);
    assert_eq!(config.pipeline.poll_interval(), Duration::from_millis(100));
    assert_eq!(config.log_level, LogLevel::Info);
}

/// Test that pipeline settings become run options
#[test]
fn test_pipeline_settings_toOptions_shouldCarryEveryValue() {
    let mut config = Config::default();
    config.pipeline.concurrent_requests = 4;
    config.pipeline.abort_grace_ms = 250;

    let options = config.pipeline.to_options(false);
    assert_eq!(
        options,
        PipelineOptions::default()
            .with_concurrency(4)
            .with_audio(false)
            .with_abort_grace(Duration::from_millis(250))
    );
}

/// Test configuration validation
#[test]
fn test_config_validation_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = Config::default();
    config.translation.api_key = "deepl:fx".to_string();
    config.speech.api_key = "sk-test".to_string();
    assert!(config.validate().is_ok());

    config.pipeline.concurrent_requests = 0;
    assert!(config.validate().is_err());
    config.pipeline.concurrent_requests = 2;

    config.pipeline.channel_capacity = 0;
    assert!(config.validate().is_err());
    config.pipeline.channel_capacity = 8;

    config.target_language = " ".to_string();
    assert!(config.validate().is_err());
}

/// Test that a missing configuration file is created with defaults
#[test]
fn test_load_or_create_withMissingFile_shouldWriteDefaults() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");

    let config = Config::load_or_create(&path).unwrap();
    assert!(path.exists());
    assert_eq!(config.target_language, "EN-US");

    let reloaded = Config::load_or_create(&path).unwrap();
    assert_eq!(reloaded.pipeline.concurrent_requests, config.pipeline.concurrent_requests);
}

/// Test that a malformed configuration file is reported instead of replaced
#[test]
fn test_load_or_create_withInvalidJson_shouldFail() {
    let dir = common::create_temp_dir().unwrap();
    let path = common::create_test_file(dir.path(), "conf.json", "{ not json").unwrap();

    let err = Config::load_or_create(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config file"));
}

/// Test the Anki import section: on by default, filled in when absent from the file
#[test]
fn test_anki_config_withPartialFile_shouldDefaultToLocalAddOn() {
    let dir = common::create_temp_dir().unwrap();
    let path = common::create_test_file(dir.path(), "conf.json", r#"{ "anki": { "enabled": false } }"#).unwrap();

    let config = Config::load_or_create(&path).unwrap();
    assert!(!config.anki.enabled);
    assert_eq!(config.anki.endpoint, "http://localhost:8765");
    assert_eq!(config.anki.timeout_secs, 10);
    assert!(Config::default().anki.enabled);

    let mut config = Config::default();
    config.translation.api_key = "key:fx".to_string();
    config.speech.enabled = false;
    config.anki.endpoint = "localhost without scheme".to_string();
    assert!(config.validate().is_err());
    config.anki.enabled = false;
    assert!(config.validate().is_ok());
}

/// Test that explicit output directories win over the data directory
#[test]
fn test_output_dirs_withOverrides_shouldUseThem() {
    let mut config = Config::default();
    config.output.deck_dir = Some("/tmp/decks".into());
    config.output.media_dir = Some("/tmp/media".into());

    assert_eq!(config.output.get_deck_dir().unwrap(), std::path::PathBuf::from("/tmp/decks"));
    assert_eq!(config.output.get_media_dir().unwrap(), std::path::PathBuf::from("/tmp/media"));
}
