mod common;
use crate::common::init_tracing;

use std::io::Write;

use noteflow::config::{load_and_validate, load_from_path, ConfigFile, RawConfigFile};
use noteflow::errors::NoteflowError;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn validate(contents: &str) -> Result<ConfigFile, NoteflowError> {
    let file = write_config(contents);
    load_and_validate(file.path())
}

#[test]
fn test_empty_file_yields_defaults() {
    init_tracing();

    let config = validate("").unwrap();
    assert!(config.watch.enabled);
    assert_eq!(config.watch.path, ".");
    assert_eq!(config.watch.patterns, vec!["**/*.md".to_string()]);
    assert!(config.watch.ignore.is_empty());
    assert_eq!(config.watch.debounce_seconds, 2.0);
    assert_eq!(config.watch.extensions, vec!["md".to_string()]);
    assert_eq!(config.budget.daily_limit, 10.0);
    assert_eq!(config.budget.alert_at_percent, 50.0);
    assert_eq!(config.budget.shutdown_at_percent, 80.0);
    assert!(config.resource.is_empty());
    assert!(config.job.is_empty());
}

#[test]
fn test_full_config_parses() {
    init_tracing();

    let config = validate(
        r#"
[watch]
path = "vault"
patterns = ["**/*.md", "inbox/**"]
ignore = [".obsidian/**"]
debounce_seconds = 0.5
extensions = ["md", "markdown"]

[budget]
daily_limit = 25.0
alert_at_percent = 40.0
shutdown_at_percent = 90.0

[resource.tagger]
max_requests_per_hour = 30
max_requests_per_day = 200
circuit_open_seconds = 120

[job.nightly-reindex]
schedule = "0 0 3 * * * *"

[job.digest]
schedule = "every 30m"
enabled = false
"#,
    )
    .unwrap();

    assert_eq!(config.watch.path, "vault");
    assert_eq!(config.watch.patterns.len(), 2);
    assert_eq!(config.budget.daily_limit, 25.0);
    assert_eq!(config.resource["tagger"].max_requests_per_hour, 30);
    assert!(config.job["nightly-reindex"].enabled);
    assert!(!config.job["digest"].enabled);
}

#[test]
fn test_zero_debounce_rejected() {
    init_tracing();

    let err = validate("[watch]\ndebounce_seconds = 0.0\n").unwrap_err();
    assert!(matches!(err, NoteflowError::ConfigError(msg) if msg.contains("debounce_seconds")));
}

#[test]
fn test_invalid_glob_rejected() {
    init_tracing();

    let err = validate("[watch]\npatterns = [\"[unclosed\"]\n").unwrap_err();
    assert!(matches!(err, NoteflowError::ConfigError(msg) if msg.contains("glob")));
}

#[test]
fn test_empty_patterns_rejected_when_watching() {
    init_tracing();

    let err = validate("[watch]\npatterns = []\n").unwrap_err();
    assert!(matches!(err, NoteflowError::ConfigError(_)));

    // But fine when watching is disabled.
    validate("[watch]\nenabled = false\npatterns = []\n").unwrap();
}

#[test]
fn test_alert_must_be_below_shutdown() {
    init_tracing();

    let err = validate(
        "[budget]\nalert_at_percent = 90.0\nshutdown_at_percent = 80.0\n",
    )
    .unwrap_err();
    assert!(matches!(err, NoteflowError::ConfigError(msg) if msg.contains("alert_at_percent")));
}

#[test]
fn test_percentages_must_be_in_range() {
    init_tracing();

    let err = validate("[budget]\nshutdown_at_percent = 150.0\n").unwrap_err();
    assert!(matches!(err, NoteflowError::ConfigError(_)));
}

#[test]
fn test_zero_daily_limit_rejected() {
    init_tracing();

    let err = validate("[budget]\ndaily_limit = 0.0\n").unwrap_err();
    assert!(matches!(err, NoteflowError::ConfigError(msg) if msg.contains("daily_limit")));
}

#[test]
fn test_resource_limit_constraints() {
    init_tracing();

    let err = validate("[resource.llm]\nmax_requests_per_hour = 0\n").unwrap_err();
    assert!(matches!(err, NoteflowError::ConfigError(msg) if msg.contains("max_requests_per_hour")));

    let err = validate(
        "[resource.llm]\nmax_requests_per_hour = 100\nmax_requests_per_day = 50\n",
    )
    .unwrap_err();
    assert!(matches!(err, NoteflowError::ConfigError(msg) if msg.contains("max_requests_per_day")));

    let err = validate("[resource.llm]\ncircuit_open_seconds = 0\n").unwrap_err();
    assert!(matches!(err, NoteflowError::ConfigError(msg) if msg.contains("circuit_open_seconds")));
}

#[test]
fn test_bad_job_schedule_rejected_at_load() {
    init_tracing();

    let err = validate("[job.broken]\nschedule = \"every 0s\"\n").unwrap_err();
    assert!(matches!(err, NoteflowError::ConfigError(msg) if msg.contains("broken")));
}

#[test]
fn test_malformed_toml_is_a_toml_error() {
    init_tracing();

    let file = write_config("[watch\npath = ");
    let err = load_from_path(file.path()).unwrap_err();
    assert!(matches!(err, NoteflowError::TomlError(_)), "got: {err:?}");
}

#[test]
fn test_missing_file_is_an_io_error() {
    init_tracing();

    let err = load_from_path("/nonexistent/Noteflow.toml").unwrap_err();
    assert!(matches!(err, NoteflowError::IoError(_)), "got: {err:?}");
}

#[test]
fn test_raw_config_defaults_match_validated_defaults() {
    init_tracing();

    let raw: RawConfigFile = toml::from_str("").unwrap();
    let config = ConfigFile::try_from(raw).unwrap();
    assert_eq!(config.watch.debounce_seconds, 2.0);
}
