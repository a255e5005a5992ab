//! Integration tests for configuration resolution
//!
//! Covers priority order (explicit file > env path > default file > compiled
//! defaults) and environment overrides.
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.

use hotlympics_common::config::{RaterConfig, ENV_API_URL, ENV_CONFIG_PATH, ENV_TOKEN};
use hotlympics_common::Cohort;
use serial_test::serial;
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;

fn clear_env() {
    env::remove_var(ENV_CONFIG_PATH);
    env::remove_var(ENV_API_URL);
    env::remove_var(ENV_TOKEN);
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
#[serial]
fn test_explicit_file_is_loaded() {
    clear_env();
    let file = write_config(
        r#"
        [api]
        base_url = "https://rate.example.com"
        timeout_secs = 5

        [session]
        default_cohort = "male"

        [cache]
        max_entries = 8
        "#,
    );

    let config = RaterConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.api.base_url, "https://rate.example.com");
    assert_eq!(config.api.timeout_secs, 5);
    assert_eq!(config.session.default_cohort, Cohort::Male);
    assert_eq!(config.cache.max_entries, 8);
    assert_eq!(config.cache.max_bytes, 100 * 1024 * 1024);
}

#[test]
#[serial]
fn test_env_config_path_is_used_without_cli_path() {
    clear_env();
    let file = write_config("[queue]\nblock_size = 6\n");
    env::set_var(ENV_CONFIG_PATH, file.path());

    let config = RaterConfig::load(None).unwrap();
    assert_eq!(config.queue.block_size, 6);

    clear_env();
}

#[test]
#[serial]
fn test_missing_explicit_file_is_error() {
    clear_env();
    let result = RaterConfig::load(Some(std::path::Path::new(
        "/nonexistent/hotlympics/rater.toml",
    )));
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    clear_env();
    let file = write_config(
        r#"
        [api]
        base_url = "https://from-file.example.com"
        bearer_token = "file-token"
        "#,
    );
    env::set_var(ENV_API_URL, "http://127.0.0.1:9999");
    env::set_var(ENV_TOKEN, "env-token");

    let config = RaterConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.api.base_url, "http://127.0.0.1:9999");
    assert_eq!(config.api.bearer_token.as_deref(), Some("env-token"));

    clear_env();
}

#[test]
#[serial]
fn test_blank_env_values_are_ignored() {
    clear_env();
    let file = write_config("[api]\nbase_url = \"https://kept.example.com\"\n");
    env::set_var(ENV_API_URL, "   ");

    let config = RaterConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.api.base_url, "https://kept.example.com");

    clear_env();
}

#[test]
#[serial]
fn test_invalid_file_value_can_be_overridden_before_validation() {
    clear_env();
    let file = write_config("[queue]\nblock_size = 1\n");

    let mut config = RaterConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.queue.block_size, 1);
    assert!(config.validate().is_err());

    // Command-line value applied after loading wins
    config.queue.block_size = 8;
    assert!(config.validate().is_ok());
}
