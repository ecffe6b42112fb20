//! Tests for configuration file discovery and environment overrides
//!
//! Uses serial_test: tests touching ROLLCALL_* variables must not run in parallel.

use rollcall_common::config::{ensure_directories, LoggingConfig, Settings, TomlConfig, CONFIG_ENV_VAR};
use rollcall_common::Error;
use serial_test::serial;
use std::env;
use tempfile::TempDir;

const SAMPLE: &str = r#"
database_path = "db/rollcall.db"

[logging]
level = "debug"

[sis]
base_url = "https://sis.example.test"
token = "toml-token"
timeout_secs = 5

[sync]
advisor_id = 7
cohort_year = 2028
term_id = "2024-T1"
utc_offset = "-05:00"

[retry]
max_retries = 5
backoff_unit_ms = 10
"#;

#[test]
#[serial]
fn test_load_explicit_file() {
    env::remove_var(CONFIG_ENV_VAR);
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("rollcall.toml");
    std::fs::write(&path, SAMPLE).unwrap();

    let config = TomlConfig::load(Some(&path)).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.source.as_deref(), Some(path.as_path()));

    let settings = Settings::resolve(config, true).unwrap();
    assert_eq!(settings.sis_token, "toml-token");
    assert_eq!(settings.request_timeout.as_secs(), 5);
    assert_eq!(settings.retry.max_retries, 5);
    assert_eq!(settings.retry.backoff_unit.as_millis(), 10);
    assert_eq!(settings.utc_offset.local_minus_utc(), -5 * 3600);
    assert_eq!(settings.term_id.as_deref(), Some("2024-T1"));
}

#[test]
#[serial]
fn test_missing_explicit_file_is_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let result = TomlConfig::load(Some(std::path::Path::new("/nonexistent/rollcall.toml")));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_config_env_var_names_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("custom.toml");
    std::fs::write(&path, SAMPLE).unwrap();
    env::set_var(CONFIG_ENV_VAR, &path);

    let config = TomlConfig::load(None).unwrap();
    assert_eq!(config.sync.advisor_id, Some(7));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_overrides_toml() {
    env::set_var("ROLLCALL_SIS_TOKEN", "env-token");
    env::set_var("ROLLCALL_ADVISOR_ID", "99");

    let config = TomlConfig::from_toml_str(SAMPLE)
        .unwrap()
        .with_env_overrides()
        .unwrap();
    let settings = Settings::resolve(config, true).unwrap();
    assert_eq!(settings.sis_token, "env-token");
    assert_eq!(
        settings.scope,
        rollcall_common::config::ScopeSetting::Advisor(99)
    );

    env::remove_var("ROLLCALL_SIS_TOKEN");
    env::remove_var("ROLLCALL_ADVISOR_ID");
}

#[test]
fn test_invalid_toml_is_config_error() {
    let result = TomlConfig::from_toml_str("[sync]\ncohort_year = \"soon\"");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_ensure_directories_creates_folders() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("data").join("rollcall.db");
    let output_dir = temp_dir.path().join("output").join("reports");
    let logging = LoggingConfig {
        level: "info".to_string(),
        file: Some(temp_dir.path().join("logs").join("app.log")),
    };

    ensure_directories(&db_path, &output_dir, &logging).unwrap();

    assert!(temp_dir.path().join("data").is_dir());
    assert!(output_dir.is_dir());
    assert!(temp_dir.path().join("logs").is_dir());
}
