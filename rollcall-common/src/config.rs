//! Configuration loading
//!
//! Two layers, lowest priority first:
//! 1. TOML bootstrap file (`rollcall.toml`)
//! 2. Environment variables (`ROLLCALL_*`)
//!
//! Command-line arguments are applied by the binary on top of the result.
//! The merged [`TomlConfig`] is validated into an immutable [`Settings`]
//! value that is injected into the client and the sync orchestrator.

use crate::time::parse_utc_offset;
use crate::{Error, Result};
use chrono::FixedOffset;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "ROLLCALL_CONFIG";

pub const CONFIG_FILE_NAME: &str = "rollcall.toml";
const DEFAULT_DATABASE_PATH: &str = "data/rollcall.db";
const DEFAULT_OUTPUT_DIR: &str = "output/reports";
const DEFAULT_UTC_OFFSET: &str = "+08:00";
const DEFAULT_AUTH_HEADER: &str = "auth-token";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_UNIT_MS: u64 = 1000;
const DEFAULT_PER_PAGE: u32 = 100;
const DEFAULT_SOURCE: &str = "SIS";

/// Bootstrap configuration loaded from TOML
///
/// Every field is optional here; [`Settings::resolve`] decides what is required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Path to the SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Folder receiving rendered charts and reports
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub sis: SisSection,

    #[serde(default)]
    pub sync: SyncSection,

    #[serde(default)]
    pub retry: RetrySection,

    /// Upstream endpoint table (defaults match the documented v2 API)
    #[serde(default)]
    pub endpoints: Endpoints,

    /// File the values came from; `None` when no file was found
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr only if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `[sis]` table: upstream connection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SisSection {
    pub base_url: Option<String>,
    pub token: Option<String>,
    /// Header carrying the token (default `auth-token`)
    pub auth_header: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// `[sync]` table: run scope and behaviour
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncSection {
    pub advisor_id: Option<i64>,
    pub homeroom_id: Option<i64>,
    pub homeroom_name: Option<String>,
    pub cohort_year: Option<i32>,
    pub term_id: Option<String>,
    pub utc_offset: Option<String>,
    pub per_page: Option<u32>,
    pub grade_fetch_concurrency: Option<usize>,
    pub default_source: Option<String>,
    pub fail_on_empty_roster: Option<bool>,
}

/// `[retry]` table
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrySection {
    pub max_retries: Option<u32>,
    pub backoff_unit_ms: Option<u64>,
}

/// One upstream endpoint: a path template and the envelope keys to scan
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointConfig {
    /// Path relative to the base URL; `{id}` is substituted per call
    pub path: String,

    /// Wrapper keys checked in priority order when the payload is an object
    #[serde(default = "default_envelope_keys")]
    pub envelope_keys: Vec<String>,
}

fn default_envelope_keys() -> Vec<String> {
    vec!["data".to_string(), "items".to_string()]
}

impl EndpointConfig {
    pub fn new(path: &str, envelope_keys: &[&str]) -> Self {
        Self {
            path: path.to_string(),
            envelope_keys: envelope_keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Path with `{id}` replaced
    pub fn path_for(&self, id: i64) -> String {
        self.path.replace("{id}", &id.to_string())
    }
}

/// Upstream endpoint table
///
/// Built once and injected; nothing mutates it after startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub year_groups: EndpointConfig,
    pub year_group_students: EndpointConfig,
    pub students: EndpointConfig,
    pub classes: EndpointConfig,
    pub class_term_grades: EndpointConfig,
    pub student_term_grades: EndpointConfig,
    pub behaviour_notes: EndpointConfig,
    pub term_attendance: EndpointConfig,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            year_groups: EndpointConfig::new("/v2/year_groups", &["data", "year_groups", "items"]),
            year_group_students: EndpointConfig::new(
                "/v2/year_groups/{id}/students",
                &["students", "data", "items"],
            ),
            students: EndpointConfig::new("/v2/students", &["students", "data", "items"]),
            classes: EndpointConfig::new("/v2/classes", &["data", "classes", "items"]),
            class_term_grades: EndpointConfig::new(
                "/v2/classes/{id}/term_grades",
                &["data", "grades", "items"],
            ),
            student_term_grades: EndpointConfig::new(
                "/v2/students/{id}/term_grades",
                &["data", "grades", "items"],
            ),
            behaviour_notes: EndpointConfig::new("/v2/behavior/notes", &["data", "notes", "items"]),
            term_attendance: EndpointConfig::new(
                "/v2/homeroom/attendance/term_attendance",
                &["data", "attendance", "items"],
            ),
        }
    }
}

impl TomlConfig {
    /// Load the TOML file
    ///
    /// An explicit path (CLI or `ROLLCALL_CONFIG`) must exist. Without one, the
    /// working directory and the user config directory are searched; finding
    /// nothing yields defaults so the environment can supply every value.
    /// Does not log; callers report [`TomlConfig::source`] once logging is up.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from));

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Self::from_file(&path);
        }

        for candidate in default_config_paths() {
            if candidate.exists() {
                return Self::from_file(&candidate);
            }
        }

        Ok(Self::default())
    }

    /// Parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let mut config = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Apply `ROLLCALL_*` environment overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the process environment in production)
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("ROLLCALL_SIS_BASE_URL") {
            self.sis.base_url = Some(v);
        }
        if let Some(v) = get("ROLLCALL_SIS_TOKEN") {
            self.sis.token = Some(v);
        }
        if let Some(v) = get("ROLLCALL_ADVISOR_ID") {
            self.sync.advisor_id = Some(parse_env_int("ROLLCALL_ADVISOR_ID", &v)?);
        }
        if let Some(v) = get("ROLLCALL_HOMEROOM_ID") {
            self.sync.homeroom_id = Some(parse_env_int("ROLLCALL_HOMEROOM_ID", &v)?);
        }
        if let Some(v) = get("ROLLCALL_HOMEROOM_NAME") {
            self.sync.homeroom_name = Some(v);
        }
        if let Some(v) = get("ROLLCALL_COHORT_YEAR") {
            self.sync.cohort_year = Some(parse_env_int("ROLLCALL_COHORT_YEAR", &v)?);
        }
        if let Some(v) = get("ROLLCALL_TERM_ID") {
            self.sync.term_id = Some(v);
        }
        if let Some(v) = get("ROLLCALL_UTC_OFFSET") {
            self.sync.utc_offset = Some(v);
        }
        if let Some(v) = get("ROLLCALL_DATABASE") {
            self.database_path = Some(PathBuf::from(v));
        }

        Ok(self)
    }

    /// Database path with the default applied
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH))
    }
}

fn parse_env_int<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("Environment variable {} must be an integer", name)))
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("rollcall").join(CONFIG_FILE_NAME));
    }
    paths
}

/// Which students a run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeSetting {
    /// Students whose homeroom advisor has this id
    Advisor(i64),
    /// Students of one homeroom (year group); the name is resolved via the API
    Homeroom { id: Option<i64>, name: Option<String> },
}

/// Retry policy values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// One backoff unit; `Retry-After: n` waits n units
    pub backoff_unit: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: Duration::from_millis(DEFAULT_BACKOFF_UNIT_MS),
        }
    }
}

/// Validated, immutable runtime settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub sis_base_url: String,
    pub sis_token: String,
    pub auth_header: String,
    pub request_timeout: Duration,
    pub retry: RetrySettings,
    pub scope: ScopeSetting,
    pub cohort_year: i32,
    /// Required for `sync`, optional for inspection commands
    pub term_id: Option<String>,
    pub utc_offset: FixedOffset,
    pub per_page: u32,
    pub grade_fetch_concurrency: usize,
    pub default_source: String,
    pub fail_on_empty_roster: bool,
    pub database_path: PathBuf,
    pub output_dir: PathBuf,
    pub logging: LoggingConfig,
    pub endpoints: Endpoints,
}

impl Settings {
    /// Validate a merged configuration
    pub fn resolve(config: TomlConfig, require_term: bool) -> Result<Self> {
        let database_path = config.database_path();
        let sis_token = require(config.sis.token, "sis.token / ROLLCALL_SIS_TOKEN", "Set your SIS API token.")?;
        let sis_base_url = require(
            config.sis.base_url,
            "sis.base_url / ROLLCALL_SIS_BASE_URL",
            "Example: https://api.managebac.cn",
        )?
        .trim_end_matches('/')
        .to_string();

        let scope = match (config.sync.advisor_id, config.sync.homeroom_id, config.sync.homeroom_name) {
            (Some(advisor), _, _) => ScopeSetting::Advisor(advisor),
            (None, id, name) if id.is_some() || name.is_some() => ScopeSetting::Homeroom { id, name },
            _ => {
                return Err(Error::Config(
                    "Missing student scope: set sync.advisor_id (ROLLCALL_ADVISOR_ID) \
                     or sync.homeroom_id / sync.homeroom_name"
                        .to_string(),
                ))
            }
        };

        let cohort_year = config.sync.cohort_year.ok_or_else(|| {
            Error::Config(
                "Missing sync.cohort_year / ROLLCALL_COHORT_YEAR. Example: 2028.".to_string(),
            )
        })?;

        let term_id = config.sync.term_id.filter(|t| !t.trim().is_empty());
        if require_term && term_id.is_none() {
            return Err(Error::Config(
                "Missing sync.term_id / ROLLCALL_TERM_ID. Use the active term id of your school."
                    .to_string(),
            ));
        }

        let utc_offset = parse_utc_offset(
            config.sync.utc_offset.as_deref().unwrap_or(DEFAULT_UTC_OFFSET),
        )
        .map_err(|e| Error::Config(e.to_string()))?;

        let per_page = config.sync.per_page.unwrap_or(DEFAULT_PER_PAGE);
        if per_page == 0 {
            return Err(Error::Config("sync.per_page must be at least 1".to_string()));
        }

        let settings = Self {
            sis_base_url,
            sis_token,
            auth_header: config
                .sis
                .auth_header
                .unwrap_or_else(|| DEFAULT_AUTH_HEADER.to_string()),
            request_timeout: Duration::from_secs(
                config.sis.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            retry: RetrySettings {
                max_retries: config.retry.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
                backoff_unit: Duration::from_millis(
                    config.retry.backoff_unit_ms.unwrap_or(DEFAULT_BACKOFF_UNIT_MS),
                ),
            },
            scope,
            cohort_year,
            term_id,
            utc_offset,
            per_page,
            grade_fetch_concurrency: config.sync.grade_fetch_concurrency.unwrap_or(1).max(1),
            default_source: config
                .sync
                .default_source
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            fail_on_empty_roster: config.sync.fail_on_empty_roster.unwrap_or(true),
            database_path,
            output_dir: config
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            logging: config.logging,
            endpoints: config.endpoints,
        };

        debug!(
            base_url = %settings.sis_base_url,
            scope = ?settings.scope,
            cohort_year = settings.cohort_year,
            "Settings resolved"
        );

        Ok(settings)
    }
}

fn require(value: Option<String>, name: &str, hint: &str) -> Result<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Config(format!("Missing required setting: {}. {}", name, hint))),
    }
}

/// Create the database, log and report folders
pub fn ensure_directories(database_path: &Path, output_dir: &Path, logging: &LoggingConfig) -> Result<()> {
    let log_dir = logging.file.as_ref().and_then(|f| f.parent());
    for dir in [database_path.parent(), Some(output_dir), log_dir].into_iter().flatten() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn minimal() -> TomlConfig {
        TomlConfig::from_toml_str(
            r#"
            [sis]
            base_url = "https://api.example.test/"
            token = "secret"

            [sync]
            advisor_id = 42
            cohort_year = 2028
            term_id = "T1"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_defaults() {
        let settings = Settings::resolve(minimal(), true).unwrap();
        assert_eq!(settings.sis_base_url, "https://api.example.test");
        assert_eq!(settings.auth_header, "auth-token");
        assert_eq!(settings.scope, ScopeSetting::Advisor(42));
        assert_eq!(settings.retry, RetrySettings::default());
        assert_eq!(settings.per_page, 100);
        assert_eq!(settings.utc_offset.local_minus_utc(), 8 * 3600);
        assert!(settings.fail_on_empty_roster);
        assert_eq!(settings.database_path, PathBuf::from("data/rollcall.db"));
        assert_eq!(settings.endpoints, Endpoints::default());
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let mut config = minimal();
        config.sis.token = Some("   ".to_string());
        let err = Settings::resolve(config, true).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("ROLLCALL_SIS_TOKEN")));
    }

    #[test]
    fn test_term_only_required_for_sync() {
        let mut config = minimal();
        config.sync.term_id = None;
        assert!(Settings::resolve(config.clone(), true).is_err());
        let settings = Settings::resolve(config, false).unwrap();
        assert!(settings.term_id.is_none());
    }

    #[test]
    fn test_homeroom_scope_when_no_advisor() {
        let mut config = minimal();
        config.sync.advisor_id = None;
        config.sync.homeroom_name = Some("12A".to_string());
        let settings = Settings::resolve(config, true).unwrap();
        assert_eq!(
            settings.scope,
            ScopeSetting::Homeroom { id: None, name: Some("12A".to_string()) }
        );

        let mut config = minimal();
        config.sync.advisor_id = None;
        assert!(Settings::resolve(config, true).is_err());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("ROLLCALL_SIS_TOKEN", "from-env"),
            ("ROLLCALL_COHORT_YEAR", "2030"),
            ("ROLLCALL_TERM_ID", "  "),
        ]
        .into_iter()
        .collect();

        let config = minimal()
            .with_overrides_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.sis.token.as_deref(), Some("from-env"));
        assert_eq!(config.sync.cohort_year, Some(2030));
        // Blank values do not override
        assert_eq!(config.sync.term_id.as_deref(), Some("T1"));
    }

    #[test]
    fn test_non_integer_override_rejected() {
        let result = minimal().with_overrides_from(|k| {
            (k == "ROLLCALL_ADVISOR_ID").then(|| "forty-two".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_endpoint_override_keeps_other_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [endpoints.students]
            path = "/v3/students"
            "#,
        )
        .unwrap();
        assert_eq!(config.endpoints.students.path, "/v3/students");
        assert_eq!(config.endpoints.students.envelope_keys, vec!["data", "items"]);
        assert_eq!(config.endpoints.classes, Endpoints::default().classes);
        assert_eq!(config.source, None);
    }

    #[test]
    fn test_path_for_substitutes_id() {
        let endpoints = Endpoints::default();
        assert_eq!(
            endpoints.student_term_grades.path_for(7),
            "/v2/students/7/term_grades"
        );
    }
}
