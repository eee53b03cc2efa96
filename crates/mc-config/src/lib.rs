//! Memcard Configuration
//!
//! Configuration is resolved once at startup and handed to each component by
//! reference. Sources, later ones winning:
//! - Built-in defaults
//! - Optional TOML file named by `MC_CONFIG_FILE`
//! - Environment variables
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MC_CONFIG_FILE` | - | Optional TOML config file |
//! | `MC_BIND_ADDR` | `0.0.0.0:8090` | Record API listen address |
//! | `MC_METRICS_ADDR` | `0.0.0.0:9090` | Metrics/health listen address |
//! | `MC_CORS_ORIGIN` | - | Allowed CORS origin (any when unset) |
//! | `MC_SHUTDOWN_GRACE_SECS` | `15` | Drain window for in-flight dispatches |
//! | `MC_DATA_DIR` | `./pb_data` | Data directory |
//! | `MC_DATABASE_URL` | `sqlite://{data_dir}/data.db?mode=rwc` | Store URL |
//! | `MC_DB_MAX_CONNECTIONS` | `5` | Store pool size |
//! | `INTERNAL_API_URL` | - | Job-processing API base URL |
//! | `MC_DISPATCH_WORKERS` | `8` | Concurrent dispatches |
//! | `MC_DISPATCH_QUEUE_CAPACITY` | `256` | Pending dispatches |
//! | `MC_DISPATCH_TIMEOUT_SECS` | `10` | Per-attempt timeout |
//! | `MC_DISPATCH_CONNECT_TIMEOUT_SECS` | `5` | Connect timeout |
//! | `INITIAL_ADMIN_EMAIL` | - | Administrator account email |
//! | `INITIAL_ADMIN_PASSWORD` | - | Administrator account password |
//! | `TEMPORAL_BOT_EMAIL` | - | Service account email |
//! | `TEMPORAL_BOT_PASSWORD` | - | Service account password |
//! | `MC_LOG_FORMAT` | `text` | `text` or `json` |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const CONFIG_FILE_VAR: &str = "MC_CONFIG_FILE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing credentials for {account}: {field} is not set")]
    MissingCredentials { account: String, field: &'static str },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub dispatch: DispatchConfig,
    pub seed: SeedConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub metrics_addr: String,
    pub cors_origin: Option<String>,
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8090".to_string(),
            metrics_addr: "0.0.0.0:9090".to_string(),
            cors_origin: None,
            shutdown_grace_secs: 15,
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub data_dir: PathBuf,
    /// Explicit connection URL; derived from `data_dir` when unset
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./pb_data"),
            url: None,
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("sqlite://{}?mode=rwc", self.data_dir.join("data.db").display()),
        }
    }
}

/// Settings for the job-request webhook dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Base URL of the job-processing API. Used verbatim.
    pub internal_api_url: String,
    pub workers: usize,
    pub queue_capacity: usize,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            internal_api_url: String::new(),
            workers: 8,
            queue_capacity: 256,
            timeout_secs: 10,
            connect_timeout_secs: 5,
        }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Email/password pair for a seeded account
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountCredentials {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AccountCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    /// Both fields, or an error naming the first missing one
    pub fn require(&self, account: &str) -> Result<(&str, &str)> {
        let email = non_empty(&self.email).ok_or_else(|| ConfigError::MissingCredentials {
            account: account.to_string(),
            field: "email",
        })?;
        let password = non_empty(&self.password).ok_or_else(|| ConfigError::MissingCredentials {
            account: account.to_string(),
            field: "password",
        })?;
        Ok((email, password))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Accounts created by the initial seed migration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub admin: AccountCredentials,
    pub service_account: AccountCredentials,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::InvalidValue {
                key: "MC_LOG_FORMAT".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl AppConfig {
    /// Load from the process environment
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using `env` as the variable source
    pub fn load_with<F>(env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match env(CONFIG_FILE_VAR) {
            Some(path) if !path.is_empty() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(&env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config file {}", path.display());
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env<F>(&mut self, env: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = env("MC_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = env("MC_METRICS_ADDR") {
            self.server.metrics_addr = v;
        }
        if let Some(v) = env("MC_CORS_ORIGIN") {
            self.server.cors_origin = Some(v);
        }
        if let Some(v) = parse_var(env, "MC_SHUTDOWN_GRACE_SECS")? {
            self.server.shutdown_grace_secs = v;
        }

        if let Some(v) = env("MC_DATA_DIR") {
            self.database.data_dir = PathBuf::from(v);
        }
        if let Some(v) = env("MC_DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Some(v) = parse_var(env, "MC_DB_MAX_CONNECTIONS")? {
            self.database.max_connections = v;
        }

        if let Some(v) = env("INTERNAL_API_URL") {
            self.dispatch.internal_api_url = v;
        }
        if let Some(v) = parse_var(env, "MC_DISPATCH_WORKERS")? {
            self.dispatch.workers = v;
        }
        if let Some(v) = parse_var(env, "MC_DISPATCH_QUEUE_CAPACITY")? {
            self.dispatch.queue_capacity = v;
        }
        if let Some(v) = parse_var(env, "MC_DISPATCH_TIMEOUT_SECS")? {
            self.dispatch.timeout_secs = v;
        }
        if let Some(v) = parse_var(env, "MC_DISPATCH_CONNECT_TIMEOUT_SECS")? {
            self.dispatch.connect_timeout_secs = v;
        }

        if let Some(v) = env("INITIAL_ADMIN_EMAIL") {
            self.seed.admin.email = Some(v);
        }
        if let Some(v) = env("INITIAL_ADMIN_PASSWORD") {
            self.seed.admin.password = Some(v);
        }
        if let Some(v) = env("TEMPORAL_BOT_EMAIL") {
            self.seed.service_account.email = Some(v);
        }
        if let Some(v) = env("TEMPORAL_BOT_PASSWORD") {
            self.seed.service_account.password = Some(v);
        }

        if let Some(v) = parse_var(env, "MC_LOG_FORMAT")? {
            self.logging.format = v;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.dispatch.workers == 0 {
            return Err(ConfigError::Invalid("dispatch.workers must be at least 1".to_string()));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.dispatch.timeout_secs == 0 {
            return Err(ConfigError::Invalid("dispatch.timeout_secs must be positive".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<F, T>(env: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match env(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::load_with(env_from(&[])).unwrap();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8090");
        assert_eq!(config.dispatch.workers, 8);
        assert_eq!(config.dispatch.queue_capacity, 256);
        assert_eq!(config.dispatch.timeout(), Duration::from_secs(10));
        assert_eq!(config.dispatch.internal_api_url, "");
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(
            config.database.connection_url(),
            "sqlite://./pb_data/data.db?mode=rwc"
        );
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::load_with(env_from(&[
            ("INTERNAL_API_URL", "http://api:8000"),
            ("MC_DISPATCH_WORKERS", "2"),
            ("MC_DISPATCH_TIMEOUT_SECS", "3"),
            ("INITIAL_ADMIN_EMAIL", "admin@example.com"),
            ("INITIAL_ADMIN_PASSWORD", "adminpass"),
            ("TEMPORAL_BOT_EMAIL", "bot@example.com"),
            ("TEMPORAL_BOT_PASSWORD", "botpass"),
            ("MC_LOG_FORMAT", "JSON"),
        ]))
        .unwrap();

        assert_eq!(config.dispatch.internal_api_url, "http://api:8000");
        assert_eq!(config.dispatch.workers, 2);
        assert_eq!(config.dispatch.timeout(), Duration::from_secs(3));
        assert_eq!(
            config.seed.admin.require("admin").unwrap(),
            ("admin@example.com", "adminpass")
        );
        assert_eq!(
            config.seed.service_account.require("bot").unwrap(),
            ("bot@example.com", "botpass")
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = AppConfig::load_with(env_from(&[("MC_DISPATCH_WORKERS", "many")])).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value } => {
                assert_eq!(key, "MC_DISPATCH_WORKERS");
                assert_eq!(value, "many");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let err = AppConfig::load_with(env_from(&[("MC_DISPATCH_WORKERS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_credentials() {
        let creds = AccountCredentials {
            email: Some("admin@example.com".to_string()),
            password: Some("   ".to_string()),
        };
        let err = creds.require("admin").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingCredentials { field: "password", .. }
        ));

        let err = AccountCredentials::default().require("admin").unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredentials { field: "email", .. }));
    }

    #[test]
    fn test_password_redacted_in_debug() {
        let creds = AccountCredentials::new("admin@example.com", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("admin@example.com"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
bind_addr = "127.0.0.1:7000"

[dispatch]
internal_api_url = "http://from-file:8000"
workers = 3

[seed.admin]
email = "file-admin@example.com"
password = "filepass"
"#
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let config = AppConfig::load_with(env_from(&[
            (CONFIG_FILE_VAR, path.as_str()),
            ("INTERNAL_API_URL", "http://from-env:8000"),
        ]))
        .unwrap();

        assert_eq!(config.server.bind_addr, "127.0.0.1:7000");
        assert_eq!(config.dispatch.workers, 3);
        assert_eq!(config.dispatch.internal_api_url, "http://from-env:8000");
        assert_eq!(
            config.seed.admin.email.as_deref(),
            Some("file-admin@example.com")
        );
        // untouched sections keep defaults
        assert_eq!(config.dispatch.queue_capacity, 256);
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load_with(env_from(&[(CONFIG_FILE_VAR, "/nonexistent/mc.toml")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_malformed_toml() {
        let err = AppConfig::from_toml_str("[dispatch\nworkers = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_explicit_database_url() {
        let config = AppConfig::load_with(env_from(&[(
            "MC_DATABASE_URL",
            "sqlite::memory:",
        )]))
        .unwrap();
        assert_eq!(config.database.connection_url(), "sqlite::memory:");
    }
}
