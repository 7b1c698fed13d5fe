//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (FORENSIC_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [database]
//! path = "forensics.db"
//!
//! [execution]
//! max_rows = 1000
//! timeout_ms = 10000
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! FORENSIC_DATABASE__PATH=/srv/forensics.db
//! FORENSIC_EXECUTION__MAX_ROWS=500
//! ```
//!
//! The completion credential may also come from `OPENAI_API_KEY`.

use crate::error::GatewayError;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Fallback environment variable for the completion credential
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Relational store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file (opened read-only)
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Maximum pooled read-only connections shared by all sessions
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

/// Completion service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Credential; empty means "read OPENAI_API_KEY"
    #[serde(default, skip_serializing)]
    pub api_key: String,

    /// Bound on a single completion call in milliseconds
    #[serde(default = "default_completion_timeout_ms")]
    pub timeout_ms: u64,
}

/// Statement execution bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Row cap applied to every result
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Statement timeout in milliseconds
    #[serde(default = "default_execution_timeout_ms")]
    pub timeout_ms: u64,

    /// Row cap for the single retry after a timeout
    #[serde(default = "default_retry_max_rows")]
    pub retry_max_rows: usize,

    /// Statement timeout for the single retry after a timeout
    #[serde(default = "default_retry_timeout_ms")]
    pub retry_timeout_ms: u64,
}

/// Request-level bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Upper bound on one `ask`, end to end, in milliseconds
    #[serde(default = "default_total_timeout_ms")]
    pub total_timeout_ms: u64,

    /// Longest accepted question in bytes
    #[serde(default = "default_max_question_bytes")]
    pub max_question_bytes: usize,
}

/// Session manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum number of concurrent sessions (0 = unlimited)
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Idle timeout in seconds before a session is reaped (0 = no timeout)
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_host")]
    pub host: String,

    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Allowed CORS origins (empty = same-origin only)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("forensics.db")
}
fn default_pool_size() -> usize {
    4
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_completion_timeout_ms() -> u64 {
    20_000
}
fn default_max_rows() -> usize {
    1000
}
fn default_execution_timeout_ms() -> u64 {
    10_000
}
fn default_retry_max_rows() -> usize {
    100
}
fn default_retry_timeout_ms() -> u64 {
    5_000
}
fn default_total_timeout_ms() -> u64 {
    45_000
}
fn default_max_question_bytes() -> usize {
    4096
}
fn default_max_sessions() -> usize {
    1000
}
fn default_idle_timeout_secs() -> u64 {
    3600 // 1 hour
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_http_host() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_max_body_bytes() -> usize {
    16 * 1024
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (FORENSIC_* prefix)
    pub fn load() -> Result<Self, GatewayError> {
        let config: Config = Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("FORENSIC_").split("__"))
            .extract()?;
        Ok(config.with_env_credentials())
    }

    /// Load configuration from specific file path
    pub fn from_file(path: &str) -> Result<Self, GatewayError> {
        let config: Config = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("FORENSIC_").split("__"))
            .extract()?;
        Ok(config.with_env_credentials())
    }

    /// Fill an empty completion credential from `OPENAI_API_KEY`
    pub fn with_env_credentials(mut self) -> Self {
        if self.completion.api_key.trim().is_empty() {
            if let Ok(key) = std::env::var(API_KEY_ENV) {
                self.completion.api_key = key;
            }
        }
        self
    }

    /// Fail fast on settings the gateway cannot run with
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.completion.api_key.trim().is_empty() {
            return Err(GatewayError::Config(format!(
                "completion API key not found; set {API_KEY_ENV} or completion.api_key"
            )));
        }
        self.validate_bounds()
    }

    /// Bound checks that do not involve the credential
    pub fn validate_bounds(&self) -> Result<(), GatewayError> {
        let zero = [
            ("database.pool_size", self.database.pool_size == 0),
            ("execution.max_rows", self.execution.max_rows == 0),
            ("execution.timeout_ms", self.execution.timeout_ms == 0),
            ("execution.retry_max_rows", self.execution.retry_max_rows == 0),
            ("execution.retry_timeout_ms", self.execution.retry_timeout_ms == 0),
            ("completion.timeout_ms", self.completion.timeout_ms == 0),
            ("gateway.total_timeout_ms", self.gateway.total_timeout_ms == 0),
            ("gateway.max_question_bytes", self.gateway.max_question_bytes == 0),
        ];
        if let Some((name, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(GatewayError::Config(format!("{name} must be greater than zero")));
        }
        if self.execution.retry_max_rows > self.execution.max_rows {
            return Err(GatewayError::Config(
                "execution.retry_max_rows must not exceed execution.max_rows".to_string(),
            ));
        }
        Ok(())
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_timeout(&self) -> Duration {
        Duration::from_millis(self.retry_timeout_ms)
    }
}

impl GatewayConfig {
    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }
}

impl CompletionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: default_database_path(),
            pool_size: default_pool_size(),
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        CompletionConfig {
            base_url: default_base_url(),
            model: default_model(),
            api_key: String::new(),
            timeout_ms: default_completion_timeout_ms(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            max_rows: default_max_rows(),
            timeout_ms: default_execution_timeout_ms(),
            retry_max_rows: default_retry_max_rows(),
            retry_timeout_ms: default_retry_timeout_ms(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            total_timeout_ms: default_total_timeout_ms(),
            max_question_bytes: default_max_question_bytes(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_sessions: default_max_sessions(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            host: default_http_host(),
            port: default_http_port(),
            max_body_bytes: default_max_body_bytes(),
            cors_origins: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_key() -> Config {
        let mut config = Config::default();
        config.completion.api_key = "sk-test".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, PathBuf::from("forensics.db"));
        assert_eq!(config.execution.max_rows, 1000);
        assert_eq!(config.completion.model, "gpt-4o");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.http.port, 8080);
    }

    #[test]
    fn test_missing_credential_fails_validation() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
        assert!(err.to_string().contains(API_KEY_ENV));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(with_key().validate().is_ok());
    }

    #[test]
    fn test_zero_bounds_rejected() {
        let mut config = with_key();
        config.execution.max_rows = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("execution.max_rows"));

        let mut config = with_key();
        config.gateway.total_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_rows_cannot_exceed_cap() {
        let mut config = with_key();
        config.execution.retry_max_rows = config.execution.max_rows + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_toml_roundtrip_omits_key() {
        let config = with_key();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[execution]"));
        assert!(!toml_str.contains("sk-test"));

        let back: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.execution.max_rows, 1000);
        assert!(back.completion.api_key.is_empty());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let back: Config = toml::from_str("[execution]\nmax_rows = 5\n").unwrap();
        assert_eq!(back.execution.max_rows, 5);
        assert_eq!(back.execution.timeout_ms, 10_000);
        assert_eq!(back.session.max_sessions, 1000);
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.execution.timeout(), Duration::from_secs(10));
        assert_eq!(config.execution.retry_timeout(), Duration::from_secs(5));
        assert_eq!(config.gateway.total_timeout(), Duration::from_secs(45));
        assert_eq!(config.completion.timeout(), Duration::from_secs(20));
    }
}
