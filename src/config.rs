//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `DATALENS_*` environment overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Object-store sandbox holding the dataset revisions
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_sandbox_root")]
    pub root: String,
}

fn default_sandbox_root() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("datalens").join("sandbox").to_string_lossy().to_string())
        .unwrap_or_else(|| "./datalens_sandbox".to_string())
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root: default_sandbox_root(),
        }
    }
}

impl SandboxConfig {
    pub fn root_path(&self) -> PathBuf {
        PathBuf::from(&self.root)
    }
}

/// Index database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// Sweep half-built indexes at startup
    #[serde(default = "default_enable_cache")]
    pub enable_cache: bool,
}

fn default_db_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("datalens").join("index.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./datalens_data/index.db".to_string())
}

fn default_busy_timeout() -> u64 {
    5000
}

fn default_enable_cache() -> bool {
    true
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            busy_timeout_ms: default_busy_timeout(),
            enable_cache: default_enable_cache(),
        }
    }
}

impl IndexConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Metrics aggregator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_top_n")]
    pub default_top_n: usize,
}

fn default_top_n() -> usize {
    crate::metrics::DEFAULT_TOP_N
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            default_top_n: default_top_n(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_request_timeout() -> u64 {
    30_000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl ApiConfig {
    /// Socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse TOML content
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("datalens").join("config.toml")),
            Some(PathBuf::from("/etc/datalens/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply `DATALENS_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(root) = var("DATALENS_SANDBOX_ROOT") {
            self.sandbox.root = root;
        }

        if let Some(db_path) = var("DATALENS_INDEX_DB") {
            self.index.db_path = db_path;
        }
        if let Some(enabled) = var("DATALENS_ENABLE_CACHE").and_then(|v| v.parse().ok()) {
            self.index.enable_cache = enabled;
        }

        if let Some(host) = var("DATALENS_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = var("DATALENS_API_PORT").and_then(|v| v.parse().ok()) {
            self.api.port = port;
        }
        if let Some(ms) = var("DATALENS_REQUEST_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.api.request_timeout_ms = ms;
        }

        if let Some(level) = var("DATALENS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("DATALENS_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Datalens Configuration
#
# Environment variables override these settings:
# - DATALENS_SANDBOX_ROOT
# - DATALENS_INDEX_DB
# - DATALENS_ENABLE_CACHE
# - DATALENS_API_HOST
# - DATALENS_API_PORT
# - DATALENS_REQUEST_TIMEOUT_MS
# - DATALENS_LOG_LEVEL
# - DATALENS_LOG_FORMAT

[sandbox]
# Root of the object store: <root>/<user>/<repo>/<branch>@<task>/<file>.mir
root = "~/.local/share/datalens/sandbox"

[index]
# SQLite database holding index collections, metadata and metrics
db_path = "~/.local/share/datalens/index.db"

# How long a statement waits on a locked database (ms)
busy_timeout_ms = 5000

# Reset indexes left half-built by a previous process at startup
enable_cache = true

[metrics]
# Top-N size of count-bucketed metrics queries
default_top_n = 5

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8090

# Upper bound on a single request (ms)
request_timeout_ms = 30000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
