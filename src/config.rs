//! Service configuration
//!
//! Loaded from a JSON file; every field has a default, and a missing file
//! means "all defaults". Environment variables are applied on top:
//!
//! - `USERBASE_HOST`, `USERBASE_PORT`
//! - `USERBASE_STORE_BACKEND` (`sqlite` | `memory`)
//! - `USERBASE_DB_PATH`
//! - `USERBASE_LOG_LEVEL`

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http_server::HttpServerConfig;
use crate::observability::Severity;
use crate::store::{MemoryStore, RecordStore, SqliteStore, StoreResult};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Which engine backs the record table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

impl StoreBackend {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::invalid(
                "store.backend",
                format!("'{}'. Must be 'sqlite' or 'memory'.", other),
            )),
        }
    }
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage engine (default: sqlite)
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// SQLite database file (default: "./userbase.db")
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// How long SQLite waits on a locked database (default: 5000)
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./userbase.db")
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Open the configured engine
    pub fn open(&self, lock_wait: Duration) -> StoreResult<Arc<dyn RecordStore>> {
        Ok(match self.backend {
            StoreBackend::Sqlite => Arc::new(SqliteStore::open(&self.path, self.busy_timeout())?),
            StoreBackend::Memory => Arc::new(MemoryStore::with_lock_wait(lock_wait)),
        })
    }
}

/// Top-level configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    /// Deadline for a single request's store work (default: 10000)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Upper bound on waiting for a row lock (default: 5000)
    #[serde(default = "default_lock_wait_timeout_ms")]
    pub lock_wait_timeout_ms: u64,

    /// trace | info | warn | error (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_lock_wait_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpServerConfig::default(),
            store: StoreConfig::default(),
            request_timeout_ms: default_request_timeout_ms(),
            lock_wait_timeout_ms: default_lock_wait_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from `path` (if it exists), apply the process environment and
    /// validate
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse the file without environment overrides or validation
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply `USERBASE_*` overrides using `lookup` to read variables
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("USERBASE_HOST") {
            self.http.host = host;
        }
        if let Some(port) = lookup("USERBASE_PORT") {
            self.http.port = port
                .parse()
                .map_err(|_| ConfigError::invalid("USERBASE_PORT", format!("'{}'", port)))?;
        }
        if let Some(backend) = lookup("USERBASE_STORE_BACKEND") {
            self.store.backend = StoreBackend::parse(&backend)?;
        }
        if let Some(path) = lookup("USERBASE_DB_PATH") {
            self.store.path = PathBuf::from(path);
        }
        if let Some(level) = lookup("USERBASE_LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::invalid("request_timeout_ms", "must be > 0"));
        }
        if self.lock_wait_timeout_ms == 0 {
            return Err(ConfigError::invalid("lock_wait_timeout_ms", "must be > 0"));
        }
        if self.store.busy_timeout_ms == 0 {
            return Err(ConfigError::invalid("store.busy_timeout_ms", "must be > 0"));
        }
        if self.store.backend == StoreBackend::Sqlite && self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::invalid(
                "store.path",
                "required when backend is 'sqlite'",
            ));
        }
        self.severity()?;
        Ok(())
    }

    pub fn severity(&self) -> Result<Severity, ConfigError> {
        self.log_level
            .parse()
            .map_err(|reason| ConfigError::invalid("log_level", reason))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn lock_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_wait_timeout_ms)
    }
}
