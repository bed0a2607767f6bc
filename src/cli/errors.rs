//! CLI errors
//!
//! Every CLI error is fatal: `main` prints it (code first) and exits
//! non-zero.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    /// Config file unreadable, malformed or invalid
    #[error("USERBASE_CLI_CONFIG_ERROR: {0}")]
    Config(String),

    /// `init` found an existing database file
    #[error("USERBASE_CLI_ALREADY_INITIALIZED: database already exists at {}", .0.display())]
    AlreadyInitialized(PathBuf),

    /// Store could not be opened
    #[error("USERBASE_CLI_STORE_ERROR: {0}")]
    Store(#[from] StoreError),

    /// Runtime or listener failure while serving
    #[error("USERBASE_CLI_BOOT_FAILED: {0}")]
    BootFailed(String),
}

impl CliError {
    /// Stable code string, also the prefix of the display form
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(_) => "USERBASE_CLI_CONFIG_ERROR",
            CliError::AlreadyInitialized(_) => "USERBASE_CLI_ALREADY_INITIALIZED",
            CliError::Store(_) => "USERBASE_CLI_STORE_ERROR",
            CliError::BootFailed(_) => "USERBASE_CLI_BOOT_FAILED",
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Config(format!("cannot render config: {}", e))
    }
}
