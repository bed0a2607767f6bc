//! CLI module for userbase
//!
//! - init: create the SQLite database and schema
//! - serve: open the store and run the HTTP API
//! - check-config: print the effective configuration

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{check_config, init, run, run_command, serve};
pub use errors::{CliError, CliResult};
