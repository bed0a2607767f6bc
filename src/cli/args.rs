//! CLI argument definitions using clap
//!
//! Commands:
//! - userbase init --config <path>
//! - userbase serve --config <path> [--port <port>]
//! - userbase check-config --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// userbase - user records over HTTP with unique account ids
#[derive(Parser, Debug)]
#[command(name = "userbase")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the SQLite database file and schema
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./userbase.json")]
        config: PathBuf,
    },

    /// Open the store and serve the HTTP API until Ctrl-C
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./userbase.json")]
        config: PathBuf,

        /// Override the configured HTTP port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Load, validate and print the effective configuration
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./userbase.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
