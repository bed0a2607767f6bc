//! CLI command implementations
//!
//! Boot order for `serve`: load config, apply log level, open the store,
//! build the router, then serve until Ctrl-C.

use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, StoreBackend};
use crate::coordinator::RecordCoordinator;
use crate::http_server::{HttpServer, UsersState};
use crate::observability::{log_event, log_event_with_fields, Event, Logger, ObservationScope};
use crate::store::{RecordStore, SqliteStore};

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { config } => init(&config),
        Command::Serve { config, port } => serve(&config, port),
        Command::CheckConfig { config } => check_config(&config),
    }
}

fn load_config(config_path: &Path) -> CliResult<Config> {
    let config = Config::load(config_path)?;
    Logger::set_min_severity(config.severity()?);
    log_event_with_fields(
        Event::ConfigLoaded,
        &[
            ("path", &config_path.display().to_string()),
            ("backend", store_backend_name(config.store.backend)),
        ],
    );
    Ok(config)
}

fn store_backend_name(backend: StoreBackend) -> &'static str {
    match backend {
        StoreBackend::Sqlite => "sqlite",
        StoreBackend::Memory => "memory",
    }
}

/// Create the SQLite database and schema
///
/// Refuses to touch an existing database file. The memory backend has
/// nothing to initialize.
pub fn init(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;

    if config.store.backend == StoreBackend::Memory {
        return Err(CliError::Config(
            "init requires the 'sqlite' store backend".to_string(),
        ));
    }

    let path = &config.store.path;
    if path.exists() {
        return Err(CliError::AlreadyInitialized(path.clone()));
    }

    let scope = ObservationScope::with_fields("STORE_INIT", &[("engine", "sqlite")]);
    match SqliteStore::open(path, config.store.busy_timeout()) {
        Ok(store) => {
            scope.complete();
            log_event_with_fields(
                Event::StoreOpened,
                &[("engine", "sqlite"), ("path", &store.path().display().to_string())],
            );
            Ok(())
        }
        Err(e) => {
            scope.fail(&e.to_string());
            Err(e.into())
        }
    }
}

/// Open the store and serve the HTTP API until Ctrl-C
pub fn serve(config_path: &Path, port: Option<u16>) -> CliResult<()> {
    log_event(Event::BootStart);

    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.http.port = port;
    }

    let store = open_store(&config)?;
    let coordinator = RecordCoordinator::new(store);
    let state = Arc::new(UsersState::new(coordinator, config.request_timeout()));
    let server = HttpServer::new(config.http.clone(), state);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::BootFailed(format!("Failed to create tokio runtime: {}", e)))?;

    log_event(Event::BootComplete);

    rt.block_on(async {
        server
            .start(shutdown_signal())
            .await
            .map_err(|e| CliError::BootFailed(format!("HTTP server failed: {}", e)))
    })?;

    log_event(Event::ShutdownComplete);
    Ok(())
}

/// Load, validate and print the effective configuration as JSON
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn open_store(config: &Config) -> CliResult<Arc<dyn RecordStore>> {
    let engine = store_backend_name(config.store.backend);
    let scope = ObservationScope::with_fields("STORE_INIT", &[("engine", engine)]);

    match config.store.open(config.lock_wait_timeout()) {
        Ok(store) => {
            scope.complete();
            log_event_with_fields(Event::StoreOpened, &[("engine", store.engine())]);
            Ok(store)
        }
        Err(e) => {
            scope.fail(&e.to_string());
            Err(e.into())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        Logger::error("SIGNAL_HANDLER_FAILED", &[("error", &e.to_string())]);
        std::future::pending::<()>().await;
    }
    log_event(Event::ShutdownStart);
}
