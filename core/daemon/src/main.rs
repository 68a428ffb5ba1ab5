//! Reshadeck daemon entrypoint.
//!
//! A small, single-writer service that owns the shader session: it is the
//! only process that writes `config.json` and `crash.json` and the only one
//! that invokes the activation script. The UI talks to it over a Unix socket.
//!
//! Everything runs on one current-thread runtime, so event handlers interleave
//! only where they await the activator.

use fs_err as fs;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixListener;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use reshadeck_core::{
    load_runtime_config, Collaborators, CommandParameterProvider, ConfigStore, CoredumpDirectory,
    CrashLedger, Engine, Paths, RuntimeConfig, ScriptActivator, StartupDecision, SystemClock,
};

mod dispatch;
mod server;

use dispatch::DaemonContext;

const SOCKET_ENV: &str = "RESHADECK_SOCKET";
const DEBUG_LOG_ENV: &str = "RESHADECK_DEBUG_LOG";
const LOG_FILE_NAME: &str = "reshadeck-daemon.log";

fn main() {
    let paths = Paths::from_env();
    let _log_guard = init_logging(paths.as_ref().ok().and_then(|p| p.log_dir.as_deref()));

    let paths = match paths {
        Ok(paths) => paths,
        Err(err) => {
            error!(error = %err, "Failed to resolve plugin paths");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "Failed to start async runtime");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(run(paths)) {
        error!(error = %err, "Reshadeck daemon failed");
        std::process::exit(1);
    }
}

async fn run(paths: Paths) -> Result<(), String> {
    let config = match load_runtime_config(&paths.runtime_config_file()) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load runtime config; using defaults");
            RuntimeConfig::default()
        }
    };

    let socket_path = daemon_socket_path(&paths);
    prepare_socket_dir(&socket_path)?;
    remove_existing_socket(&socket_path)?;
    let listener = UnixListener::bind(&socket_path)
        .map_err(|err| format!("Failed to bind {}: {}", socket_path.display(), err))?;

    let engine = build_engine(&paths, &config)?;
    info!(
        path = %socket_path.display(),
        settings = %paths.settings_dir.display(),
        "Reshadeck daemon started"
    );

    match engine.initialize() {
        StartupDecision::Activate => {
            let engine = engine.clone();
            tokio::spawn(async move { engine.activate_on_startup().await });
        }
        StartupDecision::CrashRecovered { timestamp } => {
            warn!(timestamp, "Shaders disabled after a crash in the previous session");
        }
        StartupDecision::Idle => info!("Nothing to apply at startup"),
    }

    let context = Arc::new(DaemonContext::new(engine.clone(), paths));
    server::serve(listener, context, server::shutdown_signal()).await;

    if engine.flush() {
        info!("Saved pending edits before exit");
    }
    if let Err(err) = fs::remove_file(&socket_path) {
        warn!(error = %err, "Failed to remove daemon socket");
    }
    info!("Reshadeck daemon stopped");
    Ok(())
}

fn build_engine(paths: &Paths, config: &RuntimeConfig) -> Result<Engine, String> {
    let crash_source = CoredumpDirectory::new(&config.coredump_dir, &config.coredump_pattern)
        .map_err(|err| format!("Invalid coredump_pattern: {}", err))?;
    let params = CommandParameterProvider::new(
        config.parser_command.as_deref(),
        vec![paths.shaders_dir(), paths.destination_dir.clone()],
    );
    let activator = ScriptActivator::new(&paths.activation_script(), &paths.destination_dir);

    info!(
        debounce_secs = config.debounce_secs,
        monitor_window_secs = config.monitor_window_secs,
        coredump_dir = %config.coredump_dir.display(),
        parser = config.parser_command.is_some(),
        "Runtime config loaded"
    );

    Ok(Engine::new(
        Collaborators {
            store: ConfigStore::new(&paths.config_file()),
            ledger: CrashLedger::new(&paths.crash_file()),
            activator: Arc::new(activator),
            params: Arc::new(params),
            crash_source: Arc::new(crash_source),
            clock: Arc::new(SystemClock),
        },
        config.timings(),
    ))
}

fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let debug_enabled = env::var(DEBUG_LOG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    match log_dir.filter(|dir| fs::create_dir_all(*dir).is_ok()) {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, LOG_FILE_NAME));
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

fn daemon_socket_path(paths: &Paths) -> PathBuf {
    env::var_os(SOCKET_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| paths.socket_path())
}

fn prepare_socket_dir(socket_path: &Path) -> Result<(), String> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| "Socket path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create socket directory: {}", err))
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}
