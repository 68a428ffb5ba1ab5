//! reshadeck-ctl: command-line client for the Reshadeck daemon.
//!
//! Each subcommand sends one request and prints the response payload as JSON.
//! Useful for poking a running daemon over SSH without the Quick Access menu.

mod client;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use client::DaemonClient;
use reshadeck_core::Paths;
use reshadeck_daemon_protocol::Method;

const SOCKET_ENV: &str = "RESHADECK_SOCKET";

#[derive(Parser)]
#[command(name = "reshadeck-ctl")]
#[command(about = "Control the Reshadeck shader daemon")]
#[command(version)]
struct Cli {
    /// Daemon socket (defaults to $RESHADECK_SOCKET, then the settings directory)
    #[arg(long, global = true, value_name = "PATH")]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        matches!(self, Toggle::On)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Daemon liveness and session flags
    Health,

    /// Report the running game
    Game {
        #[arg(value_name = "APPID")]
        appid: String,
        #[arg(value_name = "NAME", default_value = "")]
        name: String,
    },

    /// List installed shaders
    List,

    /// Show the selected shader
    Current,

    /// Select a shader ("None" clears the effect)
    Set {
        #[arg(value_name = "SHADER")]
        shader: String,
    },

    /// Show parameters of the selected shader
    Params,

    /// Change one parameter of the selected shader
    SetParam {
        #[arg(value_name = "NAME")]
        name: String,
        /// JSON scalar; anything that is not JSON is sent as text
        #[arg(value_name = "VALUE")]
        value: String,
    },

    /// Restore default parameters
    Reset,

    /// Save pending edits and re-apply the shader
    Apply,

    /// Show or set the master switch
    Master {
        #[arg(value_enum)]
        state: Option<Toggle>,
    },

    /// Show or set per-game mode for the running game
    PerGame {
        #[arg(value_enum)]
        state: Option<Toggle>,
    },

    /// Show or set the UI category
    Category {
        #[arg(value_name = "CATEGORY")]
        category: Option<String>,
    },

    /// Whether a crash disabled shaders
    Crash,

    /// Show the active configuration scope
    Scope,
}

impl Commands {
    fn to_request(&self) -> (Method, Option<Value>) {
        match self {
            Commands::Health => (Method::GetHealth, None),
            Commands::Game { appid, name } => (
                Method::SetCurrentGameInfo,
                Some(json!({"appid": appid, "appname": name})),
            ),
            Commands::List => (Method::GetShaderList, None),
            Commands::Current => (Method::GetCurrentShader, None),
            Commands::Set { shader } => (Method::SetShader, Some(json!({"shader_name": shader}))),
            Commands::Params => (Method::GetShaderParams, None),
            Commands::SetParam { name, value } => (
                Method::SetShaderParam,
                Some(json!({"name": name, "value": parse_value(value)})),
            ),
            Commands::Reset => (Method::ResetShaderParams, None),
            Commands::Apply => (Method::ApplyShader, None),
            Commands::Master { state: None } => (Method::GetMasterEnabled, None),
            Commands::Master { state: Some(state) } => (
                Method::SetMasterEnabled,
                Some(json!({"enabled": state.enabled()})),
            ),
            Commands::PerGame { state: None } => (Method::GetPerGameMode, None),
            Commands::PerGame { state: Some(state) } => (
                Method::SetPerGameMode,
                Some(json!({"enabled": state.enabled()})),
            ),
            Commands::Category { category: None } => (Method::GetActiveCategory, None),
            Commands::Category {
                category: Some(category),
            } => (
                Method::SetActiveCategory,
                Some(json!({"category": category})),
            ),
            Commands::Crash => (Method::GetCrashDetected, None),
            Commands::Scope => (Method::GetScopeInfo, None),
        }
    }
}

/// `0.5` → number, `true` → bool, `"x"` or `x` → string.
fn parse_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}

fn resolve_socket(flag: Option<PathBuf>) -> Result<PathBuf, String> {
    if let Some(path) = flag {
        return Ok(path);
    }
    if let Some(path) = std::env::var_os(SOCKET_ENV) {
        return Ok(PathBuf::from(path));
    }
    Paths::from_env()
        .map(|paths| paths.socket_path())
        .map_err(|err| err.to_string())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let socket = match resolve_socket(cli.socket) {
        Ok(socket) => socket,
        Err(err) => {
            tracing::error!(error = %err, "Failed to resolve daemon socket");
            std::process::exit(2);
        }
    };
    tracing::debug!(socket = %socket.display(), "Using daemon socket");

    let (method, params) = cli.command.to_request();
    match DaemonClient::new(&socket).call(method, params) {
        Ok(data) => match serde_json::to_string_pretty(&data) {
            Ok(text) => println!("{}", text),
            Err(err) => {
                tracing::error!(error = %err, "Failed to format response");
                std::process::exit(1);
            }
        },
        Err(err) => {
            eprintln!("reshadeck-ctl: {}", err);
            std::process::exit(1);
        }
    }
}
