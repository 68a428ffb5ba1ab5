//! Paths and runtime tunables.
//!
//! Paths come from the plugin loader's environment (`DECKY_*`), falling back to
//! the loader's default layout under the home directory. Tunables live in an
//! optional `reshadeck.toml` next to `config.json`; a missing file means defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ReshadeError, Result};

pub const PLUGIN_NAME: &str = "reshadeck";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const CRASH_FILE_NAME: &str = "crash.json";
pub const RUNTIME_CONFIG_FILE_NAME: &str = "reshadeck.toml";
pub const SOCKET_NAME: &str = "reshadeck.sock";
pub const ACTIVATION_SCRIPT: &str = "set_shader.sh";

const SETTINGS_DIR_ENV: &str = "DECKY_PLUGIN_SETTINGS_DIR";
const PLUGIN_DIR_ENV: &str = "DECKY_PLUGIN_DIR";
const USER_HOME_ENV: &str = "DECKY_USER_HOME";
const LOG_DIR_ENV: &str = "DECKY_PLUGIN_LOG_DIR";

/// Filesystem locations the plugin works with.
#[derive(Debug, Clone)]
pub struct Paths {
    pub settings_dir: PathBuf,
    pub plugin_dir: PathBuf,
    /// Where gamescope looks for ReShade effects.
    pub destination_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl Paths {
    /// Resolves paths from the loader environment.
    pub fn from_env() -> Result<Self> {
        let home = dirs::home_dir();
        let user_home = env::var_os(USER_HOME_ENV)
            .map(PathBuf::from)
            .or_else(|| home.clone())
            .ok_or(ReshadeError::SettingsDirNotFound)?;

        let settings_dir = env::var_os(SETTINGS_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| user_home.join("homebrew").join("settings").join(PLUGIN_NAME));
        let plugin_dir = env::var_os(PLUGIN_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| user_home.join("homebrew").join("plugins").join(PLUGIN_NAME));
        let log_dir = env::var_os(LOG_DIR_ENV).map(PathBuf::from);

        Ok(Self::with_roots(&settings_dir, &plugin_dir, &user_home, log_dir))
    }

    pub fn with_roots(
        settings_dir: &Path,
        plugin_dir: &Path,
        user_home: &Path,
        log_dir: Option<PathBuf>,
    ) -> Self {
        Paths {
            settings_dir: settings_dir.to_path_buf(),
            plugin_dir: plugin_dir.to_path_buf(),
            destination_dir: user_home
                .join(".local")
                .join("share")
                .join("gamescope")
                .join("reshade")
                .join("Shaders"),
            log_dir,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.settings_dir.join(CONFIG_FILE_NAME)
    }

    pub fn crash_file(&self) -> PathBuf {
        self.settings_dir.join(CRASH_FILE_NAME)
    }

    pub fn runtime_config_file(&self) -> PathBuf {
        self.settings_dir.join(RUNTIME_CONFIG_FILE_NAME)
    }

    pub fn socket_path(&self) -> PathBuf {
        self.settings_dir.join(SOCKET_NAME)
    }

    pub fn shaders_dir(&self) -> PathBuf {
        self.plugin_dir.join("shaders")
    }

    pub fn activation_script(&self) -> PathBuf {
        self.shaders_dir().join(ACTIVATION_SCRIPT)
    }
}

/// Tunables read from `reshadeck.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub debounce_secs: f64,
    pub monitor_poll_secs: f64,
    pub monitor_window_secs: f64,
    pub canary_recency_secs: f64,
    pub startup_delay_secs: f64,
    pub coredump_dir: PathBuf,
    pub coredump_pattern: String,
    /// External metadata parser, invoked as `<command> <shader-path>`.
    pub parser_command: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            debounce_secs: 5.0,
            monitor_poll_secs: 2.0,
            monitor_window_secs: 60.0,
            canary_recency_secs: 300.0,
            startup_delay_secs: 5.0,
            coredump_dir: PathBuf::from("/var/lib/systemd/coredump"),
            coredump_pattern: r"^core\.gamescope-wl\..*\.zst$".to_string(),
            parser_command: None,
        }
    }
}

impl RuntimeConfig {
    pub fn timings(&self) -> Timings {
        Timings {
            debounce: secs(self.debounce_secs),
            monitor_poll: secs(self.monitor_poll_secs),
            monitor_window: secs(self.monitor_window_secs),
            canary_recency_secs: self.canary_recency_secs.max(0.0),
            startup_delay: secs(self.startup_delay_secs),
        }
    }
}

/// Loads tunables, returning defaults when the file does not exist.
pub fn load_runtime_config(path: &Path) -> Result<RuntimeConfig> {
    if !path.exists() {
        return Ok(RuntimeConfig::default());
    }

    let content = fs_err::read_to_string(path)
        .map_err(|err| ReshadeError::io(format!("read {}", path.display()), err))?;
    toml::from_str::<RuntimeConfig>(&content).map_err(|err| ReshadeError::ConfigMalformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}

/// Timing knobs consumed by the engine, the monitor and the debouncer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timings {
    pub debounce: Duration,
    pub monitor_poll: Duration,
    pub monitor_window: Duration,
    /// How far back the startup canary looks, in epoch seconds.
    pub canary_recency_secs: f64,
    pub startup_delay: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        RuntimeConfig::default().timings()
    }
}

fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}
