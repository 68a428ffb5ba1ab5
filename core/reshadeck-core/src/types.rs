//! Core types shared by the store, the engine and the RPC layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Scope key for the process-wide configuration slot.
pub const GLOBAL_SCOPE: &str = "_global";

/// Canonical app id for "no game running" (Steam UI, desktop, boot).
pub const DESKTOP_APP_ID: &str = "desktop";

/// Sentinel shader id meaning "no effect". Activating it clears the compositor.
pub const SHADER_NONE: &str = "None";

pub const DEFAULT_CATEGORY: &str = "Default";

/// Display name written into the global scope entry.
pub const GLOBAL_DISPLAY_NAME: &str = "Global";

/// Parameter name → current value for one shader.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Shader id → parameter overrides.
pub type ShaderParams = BTreeMap<String, ParamMap>;

// -----------------------------------------------------------------------------
// Parameter values & metadata
// -----------------------------------------------------------------------------

/// Declared uniform type of a tunable shader parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Float,
    Bool,
    Int,
}

/// A parameter value as it travels through RPC and the config document.
///
/// `Text` only survives when no metadata was available to coerce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Builds a value from an arbitrary JSON scalar. Arrays, objects and null
    /// are not parameter values.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(ParamValue::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(ParamValue::Int(i)),
                None => n.as_f64().map(ParamValue::Float),
            },
            serde_json::Value::String(s) => Some(ParamValue::Text(s.clone())),
            _ => None,
        }
    }

    /// Converts the value to the declared type. Unparseable text is left as-is.
    pub fn coerce(self, ty: ParamType) -> ParamValue {
        match (ty, self) {
            (ParamType::Float, ParamValue::Float(f)) => ParamValue::Float(f),
            (ParamType::Float, ParamValue::Int(i)) => ParamValue::Float(i as f64),
            (ParamType::Float, ParamValue::Bool(b)) => ParamValue::Float(if b { 1.0 } else { 0.0 }),
            (ParamType::Float, ParamValue::Text(s)) => match s.trim().parse::<f64>() {
                Ok(f) => ParamValue::Float(f),
                Err(_) => ParamValue::Text(s),
            },

            (ParamType::Int, ParamValue::Int(i)) => ParamValue::Int(i),
            (ParamType::Int, ParamValue::Float(f)) => ParamValue::Int(f.trunc() as i64),
            (ParamType::Int, ParamValue::Bool(b)) => ParamValue::Int(i64::from(b)),
            (ParamType::Int, ParamValue::Text(s)) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    ParamValue::Int(i)
                } else if let Ok(f) = trimmed.parse::<f64>() {
                    ParamValue::Int(f.trunc() as i64)
                } else {
                    ParamValue::Text(s)
                }
            }

            (ParamType::Bool, ParamValue::Bool(b)) => ParamValue::Bool(b),
            (ParamType::Bool, ParamValue::Int(i)) => ParamValue::Bool(i != 0),
            (ParamType::Bool, ParamValue::Float(f)) => ParamValue::Bool(f != 0.0),
            (ParamType::Bool, ParamValue::Text(s)) => match s.trim().to_ascii_lowercase().as_str()
            {
                "true" | "1" | "yes" | "on" => ParamValue::Bool(true),
                "false" | "0" | "no" | "off" | "" => ParamValue::Bool(false),
                _ => ParamValue::Text(s),
            },
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(v) => write!(f, "{:.6}", v),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

/// Metadata for one tunable uniform, as produced by the parameter provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    pub default: ParamValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_items: Option<Vec<String>>,
}

/// Metadata with the value currently in effect overlaid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamView {
    #[serde(flatten)]
    pub meta: ParamMeta,
    pub value: ParamValue,
}

// -----------------------------------------------------------------------------
// Configuration entries
// -----------------------------------------------------------------------------

/// Persisted configuration for one scope key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_shader")]
    pub shader: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub per_game: bool,
    #[serde(default)]
    pub params: ShaderParams,
}

impl Default for ConfigEntry {
    fn default() -> Self {
        ConfigEntry {
            display_name: String::new(),
            shader: default_shader(),
            category: default_category(),
            per_game: false,
            params: ShaderParams::new(),
        }
    }
}

fn default_shader() -> String {
    SHADER_NONE.to_string()
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

// -----------------------------------------------------------------------------
// Scope resolution
// -----------------------------------------------------------------------------

/// Maps the "no real app" identifiers the UI reports onto [`DESKTOP_APP_ID`].
pub fn normalize_app_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let is_zero = trimmed.parse::<f64>().map(|n| n == 0.0).unwrap_or(false);

    if trimmed.is_empty()
        || is_zero
        || matches!(lowered.as_str(), "unknown" | "undefined" | "null" | "none")
    {
        DESKTOP_APP_ID.to_string()
    } else {
        trimmed.to_string()
    }
}

/// True for names the UI shows while an app is still starting up.
pub fn is_loading_placeholder(name: &str) -> bool {
    let lowered = name.trim().to_lowercase();
    lowered.is_empty() || lowered.starts_with("loading")
}

/// The scope key that is active for a given mode/app combination.
pub fn config_key(per_game_mode: bool, app_id: &str) -> &str {
    if per_game_mode {
        app_id
    } else {
        GLOBAL_SCOPE
    }
}
