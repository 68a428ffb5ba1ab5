//! Error types for reshadeck-core operations.
//!
//! Most of these never reach an RPC caller: the engine logs store and ledger
//! failures and carries on with defaults. They exist so the lower layers can
//! still say precisely what went wrong.

use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// Core Error
// ═══════════════════════════════════════════════════════════════════════════════

/// All errors that can occur in reshadeck-core operations.
#[derive(Debug, thiserror::Error)]
pub enum ReshadeError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Settings directory could not be resolved")]
    SettingsDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Unsupported config schema version {found} (expected <= {supported})")]
    UnsupportedSchema { found: u64, supported: u32 },

    // ─────────────────────────────────────────────────────────────────────
    // Shader Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("No shader is selected")]
    NoShaderSelected,

    #[error("Activation failed for {shader}: {details}")]
    ActivationFailed { shader: String, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ReshadeError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ReshadeError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        ReshadeError::Json {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using ReshadeError.
pub type Result<T> = std::result::Result<T, ReshadeError>;
