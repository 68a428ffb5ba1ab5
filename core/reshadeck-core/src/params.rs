//! Shader parameter metadata.
//!
//! Reading `.fx` uniforms is delegated to an external parser. The core only
//! consumes its output: a JSON list of [`ParamMeta`]. Every failure degrades to
//! an empty list, which turns off type coercion for that shader.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::types::{ParamMeta, SHADER_NONE};

#[async_trait]
pub trait ParameterProvider: Send + Sync {
    /// Tunable parameters of `shader`. Idempotent, side-effect free.
    async fn parameters(&self, shader: &str) -> Vec<ParamMeta>;
}

/// Runs `<command> <shader-path>` and decodes its stdout.
pub struct CommandParameterProvider {
    command: Option<PathBuf>,
    search_dirs: Vec<PathBuf>,
}

impl CommandParameterProvider {
    /// `search_dirs` are tried in order; pristine copies should come first so
    /// defaults are never read from a patched file.
    pub fn new(command: Option<&Path>, search_dirs: Vec<PathBuf>) -> Self {
        CommandParameterProvider {
            command: command.map(Path::to_path_buf),
            search_dirs,
        }
    }

    fn locate(&self, shader: &str) -> Option<PathBuf> {
        self.search_dirs
            .iter()
            .map(|dir| dir.join(shader))
            .find(|path| path.is_file())
    }
}

#[async_trait]
impl ParameterProvider for CommandParameterProvider {
    async fn parameters(&self, shader: &str) -> Vec<ParamMeta> {
        if shader == SHADER_NONE || shader.contains('/') {
            return Vec::new();
        }
        let Some(command) = self.command.as_ref() else {
            debug!(shader, "No parameter parser configured");
            return Vec::new();
        };
        let Some(path) = self.locate(shader) else {
            warn!(shader, "Shader file not found");
            return Vec::new();
        };

        let output = match Command::new(command).arg(&path).output().await {
            Ok(output) => output,
            Err(err) => {
                warn!(error = %err, command = %command.display(), "Failed to run parameter parser");
                return Vec::new();
            }
        };
        if !output.status.success() {
            warn!(shader, status = ?output.status.code(), "Parameter parser failed");
            return Vec::new();
        }

        match serde_json::from_slice::<Vec<ParamMeta>>(&output.stdout) {
            Ok(params) => params,
            Err(err) => {
                warn!(shader, error = %err, "Parameter parser produced invalid JSON");
                Vec::new()
            }
        }
    }
}
