//! Shader activation seam.
//!
//! The compositor is told what to render by an external script. Its exit
//! status only says whether the request was delivered; whether the compositor
//! survives is observed separately by the crash monitor.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{ReshadeError, Result};
use crate::types::{ParamMap, SHADER_NONE};

/// Environment variable carrying the parameter overrides as JSON.
pub const PARAMS_ENV: &str = "RESHADECK_PARAMS";

/// What to activate.
#[derive(Debug, Clone, PartialEq)]
pub struct Activation {
    pub shader: String,
    pub params: ParamMap,
}

impl Activation {
    pub fn shader(shader: &str, params: ParamMap) -> Self {
        Activation {
            shader: shader.to_string(),
            params,
        }
    }

    /// Clears any active effect.
    pub fn none() -> Self {
        Activation {
            shader: SHADER_NONE.to_string(),
            params: ParamMap::new(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.shader == SHADER_NONE
    }
}

#[async_trait]
pub trait ShaderActivator: Send + Sync {
    /// Applies `activation`. May take seconds.
    async fn activate(&self, activation: &Activation) -> Result<()>;
}

/// Runs `set_shader.sh <shader> <destination_dir>`.
pub struct ScriptActivator {
    script: PathBuf,
    destination_dir: PathBuf,
}

impl ScriptActivator {
    pub fn new(script: &Path, destination_dir: &Path) -> Self {
        ScriptActivator {
            script: script.to_path_buf(),
            destination_dir: destination_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl ShaderActivator for ScriptActivator {
    async fn activate(&self, activation: &Activation) -> Result<()> {
        let params = serde_json::to_string(&activation.params)
            .map_err(|err| ReshadeError::json("serialize activation params", err))?;

        info!(shader = %activation.shader, "Applying shader");
        let output = Command::new(&self.script)
            .arg(&activation.shader)
            .arg(&self.destination_dir)
            // The loader's bundled libraries break the system tools the script calls.
            .env("LD_LIBRARY_PATH", "")
            .env(PARAMS_ENV, params)
            .output()
            .await
            .map_err(|err| ReshadeError::ActivationFailed {
                shader: activation.shader.clone(),
                details: format!("failed to launch {}: {}", self.script.display(), err),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            debug!(stdout = %stdout.trim(), "Activation script output");
        }
        if !stderr.trim().is_empty() {
            warn!(stderr = %stderr.trim(), "Activation script stderr");
        }

        info!(
            shader = %activation.shader,
            status = ?output.status.code(),
            "Apply shader result"
        );
        if output.status.success() {
            Ok(())
        } else {
            Err(ReshadeError::ActivationFailed {
                shader: activation.shader.clone(),
                details: format!("exit status {:?}", output.status.code()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamValue;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("set_shader.sh");
        fs_err::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs_err::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn passes_shader_dir_and_params_to_script() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("record.txt");
        let script = write_script(
            dir.path(),
            &format!(
                "echo \"$1|$2|$RESHADECK_PARAMS|$LD_LIBRARY_PATH\" > {}",
                record.display()
            ),
        );
        let activator = ScriptActivator::new(&script, Path::new("/dest"));
        let mut params = ParamMap::new();
        params.insert("Sharpness".into(), ParamValue::Float(0.5));

        activator
            .activate(&Activation::shader("CAS.fx", params))
            .await
            .expect("activation succeeds");

        let recorded = fs_err::read_to_string(&record).unwrap();
        assert_eq!(recorded.trim(), r#"CAS.fx|/dest|{"Sharpness":0.5}|"#);
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_activation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let activator = ScriptActivator::new(Path::new("/bin/false"), dir.path());
        let err = activator.activate(&Activation::none()).await.unwrap_err();
        assert!(matches!(err, ReshadeError::ActivationFailed { .. }));
    }

    #[tokio::test]
    async fn missing_script_is_an_activation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let activator = ScriptActivator::new(&dir.path().join("absent.sh"), dir.path());
        assert!(activator.activate(&Activation::none()).await.is_err());
    }
}
