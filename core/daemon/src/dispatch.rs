//! Maps protocol methods onto engine operations.

use serde::Serialize;
use serde_json::{json, Value};

use reshadeck_core::{list_shaders, Engine, ParamValue, Paths, ReshadeError, ScopeChange};
use reshadeck_daemon_protocol::{
    parse_params, CategoryParams, EnabledParams, ErrorInfo, GameInfoParams, Method, Request,
    Response, ShaderParamParams, ShaderParams, ERROR_INTERNAL, ERROR_NO_SHADER_SELECTED,
    ERROR_PROTOCOL_MISMATCH, PROTOCOL_VERSION,
};

pub struct DaemonContext {
    engine: Engine,
    paths: Paths,
}

impl DaemonContext {
    pub fn new(engine: Engine, paths: Paths) -> Self {
        DaemonContext { engine, paths }
    }
}

pub async fn handle_request(request: Request, context: &DaemonContext) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            ERROR_PROTOCOL_MISMATCH,
            "unsupported protocol version",
        );
    }

    let id = request.id;
    match dispatch(request.method, request.params, context).await {
        Ok(data) => Response::ok(id, data),
        Err(err) => Response::error_with_info(id, err),
    }
}

async fn dispatch(
    method: Method,
    params: Option<Value>,
    context: &DaemonContext,
) -> Result<Value, ErrorInfo> {
    let engine = &context.engine;
    match method {
        Method::GetHealth => Ok(json!({
            "status": "ok",
            "pid": std::process::id(),
            "version": env!("CARGO_PKG_VERSION"),
            "protocol_version": PROTOCOL_VERSION,
            "master_enabled": engine.master_enabled(),
            "crash_detected": engine.crash_detected(),
            "crash_monitor_active": engine.crash_monitor_active(),
            "edit_pending": engine.edit_pending(),
            "config_writes": engine.store().write_count(),
            "crash_count": engine.ledger().read().count,
        })),
        Method::SetCurrentGameInfo => {
            let parsed: GameInfoParams = parse_params(params)?;
            let change = engine
                .on_scope_changed(&parsed.app_id(), &parsed.appname)
                .await;
            Ok(json!({
                "changed": change_label(change),
                "scope": to_value(engine.scope_info())?,
            }))
        }
        Method::GetShaderList => Ok(json!(list_shaders(&context.paths.destination_dir))),
        Method::GetCurrentShader => Ok(json!(engine.active_shader())),
        Method::SetShader => {
            let parsed: ShaderParams = parse_params(params)?;
            engine.on_shader_selected(&parsed.shader_name).await;
            Ok(json!(engine.active_shader()))
        }
        Method::GetShaderParams => to_value(engine.shader_params().await),
        Method::SetShaderParam => {
            let parsed: ShaderParamParams = parse_params(params)?;
            let value = ParamValue::from_json(&parsed.value)
                .ok_or_else(|| ErrorInfo::new("invalid_value", "value must be a scalar"))?;
            let stored = engine
                .on_parameter_changed(&parsed.name, value)
                .await
                .map_err(engine_error)?;
            Ok(json!({ "name": parsed.name, "value": to_value(stored)? }))
        }
        Method::ResetShaderParams => {
            let params = engine.reset_parameters().await.map_err(engine_error)?;
            to_value(params)
        }
        Method::ApplyShader => {
            engine.apply().await;
            Ok(json!(engine.active_shader()))
        }
        Method::GetMasterEnabled => Ok(json!(engine.master_enabled())),
        Method::SetMasterEnabled => {
            let parsed: EnabledParams = parse_params(params)?;
            engine.on_master_switch_changed(parsed.enabled).await;
            Ok(json!(engine.master_enabled()))
        }
        Method::GetPerGameMode => Ok(json!(engine.per_game_mode())),
        Method::SetPerGameMode => {
            let parsed: EnabledParams = parse_params(params)?;
            engine.on_per_game_mode_changed(parsed.enabled).await;
            to_value(engine.snapshot())
        }
        Method::GetActiveCategory => Ok(json!(engine.active_category())),
        Method::SetActiveCategory => {
            let parsed: CategoryParams = parse_params(params)?;
            engine.set_active_category(&parsed.category);
            Ok(json!(engine.active_category()))
        }
        Method::GetCrashDetected => Ok(json!(engine.crash_detected())),
        Method::GetScopeInfo => to_value(engine.scope_info()),
    }
}

fn change_label(change: ScopeChange) -> &'static str {
    match change {
        ScopeChange::Unchanged => "unchanged",
        ScopeChange::Renamed => "renamed",
        ScopeChange::Switched => "switched",
    }
}

fn engine_error(err: ReshadeError) -> ErrorInfo {
    match err {
        ReshadeError::NoShaderSelected => ErrorInfo::new(ERROR_NO_SHADER_SELECTED, err.to_string()),
        other => {
            tracing::warn!(error = %other, "Engine operation failed");
            ErrorInfo::new(ERROR_INTERNAL, other.to_string())
        }
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, ErrorInfo> {
    serde_json::to_value(value).map_err(|err| {
        ErrorInfo::new(
            "serialization_error",
            format!("Failed to serialize response: {}", err),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reshadeck_core::{
        Collaborators, CommandParameterProvider, ConfigStore, CoredumpDirectory, CrashLedger,
        RuntimeConfig, ScriptActivator, SystemClock,
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> DaemonContext {
        let root = dir.path();
        let paths = Paths::with_roots(
            &root.join("settings"),
            &root.join("plugin"),
            &root.join("home"),
            None,
        );
        let dumps = root.join("dumps");
        std::fs::create_dir_all(&dumps).unwrap();
        let config = RuntimeConfig::default();
        let engine = Engine::new(
            Collaborators {
                store: ConfigStore::new(&paths.config_file()),
                ledger: CrashLedger::new(&paths.crash_file()),
                activator: Arc::new(ScriptActivator::new(
                    &paths.activation_script(),
                    &paths.destination_dir,
                )),
                params: Arc::new(CommandParameterProvider::new(None, Vec::new())),
                crash_source: Arc::new(
                    CoredumpDirectory::new(&dumps, &config.coredump_pattern).unwrap(),
                ),
                clock: Arc::new(SystemClock),
            },
            config.timings(),
        );
        DaemonContext::new(engine, paths)
    }

    fn request(method: Method, params: Option<Value>) -> Request {
        Request::new(method, params)
    }

    #[tokio::test]
    async fn rejects_protocol_mismatch() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let mut req = request(Method::GetHealth, None);
        req.protocol_version = PROTOCOL_VERSION + 1;
        req.id = Some("r1".to_string());

        let response = handle_request(req, &ctx).await;
        assert!(!response.ok);
        assert_eq!(response.id.as_deref(), Some("r1"));
        assert_eq!(response.error.unwrap().code, ERROR_PROTOCOL_MISMATCH);
    }

    #[tokio::test]
    async fn health_reports_session_flags() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let response = handle_request(request(Method::GetHealth, None), &ctx).await;
        assert!(response.ok);
        let data = response.data.unwrap();
        assert_eq!(data["status"], "ok");
        assert_eq!(data["master_enabled"], true);
        assert_eq!(data["crash_count"], 0);
        assert_eq!(data["config_writes"], 0);
    }

    #[tokio::test]
    async fn param_edit_without_shader_is_reported() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let response = handle_request(
            request(
                Method::SetShaderParam,
                Some(json!({"name": "Sharpness", "value": 0.4})),
            ),
            &ctx,
        )
        .await;
        assert!(!response.ok);
        assert_eq!(response.error.unwrap().code, ERROR_NO_SHADER_SELECTED);
    }

    #[tokio::test]
    async fn invalid_params_never_reach_the_engine() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let response = handle_request(
            request(Method::SetShader, Some(json!({"shader_name": "../x.fx"}))),
            &ctx,
        )
        .await;
        assert_eq!(response.error.unwrap().code, "invalid_shader");
        assert_eq!(ctx.engine.store().write_count(), 0);
    }

    #[tokio::test]
    async fn category_change_is_saved() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let response = handle_request(
            request(Method::SetActiveCategory, Some(json!({"category": "Color"}))),
            &ctx,
        )
        .await;
        assert_eq!(response.data.unwrap(), json!("Color"));
        let response = handle_request(request(Method::GetActiveCategory, None), &ctx).await;
        assert_eq!(response.data.unwrap(), json!("Color"));
        assert_eq!(ctx.engine.store().write_count(), 1);
    }

    #[tokio::test]
    async fn scope_info_defaults_to_desktop_global() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let response = handle_request(request(Method::GetScopeInfo, None), &ctx).await;
        let data = response.data.unwrap();
        assert_eq!(data["app_id"], "desktop");
        assert_eq!(data["config_key"], "_global");
        assert_eq!(data["per_game_mode"], false);
    }
}
