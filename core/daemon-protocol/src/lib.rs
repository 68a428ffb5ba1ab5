//! IPC protocol types and validation for reshadeck-daemon.
//!
//! This crate is shared by the daemon and its clients to prevent schema drift.
//! The daemon remains the authority on validation, but clients can reuse the
//! same types to construct valid requests.
//!
//! One request per connection: a JSON object terminated by `\n`, answered by
//! one JSON response terminated by `\n`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

pub const ERROR_PROTOCOL_MISMATCH: &str = "protocol_mismatch";
pub const ERROR_TOO_MANY_CONNECTIONS: &str = "too_many_connections";
pub const ERROR_NO_SHADER_SELECTED: &str = "no_shader_selected";
pub const ERROR_INTERNAL: &str = "internal_error";

const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    SetCurrentGameInfo,
    GetShaderList,
    GetCurrentShader,
    SetShader,
    GetShaderParams,
    SetShaderParam,
    ResetShaderParams,
    ApplyShader,
    GetMasterEnabled,
    SetMasterEnabled,
    GetPerGameMode,
    SetPerGameMode,
    GetActiveCategory,
    SetActiveCategory,
    GetCrashDetected,
    GetScopeInfo,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(method: Method, params: Option<Value>) -> Self {
        Request {
            protocol_version: PROTOCOL_VERSION,
            method,
            id: None,
            params,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Method parameters
// ═══════════════════════════════════════════════════════════════════════════════

/// Parameters that can check themselves after decoding.
pub trait Validate {
    fn validate(&self) -> Result<(), ErrorInfo>;
}

/// `set_current_game_info`. The UI sends `appid` as a string or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameInfoParams {
    pub appid: Value,
    #[serde(default)]
    pub appname: String,
}

impl GameInfoParams {
    /// `appid` as text. Validation guarantees it is a string or a number.
    pub fn app_id(&self) -> String {
        match &self.appid {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl Validate for GameInfoParams {
    fn validate(&self) -> Result<(), ErrorInfo> {
        match &self.appid {
            Value::String(s) if s.len() <= MAX_NAME_LEN => {}
            Value::Number(_) => {}
            _ => {
                return Err(ErrorInfo::new(
                    "invalid_appid",
                    "appid must be a string or a number",
                ))
            }
        }
        if self.appname.len() > MAX_NAME_LEN {
            return Err(ErrorInfo::new("invalid_appname", "appname is too long"));
        }
        Ok(())
    }
}

/// `set_shader`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShaderParams {
    pub shader_name: String,
}

impl Validate for ShaderParams {
    fn validate(&self) -> Result<(), ErrorInfo> {
        require_name(&self.shader_name, "shader_name")?;
        if self.shader_name.contains('/') || self.shader_name.starts_with('.') {
            return Err(ErrorInfo::new(
                "invalid_shader",
                "shader_name must be a file name in the shader directory",
            ));
        }
        Ok(())
    }
}

/// `set_shader_param`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShaderParamParams {
    pub name: String,
    pub value: Value,
}

impl Validate for ShaderParamParams {
    fn validate(&self) -> Result<(), ErrorInfo> {
        require_name(&self.name, "name")?;
        match self.value {
            Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(()),
            _ => Err(ErrorInfo::new(
                "invalid_value",
                "value must be a boolean, number or string",
            )),
        }
    }
}

/// `set_master_enabled` and `set_per_game_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnabledParams {
    pub enabled: bool,
}

impl Validate for EnabledParams {
    fn validate(&self) -> Result<(), ErrorInfo> {
        Ok(())
    }
}

/// `set_active_category`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryParams {
    pub category: String,
}

impl Validate for CategoryParams {
    fn validate(&self) -> Result<(), ErrorInfo> {
        require_name(&self.category, "category")
    }
}

/// Decodes and validates method parameters.
pub fn parse_params<T>(params: Option<Value>) -> Result<T, ErrorInfo>
where
    T: DeserializeOwned + Validate,
{
    let params = params.ok_or_else(|| ErrorInfo::new("invalid_params", "params are required"))?;
    if !params.is_object() {
        return Err(ErrorInfo::new("invalid_params", "params must be an object"));
    }
    let parsed: T = serde_json::from_value(params)
        .map_err(|err| ErrorInfo::new("invalid_params", format!("invalid params: {}", err)))?;
    parsed.validate()?;
    Ok(parsed)
}

fn require_name(value: &str, field: &str) -> Result<(), ErrorInfo> {
    if value.trim().is_empty() {
        return Err(ErrorInfo::new(
            "missing_field",
            format!("{} is required", field),
        ));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(ErrorInfo::new(
            "invalid_params",
            format!("{} must be {} bytes or fewer", field, MAX_NAME_LEN),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_names_are_snake_case() {
        let request: Request = serde_json::from_value(json!({
            "protocol_version": 1,
            "method": "set_shader_param",
            "params": {"name": "Sharpness", "value": 0.5}
        }))
        .unwrap();
        assert_eq!(request.method, Method::SetShaderParam);
    }

    #[test]
    fn rejects_unknown_request_fields() {
        let result: Result<Request, _> = serde_json::from_value(json!({
            "protocol_version": 1,
            "method": "get_health",
            "extra": true
        }));
        assert!(result.is_err());
    }

    #[test]
    fn game_info_accepts_numeric_appid() {
        let parsed: GameInfoParams =
            parse_params(Some(json!({"appid": 1091500, "appname": "Cyberpunk 2077"}))).unwrap();
        assert_eq!(parsed.app_id(), "1091500");

        let parsed: GameInfoParams = parse_params(Some(json!({"appid": "730"}))).unwrap();
        assert_eq!(parsed.app_id(), "730");
        assert_eq!(parsed.appname, "");
    }

    #[test]
    fn game_info_rejects_structured_appid() {
        let err = parse_params::<GameInfoParams>(Some(json!({"appid": {"id": 1}}))).unwrap_err();
        assert_eq!(err.code, "invalid_appid");
    }

    #[test]
    fn shader_name_must_be_a_plain_file_name() {
        assert!(parse_params::<ShaderParams>(Some(json!({"shader_name": "CAS.fx"}))).is_ok());
        assert!(parse_params::<ShaderParams>(Some(json!({"shader_name": "None"}))).is_ok());
        for bad in ["", "../etc/passwd", ".reshadeck.fx"] {
            assert!(
                parse_params::<ShaderParams>(Some(json!({"shader_name": bad}))).is_err(),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn param_value_must_be_scalar() {
        assert!(
            parse_params::<ShaderParamParams>(Some(json!({"name": "Sharpness", "value": "0.5"})))
                .is_ok()
        );
        let err = parse_params::<ShaderParamParams>(Some(json!({"name": "Sharpness", "value": [1]})))
            .unwrap_err();
        assert_eq!(err.code, "invalid_value");
    }

    #[test]
    fn missing_params_are_rejected() {
        let err = parse_params::<EnabledParams>(None).unwrap_err();
        assert_eq!(err.code, "invalid_params");
        let err = parse_params::<EnabledParams>(Some(json!(true))).unwrap_err();
        assert_eq!(err.code, "invalid_params");
        let err = parse_params::<CategoryParams>(Some(json!({"category": " "}))).unwrap_err();
        assert_eq!(err.code, "missing_field");
    }
}
