//! In-memory session state.

use serde::Serialize;
use std::collections::HashMap;

use crate::activator::Activation;
use crate::store::{LoadedScope, ScopeWrite};
use crate::types::{
    config_key, ParamMap, ParamMeta, ShaderParams, DEFAULT_CATEGORY, DESKTOP_APP_ID, SHADER_NONE,
};

/// Everything the engine knows about the running session.
///
/// Background task handles live next to this in the engine, in their own
/// [`TaskSlot`](crate::supervisor::TaskSlot)s.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub master_switch: bool,
    pub active_shader: String,
    pub shader_parameters: ShaderParams,
    /// Transient UI flag, set by crash detection and cleared by the master switch.
    pub crash_detected: bool,
    pub per_game_mode: bool,
    pub current_app_id: String,
    pub display_name: String,
    pub active_category: String,
    /// Provider output per shader, used for coercion and defaults.
    pub params_meta: HashMap<String, Vec<ParamMeta>>,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState {
            master_switch: true,
            active_shader: SHADER_NONE.to_string(),
            shader_parameters: ShaderParams::new(),
            crash_detected: false,
            per_game_mode: false,
            current_app_id: DESKTOP_APP_ID.to_string(),
            display_name: String::new(),
            active_category: DEFAULT_CATEGORY.to_string(),
            params_meta: HashMap::new(),
        }
    }
}

impl SessionState {
    pub fn config_key(&self) -> &str {
        config_key(self.per_game_mode, &self.current_app_id)
    }

    pub fn has_shader(&self) -> bool {
        self.active_shader != SHADER_NONE
    }

    /// Replaces scope-derived fields with a freshly loaded entry.
    pub fn apply_loaded(&mut self, loaded: LoadedScope) {
        self.per_game_mode = loaded.per_game;
        self.master_switch = loaded.master_enabled;
        self.active_shader = loaded.entry.shader;
        self.active_category = loaded.entry.category;
        self.shader_parameters = loaded.entry.params;
    }

    /// Overrides of the active shader.
    pub fn active_params(&self) -> ParamMap {
        self.shader_parameters
            .get(&self.active_shader)
            .cloned()
            .unwrap_or_default()
    }

    pub fn activation(&self) -> Activation {
        if self.has_shader() {
            Activation::shader(&self.active_shader, self.active_params())
        } else {
            Activation::none()
        }
    }

    pub fn scope_write(&self) -> ScopeWrite {
        ScopeWrite {
            app_id: self.current_app_id.clone(),
            display_name: self.display_name.clone(),
            per_game_mode: self.per_game_mode,
            shader: self.active_shader.clone(),
            category: self.active_category.clone(),
            params: self.active_params(),
            master_enabled: self.master_switch,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            master_enabled: self.master_switch,
            active_shader: self.active_shader.clone(),
            active_category: self.active_category.clone(),
            crash_detected: self.crash_detected,
            params: self.active_params(),
            scope: self.scope_info(),
        }
    }

    pub fn scope_info(&self) -> ScopeInfo {
        ScopeInfo {
            app_id: self.current_app_id.clone(),
            display_name: self.display_name.clone(),
            per_game_mode: self.per_game_mode,
            config_key: self.config_key().to_string(),
        }
    }
}

/// Which scope is active and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeInfo {
    pub app_id: String,
    pub display_name: String,
    pub per_game_mode: bool,
    pub config_key: String,
}

/// Read-only view of the session for RPC callers and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub master_enabled: bool,
    pub active_shader: String,
    pub active_category: String,
    pub crash_detected: bool,
    pub params: ParamMap,
    pub scope: ScopeInfo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfigEntry, ParamValue, GLOBAL_SCOPE};

    #[test]
    fn scope_write_carries_only_active_shader_params() {
        let mut state = SessionState {
            active_shader: "CAS.fx".into(),
            ..SessionState::default()
        };
        state
            .shader_parameters
            .entry("CAS.fx".into())
            .or_default()
            .insert("Sharpness".into(), ParamValue::Float(0.7));
        state
            .shader_parameters
            .entry("Vibrant.fx".into())
            .or_default()
            .insert("Saturation".into(), ParamValue::Float(1.2));

        let write = state.scope_write();
        assert_eq!(write.shader, "CAS.fx");
        assert_eq!(write.params.len(), 1);
        assert_eq!(write.params["Sharpness"], ParamValue::Float(0.7));
    }

    #[test]
    fn none_shader_activates_nothing() {
        let state = SessionState::default();
        assert!(state.activation().is_none());
        assert_eq!(state.config_key(), GLOBAL_SCOPE);
    }

    #[test]
    fn apply_loaded_replaces_scope_fields() {
        let mut state = SessionState {
            crash_detected: true,
            display_name: "Steam".into(),
            ..SessionState::default()
        };
        state.apply_loaded(LoadedScope {
            per_game: true,
            entry: ConfigEntry {
                shader: "Vibrant.fx".into(),
                category: "Community".into(),
                ..ConfigEntry::default()
            },
            master_enabled: false,
        });

        assert!(state.per_game_mode);
        assert!(!state.master_switch);
        assert_eq!(state.active_shader, "Vibrant.fx");
        assert_eq!(state.active_category, "Community");
        assert_eq!(state.config_key(), DESKTOP_APP_ID);
        // Not scope-derived.
        assert!(state.crash_detected);
        assert_eq!(state.display_name, "Steam");
    }
}
