//! The reconciliation engine.
//!
//! Every UI event lands here as one async handler. Handlers mutate the session
//! under a short-lived lock, persist synchronously, and suspend only on the
//! activator. Two handlers may interleave at that suspension point; the only
//! coordination is that each handler cancels the background work it
//! supersedes before touching state.
//!
//! # Event summary
//!
//! | Event | Persist | Activate | Crash monitor |
//! |-------|---------|----------|---------------|
//! | scope changed | no | if master on | no |
//! | shader selected | now | if master on | restarted |
//! | parameter changed | debounced | debounced | on fire |
//! | master switch | now | on: shader, off: None | restarted / cancelled |
//! | per-game mode | now | if master on | no |
//! | reset / apply | now | if master on | restarted |

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use crate::activator::{Activation, ShaderActivator};
use crate::clock::Clock;
use crate::config::Timings;
use crate::crash_signal::CrashSignalSource;
use crate::debounce::DebouncedPersister;
use crate::error::{ReshadeError, Result};
use crate::ledger::CrashLedger;
use crate::monitor::{self, CrashMonitor};
use crate::params::ParameterProvider;
use crate::session::{ScopeInfo, SessionSnapshot, SessionState};
use crate::store::ConfigStore;
use crate::types::{
    is_loading_placeholder, normalize_app_id, ParamMap, ParamMeta, ParamValue, ParamView,
    DESKTOP_APP_ID, SHADER_NONE,
};

/// External dependencies handed to [`Engine::new`].
pub struct Collaborators {
    pub store: ConfigStore,
    pub ledger: CrashLedger,
    pub activator: Arc<dyn ShaderActivator>,
    pub params: Arc<dyn ParameterProvider>,
    pub crash_source: Arc<dyn CrashSignalSource>,
    pub clock: Arc<dyn Clock>,
}

/// What [`Engine::initialize`] decided about the startup activation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartupDecision {
    /// Master switch off or no shader selected.
    Idle,
    /// The previous session crashed; shaders were disabled.
    CrashRecovered { timestamp: f64 },
    /// Call [`Engine::activate_on_startup`].
    Activate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeChange {
    Unchanged,
    /// Same scope, display name refreshed in memory.
    Renamed,
    Switched,
}

/// Shared state reachable from handlers and background tasks.
pub(crate) struct EngineContext {
    session: Mutex<SessionState>,
    pub(crate) store: ConfigStore,
    pub(crate) ledger: CrashLedger,
    activator: Arc<dyn ShaderActivator>,
    params: Arc<dyn ParameterProvider>,
    pub(crate) crash_source: Arc<dyn CrashSignalSource>,
    pub(crate) clock: Arc<dyn Clock>,
    timings: Timings,
    pub(crate) monitor: CrashMonitor,
    pub(crate) debouncer: DebouncedPersister,
}

impl EngineContext {
    /// Never hold the guard across an `.await`.
    pub(crate) fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn persist(&self) {
        let session = self.session();
        self.persist_state(&session);
    }

    fn persist_state(&self, session: &SessionState) {
        if let Err(err) = self.store.save_scope(&session.scope_write()) {
            warn!(
                error = %err,
                scope = %session.config_key(),
                "Failed to save config; keeping in-memory state"
            );
        }
    }

    async fn activate(&self, activation: Activation) {
        if let Err(err) = self.activator.activate(&activation).await {
            warn!(error = %err, shader = %activation.shader, "Shader activation failed");
        }
    }

    /// Disables shaders after a crash. Performs no suspension.
    pub(crate) fn commit_crash(&self, timestamp: f64) {
        {
            let mut session = self.session();
            session.master_switch = false;
            session.crash_detected = true;
            self.persist_state(&session);
        }
        match self.ledger.record_crash(timestamp) {
            Ok(record) => info!(
                count = record.count,
                last_timestamp = %record.last_timestamp,
                "Crash recorded"
            ),
            Err(err) => warn!(error = %err, timestamp, "Failed to record crash"),
        }
    }

    pub(crate) async fn clear_effect(&self) {
        self.activate(Activation::none()).await;
    }

    /// Re-applies the active shader under a fresh crash monitor, if the master
    /// switch is on and a shader is selected.
    pub(crate) async fn reactivate_with_monitor(self: &Arc<Self>) {
        let activation = {
            let session = self.session();
            if !session.master_switch || !session.has_shader() {
                return;
            }
            session.activation()
        };
        self.monitor.start(self, &activation.shader);
        self.activate(activation).await;
    }

    /// Activates `activation`, guarded by a crash monitor unless it clears.
    async fn activate_with_monitor(self: &Arc<Self>, activation: Activation) {
        if !activation.is_none() {
            self.monitor.start(self, &activation.shader);
        }
        self.activate(activation).await;
    }

    /// Cached metadata for `shader`, fetched on a miss.
    async fn metadata(&self, shader: &str) -> Vec<ParamMeta> {
        let cached = self.session().params_meta.get(shader).cloned();
        match cached {
            Some(meta) => meta,
            None => self.refresh_metadata(shader).await,
        }
    }

    async fn refresh_metadata(&self, shader: &str) -> Vec<ParamMeta> {
        let meta = self.params.parameters(shader).await;
        let mut session = self.session();
        if meta.is_empty() {
            session.params_meta.remove(shader);
        } else {
            session.params_meta.insert(shader.to_string(), meta.clone());
        }
        meta
    }
}

/// Handle to the reconciliation engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    ctx: Arc<EngineContext>,
}

impl Engine {
    pub fn new(collaborators: Collaborators, timings: Timings) -> Self {
        let Collaborators {
            store,
            ledger,
            activator,
            params,
            crash_source,
            clock,
        } = collaborators;

        Engine {
            ctx: Arc::new(EngineContext {
                session: Mutex::new(SessionState::default()),
                store,
                ledger,
                activator,
                params,
                crash_source,
                clock,
                monitor: CrashMonitor::new(timings.monitor_poll, timings.monitor_window),
                debouncer: DebouncedPersister::new(timings.debounce),
                timings,
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Startup
    // -------------------------------------------------------------------------

    /// Loads the desktop scope and runs the canary check.
    pub fn initialize(&self) -> StartupDecision {
        let loaded = self.ctx.store.load_scope(DESKTOP_APP_ID);
        let ready = {
            let mut session = self.ctx.session();
            session.current_app_id = DESKTOP_APP_ID.to_string();
            session.apply_loaded(loaded);
            info!(
                master_enabled = session.master_switch,
                shader = %session.active_shader,
                per_game = session.per_game_mode,
                "Session initialized"
            );
            session.master_switch && session.has_shader()
        };
        if !ready {
            return StartupDecision::Idle;
        }

        match monitor::canary_check(&self.ctx, self.ctx.timings.canary_recency_secs) {
            Some(timestamp) => {
                error!(
                    timestamp,
                    "Crash from previous session detected; skipping startup activation"
                );
                self.ctx.commit_crash(timestamp);
                StartupDecision::CrashRecovered { timestamp }
            }
            None => StartupDecision::Activate,
        }
    }

    /// Waits out the startup delay, then applies the session's shader.
    pub async fn activate_on_startup(&self) {
        tokio::time::sleep(self.ctx.timings.startup_delay).await;
        info!("Applying startup shader");
        self.ctx.reactivate_with_monitor().await;
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    pub async fn on_scope_changed(&self, app_id: &str, display_name: &str) -> ScopeChange {
        let app_id = normalize_app_id(app_id);
        {
            let mut session = self.ctx.session();
            if session.current_app_id == app_id {
                if session.display_name != display_name && !is_loading_placeholder(display_name) {
                    debug!(app_id = %app_id, name = display_name, "Display name refreshed");
                    session.display_name = display_name.to_string();
                    return ScopeChange::Renamed;
                }
                return ScopeChange::Unchanged;
            }
        }

        if self.ctx.debouncer.discard() {
            info!("Discarding unsaved parameter edits on scope change");
        }

        let loaded = self.ctx.store.load_scope(&app_id);
        let activation = {
            let mut session = self.ctx.session();
            info!(
                from = %session.current_app_id,
                to = %app_id,
                name = display_name,
                per_game = loaded.per_game,
                shader = %loaded.entry.shader,
                "Scope changed"
            );
            session.current_app_id = app_id;
            session.display_name = display_name.to_string();
            session.apply_loaded(loaded);
            session.master_switch.then(|| session.activation())
        };

        if let Some(activation) = activation {
            self.ctx.activate(activation).await;
        }
        ScopeChange::Switched
    }

    pub async fn on_shader_selected(&self, shader: &str) {
        let shader = match shader.trim() {
            "" => SHADER_NONE,
            name => name,
        };
        self.ctx.monitor.cancel();
        // The write below covers anything still pending.
        self.ctx.debouncer.discard();

        let activation = {
            let mut session = self.ctx.session();
            info!(from = %session.active_shader, to = shader, "Shader selected");
            session.active_shader = shader.to_string();
            self.ctx.persist_state(&session);
            session.master_switch.then(|| session.activation())
        };

        if let Some(activation) = activation {
            self.ctx.activate_with_monitor(activation).await;
        }
    }

    /// Records an edit for the active shader and (re)starts the debounce.
    /// Returns the value as stored after coercion.
    pub async fn on_parameter_changed(&self, name: &str, value: ParamValue) -> Result<ParamValue> {
        let shader = {
            let session = self.ctx.session();
            if !session.has_shader() {
                return Err(ReshadeError::NoShaderSelected);
            }
            session.active_shader.clone()
        };

        let meta = self.ctx.metadata(&shader).await;
        let value = match meta.iter().find(|param| param.name == name) {
            Some(param) => value.coerce(param.ty),
            None => {
                debug!(shader = %shader, param = name, "No metadata; storing value as given");
                value
            }
        };

        self.ctx
            .session()
            .shader_parameters
            .entry(shader)
            .or_default()
            .insert(name.to_string(), value.clone());
        self.ctx.debouncer.schedule(&self.ctx);
        Ok(value)
    }

    pub async fn on_master_switch_changed(&self, enabled: bool) {
        self.ctx.monitor.cancel();

        let activation = {
            let mut session = self.ctx.session();
            info!(enabled, "Master switch changed");
            session.crash_detected = false;
            session.master_switch = enabled;
            self.ctx.persist_state(&session);
            if enabled {
                session.has_shader().then(|| session.activation())
            } else {
                Some(Activation::none())
            }
        };

        if let Some(activation) = activation {
            self.ctx.activate_with_monitor(activation).await;
        }
    }

    pub async fn on_per_game_mode_changed(&self, enabled: bool) {
        if self.ctx.session().per_game_mode == enabled {
            debug!(enabled, "Per-game mode unchanged");
            return;
        }
        self.ctx.debouncer.flush(&self.ctx);

        if enabled {
            let mut session = self.ctx.session();
            session.per_game_mode = true;
            info!(app_id = %session.current_app_id, "Per-game mode enabled");
            self.ctx.persist_state(&session);
        } else {
            let app_id = {
                let mut session = self.ctx.session();
                session.per_game_mode = false;
                session.current_app_id.clone()
            };
            info!(app_id = %app_id, "Per-game mode disabled");
            if let Err(err) = self.ctx.store.clear_per_game(&app_id) {
                warn!(error = %err, app_id = %app_id, "Failed to clear per-game flag");
            }
            let loaded = self.ctx.store.load_scope(&app_id);
            self.ctx.session().apply_loaded(loaded);
        }

        let activation = {
            let session = self.ctx.session();
            session.master_switch.then(|| session.activation())
        };
        if let Some(activation) = activation {
            self.ctx.activate(activation).await;
        }
    }

    /// Replaces the active shader's overrides with declared defaults.
    pub async fn reset_parameters(&self) -> Result<Vec<ParamView>> {
        let shader = self.active_shader_or_err()?;
        self.ctx.debouncer.discard();

        let meta = self.ctx.refresh_metadata(&shader).await;
        let defaults: ParamMap = meta
            .iter()
            .map(|param| (param.name.clone(), param.default.clone()))
            .collect();
        {
            let mut session = self.ctx.session();
            info!(shader = %shader, params = defaults.len(), "Parameters reset to defaults");
            session
                .shader_parameters
                .insert(shader.clone(), defaults.clone());
            self.ctx.persist_state(&session);
        }

        self.ctx.reactivate_with_monitor().await;
        Ok(overlay(meta, &defaults))
    }

    /// Writes pending edits and re-applies the active shader.
    pub async fn apply(&self) {
        self.ctx.debouncer.flush(&self.ctx);
        self.ctx.reactivate_with_monitor().await;
    }

    /// Writes pending edits now. Does not activate.
    pub fn flush(&self) -> bool {
        self.ctx.debouncer.flush(&self.ctx)
    }

    pub fn set_active_category(&self, category: &str) {
        let mut session = self.ctx.session();
        session.active_category = category.to_string();
        self.ctx.persist_state(&session);
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Parameter metadata for the active shader with current values overlaid.
    pub async fn shader_params(&self) -> Vec<ParamView> {
        let Ok(shader) = self.active_shader_or_err() else {
            return Vec::new();
        };
        let meta = self.ctx.refresh_metadata(&shader).await;
        let values = self
            .ctx
            .session()
            .shader_parameters
            .get(&shader)
            .cloned()
            .unwrap_or_default();
        overlay(meta, &values)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.ctx.session().snapshot()
    }

    pub fn scope_info(&self) -> ScopeInfo {
        self.ctx.session().scope_info()
    }

    pub fn active_shader(&self) -> String {
        self.ctx.session().active_shader.clone()
    }

    pub fn active_category(&self) -> String {
        self.ctx.session().active_category.clone()
    }

    pub fn master_enabled(&self) -> bool {
        self.ctx.session().master_switch
    }

    pub fn per_game_mode(&self) -> bool {
        self.ctx.session().per_game_mode
    }

    pub fn crash_detected(&self) -> bool {
        self.ctx.session().crash_detected
    }

    pub fn crash_monitor_active(&self) -> bool {
        self.ctx.monitor.is_active()
    }

    pub fn edit_pending(&self) -> bool {
        self.ctx.debouncer.is_pending()
    }

    pub fn store(&self) -> &ConfigStore {
        &self.ctx.store
    }

    pub fn ledger(&self) -> &CrashLedger {
        &self.ctx.ledger
    }

    fn active_shader_or_err(&self) -> Result<String> {
        let session = self.ctx.session();
        if session.has_shader() {
            Ok(session.active_shader.clone())
        } else {
            Err(ReshadeError::NoShaderSelected)
        }
    }
}

fn overlay(meta: Vec<ParamMeta>, values: &ParamMap) -> Vec<ParamView> {
    meta.into_iter()
        .map(|meta| {
            let value = values
                .get(&meta.name)
                .cloned()
                .unwrap_or_else(|| meta.default.clone());
            ParamView { meta, value }
        })
        .collect()
}
