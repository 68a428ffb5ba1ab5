//! Fakes and a harness for driving the engine under paused tokio time.

#![allow(dead_code)]

use async_trait::async_trait;
use reshadeck_core::{
    Activation, Clock, Collaborators, ConfigStore, CrashLedger, CrashSignalSource, Engine,
    ParamMeta, ParamType, ParamValue, ParameterProvider, ReshadeError, RootDocument,
    ShaderActivator, Timings,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Wall-clock "now" for every harness.
pub const T0: f64 = 1_760_000_000.0;

#[derive(Default)]
pub struct RecordingActivator {
    calls: Mutex<Vec<Activation>>,
    fail: AtomicBool,
}

impl RecordingActivator {
    pub fn calls(&self) -> Vec<Activation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn shaders(&self) -> Vec<String> {
        self.calls().into_iter().map(|a| a.shader).collect()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ShaderActivator for RecordingActivator {
    async fn activate(&self, activation: &Activation) -> reshadeck_core::Result<()> {
        self.calls.lock().unwrap().push(activation.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ReshadeError::ActivationFailed {
                shader: activation.shader.clone(),
                details: "exit status Some(1)".into(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeCrashSource {
    latest: Mutex<Option<f64>>,
    probes: AtomicUsize,
}

impl FakeCrashSource {
    pub fn set(&self, timestamp: Option<f64>) {
        *self.latest.lock().unwrap() = timestamp;
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl CrashSignalSource for FakeCrashSource {
    fn latest_crash_timestamp(&self) -> Option<f64> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        *self.latest.lock().unwrap()
    }
}

pub struct FakeClock(Mutex<f64>);

impl FakeClock {
    pub fn set(&self, now: f64) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> f64 {
        *self.0.lock().unwrap()
    }
}

#[derive(Default)]
pub struct FakeParams {
    shaders: HashMap<String, Vec<ParamMeta>>,
}

#[async_trait]
impl ParameterProvider for FakeParams {
    async fn parameters(&self, shader: &str) -> Vec<ParamMeta> {
        self.shaders.get(shader).cloned().unwrap_or_default()
    }
}

pub fn meta(name: &str, ty: ParamType, default: ParamValue) -> ParamMeta {
    ParamMeta {
        name: name.to_string(),
        ty,
        default,
        ui_type: Some("slider".into()),
        ui_min: None,
        ui_max: None,
        ui_step: None,
        ui_label: None,
        ui_items: None,
    }
}

fn catalog() -> FakeParams {
    let mut shaders = HashMap::new();
    shaders.insert(
        "Vibrant.fx".to_string(),
        vec![meta("Saturation", ParamType::Float, ParamValue::Float(1.0))],
    );
    shaders.insert(
        "CAS.fx".to_string(),
        vec![
            meta("Contrast", ParamType::Float, ParamValue::Float(0.0)),
            meta("Sharpness", ParamType::Float, ParamValue::Float(0.5)),
            meta("Enabled", ParamType::Bool, ParamValue::Bool(true)),
        ],
    );
    FakeParams { shaders }
}

pub fn timings() -> Timings {
    Timings {
        debounce: Duration::from_secs(5),
        monitor_poll: Duration::from_secs(2),
        monitor_window: Duration::from_secs(60),
        canary_recency_secs: 300.0,
        startup_delay: Duration::from_secs(5),
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub engine: Engine,
    pub activator: Arc<RecordingActivator>,
    pub crash: Arc<FakeCrashSource>,
    pub clock: Arc<FakeClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// Starts from an existing `config.json`.
    pub fn with_config(config: &str) -> Self {
        Self::build(Some(config), None)
    }

    /// Starts from an existing `config.json` and a crash artifact.
    pub fn with_config_and_crash(config: &str, crash: f64) -> Self {
        Self::build(Some(config), Some(crash))
    }

    fn build(config: Option<&str>, crash_at: Option<f64>) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let config_path = dir.path().join("config.json");
        if let Some(config) = config {
            std::fs::write(&config_path, config).expect("seed config");
        }

        let activator = Arc::new(RecordingActivator::default());
        let crash = Arc::new(FakeCrashSource::default());
        crash.set(crash_at);
        let clock = Arc::new(FakeClock(Mutex::new(T0)));

        let engine = Engine::new(
            Collaborators {
                store: ConfigStore::new(&config_path),
                ledger: CrashLedger::new(&dir.path().join("crash.json")),
                activator: activator.clone(),
                params: Arc::new(catalog()),
                crash_source: crash.clone(),
                clock: clock.clone(),
            },
            timings(),
        );

        Harness {
            dir,
            engine,
            activator,
            crash,
            clock,
        }
    }

    /// The document as currently on disk.
    pub fn document(&self) -> RootDocument {
        self.engine.store().load_document().expect("readable config")
    }

    pub fn writes(&self) -> u64 {
        self.engine.store().write_count()
    }
}

pub fn global_config(master_enabled: bool, shader: &str) -> String {
    format!(
        r#"{{
            "schema_version": 1,
            "master_enabled": {master_enabled},
            "scopes": {{
                "_global": {{"display_name": "Global", "shader": "{shader}", "category": "Default",
                             "per_game": false, "params": {{"CAS.fx": {{"Sharpness": 0.8}}}}}}
            }}
        }}"#
    )
}

pub async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}
