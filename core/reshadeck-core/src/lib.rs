//! # reshadeck-core
//!
//! State reconciliation and crash protection for gamescope ReShade shaders.
//!
//! ## Design Principles
//!
//! - **One writer**: the [`Engine`] is the only component that mutates the
//!   session or writes `config.json` / `crash.json`.
//! - **Newest event wins**: background work (crash watching, debounced saves)
//!   lives in single-slot supervisors and is aborted by the event that
//!   supersedes it.
//! - **Graceful degradation**: missing or corrupt files read as defaults; I/O
//!   and activation failures are logged, never fatal.
//! - **Injectable seams**: activator, parameter provider, crash signal source
//!   and clock are traits so the engine runs against fakes in tests.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reshadeck_core::{Engine, StartupDecision};
//!
//! let engine = Engine::new(collaborators, runtime_config.timings());
//! if engine.initialize() == StartupDecision::Activate {
//!     engine.activate_on_startup().await;
//! }
//! engine.on_scope_changed("1091500", "Cyberpunk 2077").await;
//! ```

pub mod activator;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod crash_signal;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod monitor;
pub mod params;
pub mod session;
pub mod store;
pub mod supervisor;
pub mod types;

pub use activator::{Activation, ScriptActivator, ShaderActivator, PARAMS_ENV};
pub use catalog::list_shaders;
pub use clock::{Clock, SystemClock};
pub use config::*;
pub use crash_signal::{CoredumpDirectory, CrashSignalSource};
pub use engine::{Collaborators, Engine, ScopeChange, StartupDecision};
pub use error::{ReshadeError, Result};
pub use ledger::{CrashLedger, LedgerRecord};
pub use params::{CommandParameterProvider, ParameterProvider};
pub use session::{ScopeInfo, SessionSnapshot, SessionState};
pub use store::{ConfigStore, LoadedScope, RootDocument, ScopeWrite, SCHEMA_VERSION};
pub use supervisor::TaskSlot;
pub use types::*;
