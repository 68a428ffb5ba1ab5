//! File-backed configuration persistence.
//!
//! One JSON document holds every scope's configuration plus the process-wide
//! master switch. The engine is the only writer; every write is a whole-document
//! read-modify-write of the changed scope key and the master flag.
//!
//! # File Format
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "master_enabled": true,
//!   "scopes": {
//!     "_global": { "display_name": "Global", "shader": "CAS.fx", "category": "Default",
//!                  "per_game": false, "params": { "CAS.fx": { "Sharpness": 0.6 } } }
//!   }
//! }
//! ```
//!
//! Documents without `schema_version` use the legacy layout (scope keys at the
//! root, `current`/`appname` field names) and are migrated on read. The
//! canonical form is written back on the next save.
//!
//! # Degradation
//!
//! Missing, empty, corrupt or future-versioned files read as an empty document.
//! First-run operation must never be blocked by the store. Writes replace a
//! corrupt file but refuse to touch a future-versioned one.
//!
//! # Atomic Writes
//!
//! Uses temp file + rename so a crash mid-write leaves the previous document intact.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{ReshadeError, Result};
use crate::types::{
    ConfigEntry, ParamMap, ParamValue, ShaderParams, DEFAULT_CATEGORY, GLOBAL_DISPLAY_NAME,
    GLOBAL_SCOPE, SHADER_NONE,
};

pub const SCHEMA_VERSION: u32 = 1;

const LEGACY_CAS_SHADER: &str = "CAS.fx";

/// The on-disk JSON structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootDocument {
    pub schema_version: u32,
    #[serde(default = "default_master_enabled")]
    pub master_enabled: bool,
    #[serde(default)]
    pub scopes: BTreeMap<String, ConfigEntry>,
}

impl Default for RootDocument {
    fn default() -> Self {
        RootDocument {
            schema_version: SCHEMA_VERSION,
            master_enabled: default_master_enabled(),
            scopes: BTreeMap::new(),
        }
    }
}

fn default_master_enabled() -> bool {
    true
}

/// Result of resolving an app id against the stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedScope {
    /// Whether the app has its own per-game slot.
    pub per_game: bool,
    /// The entry in effect: the app's slot when per-game, else `_global`.
    pub entry: ConfigEntry,
    pub master_enabled: bool,
}

/// Everything one persist needs, captured from session state.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeWrite {
    pub app_id: String,
    pub display_name: String,
    pub per_game_mode: bool,
    pub shader: String,
    pub category: String,
    /// Overrides for `shader` only; other shaders are pruned before this point.
    pub params: ParamMap,
    pub master_enabled: bool,
}

/// Reads and writes `config.json`.
pub struct ConfigStore {
    file_path: PathBuf,
    writes: AtomicU64,
}

impl ConfigStore {
    pub fn new(file_path: &Path) -> Self {
        ConfigStore {
            file_path: file_path.to_path_buf(),
            writes: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Number of successful document writes since construction.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Loads the document, surfacing I/O and version errors.
    pub fn load_document(&self) -> Result<RootDocument> {
        let content = match fs_err::read_to_string(&self.file_path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RootDocument::default())
            }
            Err(err) => return Err(ReshadeError::io("read config document", err)),
        };

        if content.trim().is_empty() {
            debug!(path = %self.file_path.display(), "Empty config document");
            return Ok(RootDocument::default());
        }

        let value: Value = serde_json::from_str(&content)
            .map_err(|err| ReshadeError::json("parse config document", err))?;
        parse_document(value)
    }

    /// Loads the document, degrading to defaults on any failure.
    pub fn read_document(&self) -> RootDocument {
        match self.load_document() {
            Ok(doc) => doc,
            Err(err) => {
                warn!(
                    error = %err,
                    path = %self.file_path.display(),
                    "Failed to read config; using defaults"
                );
                RootDocument::default()
            }
        }
    }

    /// Base document for a read-modify-write.
    ///
    /// A document from a newer schema is never overwritten: rewriting it as the
    /// current version would drop every scope this build could not read.
    /// Other read failures start from defaults.
    fn document_for_update(&self) -> Result<RootDocument> {
        match self.load_document() {
            Ok(doc) => Ok(doc),
            Err(err @ ReshadeError::UnsupportedSchema { .. }) => Err(err),
            Err(err) => {
                warn!(
                    error = %err,
                    path = %self.file_path.display(),
                    "Unreadable config will be replaced"
                );
                Ok(RootDocument::default())
            }
        }
    }

    /// Resolves which entry is in effect for `app_id`.
    pub fn load_scope(&self, app_id: &str) -> LoadedScope {
        let doc = self.read_document();
        resolve_scope(&doc, app_id)
    }

    /// Writes the active scope entry and the master flag.
    pub fn save_scope(&self, write: &ScopeWrite) -> Result<()> {
        let mut doc = self.document_for_update()?;
        apply_scope_write(&mut doc, write);
        self.write_document(&doc)
    }

    /// Clears the per-game flag on an app's entry so it resolves to `_global`.
    /// The entry's stored shader and parameters are left in place.
    pub fn clear_per_game(&self, app_id: &str) -> Result<()> {
        let mut doc = self.document_for_update()?;
        let entry = doc.scopes.entry(app_id.to_string()).or_default();
        entry.per_game = false;
        self.write_document(&doc)
    }

    pub fn write_document(&self, doc: &RootDocument) -> Result<()> {
        let content = serde_json::to_string_pretty(doc)
            .map_err(|err| ReshadeError::json("serialize config document", err))?;
        atomic_write(&self.file_path, content.as_bytes())?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

pub(crate) fn resolve_scope(doc: &RootDocument, app_id: &str) -> LoadedScope {
    let app_entry = doc.scopes.get(app_id);
    let per_game = app_entry.map(|entry| entry.per_game).unwrap_or(false);

    let entry = if per_game {
        app_entry.cloned().unwrap_or_default()
    } else {
        doc.scopes.get(GLOBAL_SCOPE).cloned().unwrap_or_default()
    };

    LoadedScope {
        per_game,
        entry,
        master_enabled: doc.master_enabled,
    }
}

pub(crate) fn apply_scope_write(doc: &mut RootDocument, write: &ScopeWrite) {
    let key = if write.per_game_mode {
        write.app_id.as_str()
    } else {
        GLOBAL_SCOPE
    };

    let mut params = ShaderParams::new();
    if write.shader != SHADER_NONE && !write.params.is_empty() {
        params.insert(write.shader.clone(), write.params.clone());
    }

    let entry = ConfigEntry {
        display_name: if write.per_game_mode {
            write.display_name.clone()
        } else {
            GLOBAL_DISPLAY_NAME.to_string()
        },
        shader: write.shader.clone(),
        category: write.category.clone(),
        per_game: write.per_game_mode,
        params,
    };
    doc.scopes.insert(key.to_string(), entry);
    doc.master_enabled = write.master_enabled;
    doc.schema_version = SCHEMA_VERSION;

    // In global mode the app keeps a marker entry so its name is known and it
    // explicitly resolves to `_global`.
    if !write.per_game_mode && write.app_id != GLOBAL_SCOPE {
        let marker = doc.scopes.entry(write.app_id.clone()).or_default();
        marker.per_game = false;
        marker.display_name = write.display_name.clone();
    }
}

fn parse_document(value: Value) -> Result<RootDocument> {
    match value.get("schema_version").and_then(Value::as_u64) {
        Some(version) if version == u64::from(SCHEMA_VERSION) => serde_json::from_value(value)
            .map_err(|err| ReshadeError::json("decode config document", err)),
        Some(version) => Err(ReshadeError::UnsupportedSchema {
            found: version,
            supported: SCHEMA_VERSION,
        }),
        None => Ok(migrate_legacy(value)),
    }
}

/// Entry shape written before the schema was versioned.
#[derive(Debug, Default, Deserialize)]
struct LegacyEntry {
    #[serde(default)]
    appname: Option<String>,
    #[serde(default)]
    current: Option<String>,
    #[serde(default)]
    active_category: Option<String>,
    #[serde(default)]
    per_game: Option<bool>,
    #[serde(default)]
    params: ShaderParams,
    #[serde(default)]
    contrast: Option<ParamValue>,
    #[serde(default)]
    sharpness: Option<ParamValue>,
}

fn migrate_legacy(value: Value) -> RootDocument {
    let mut doc = RootDocument::default();
    let Value::Object(root) = value else {
        warn!("Legacy config document is not an object; using defaults");
        return doc;
    };

    // The oldest layout had no global slot: every app entry was its own config.
    let implicit_per_game = !root.contains_key(GLOBAL_SCOPE);

    for (key, raw) in root {
        if key == "master_enabled" {
            doc.master_enabled = raw.as_bool().unwrap_or_else(default_master_enabled);
            continue;
        }
        if !raw.is_object() {
            continue;
        }

        let legacy: LegacyEntry = match serde_json::from_value(raw) {
            Ok(entry) => entry,
            Err(err) => {
                debug!(scope = %key, error = %err, "Skipping unreadable legacy entry");
                continue;
            }
        };

        let mut params = legacy.params;
        if legacy.contrast.is_some() || legacy.sharpness.is_some() {
            let cas = params.entry(LEGACY_CAS_SHADER.to_string()).or_default();
            if let Some(contrast) = legacy.contrast {
                cas.entry("Contrast".to_string()).or_insert(contrast);
            }
            if let Some(sharpness) = legacy.sharpness {
                cas.entry("Sharpness".to_string()).or_insert(sharpness);
            }
        }

        let is_global = key == GLOBAL_SCOPE;
        doc.scopes.insert(
            key,
            ConfigEntry {
                display_name: legacy.appname.unwrap_or_default(),
                shader: legacy.current.unwrap_or_else(|| SHADER_NONE.to_string()),
                category: legacy
                    .active_category
                    .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
                per_game: !is_global && legacy.per_game.unwrap_or(implicit_per_game),
                params,
            },
        );
    }

    debug!(scopes = doc.scopes.len(), "Migrated legacy config document");
    doc
}

/// Writes `bytes` to `path` via a sibling temp file and rename.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs_err::create_dir_all(parent_dir)
        .map_err(|err| ReshadeError::io("create settings directory", err))?;

    let mut temp_file = NamedTempFile::new_in(parent_dir)
        .map_err(|err| ReshadeError::io("create temp file", err))?;
    temp_file
        .write_all(bytes)
        .map_err(|err| ReshadeError::io("write temp file", err))?;
    temp_file
        .flush()
        .map_err(|err| ReshadeError::io("flush temp file", err))?;
    temp_file
        .persist(path)
        .map_err(|err| ReshadeError::io(format!("commit {}", path.display()), err.error))?;
    Ok(())
}
