//! Durable record of the most recent crash the plugin acted on.
//!
//! Both the crash monitor and the startup canary compare fresh crash artifacts
//! against `last_timestamp`, so the same coredump is never acted on twice.
//! The timestamp is stored as a string-encoded float (epoch seconds) and only
//! ever moves forward.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ReshadeError, Result};
use crate::store::atomic_write;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    #[serde(default)]
    pub count: u64,
    #[serde(default = "zero_timestamp")]
    pub last_timestamp: String,
}

impl Default for LedgerRecord {
    fn default() -> Self {
        LedgerRecord {
            count: 0,
            last_timestamp: zero_timestamp(),
        }
    }
}

impl LedgerRecord {
    /// `last_timestamp` as epoch seconds; unparseable values read as 0.
    pub fn last_timestamp_secs(&self) -> f64 {
        self.last_timestamp
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .unwrap_or(0.0)
    }
}

fn zero_timestamp() -> String {
    "0".to_string()
}

/// Reads and writes `crash.json`.
pub struct CrashLedger {
    file_path: PathBuf,
}

impl CrashLedger {
    pub fn new(file_path: &Path) -> Self {
        CrashLedger {
            file_path: file_path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Reads the ledger; a missing or unreadable file is an empty ledger.
    pub fn read(&self) -> LedgerRecord {
        match load_record(&self.file_path) {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "Failed to read crash ledger; assuming no prior crash");
                LedgerRecord::default()
            }
        }
    }

    /// Records a crash at `timestamp` and returns the resulting record.
    ///
    /// The count always increments. The stored timestamp becomes the larger of
    /// the existing and the new one.
    pub fn record_crash(&self, timestamp: f64) -> Result<LedgerRecord> {
        let current = self.read();
        let previous = current.last_timestamp_secs();
        let next = if timestamp.is_finite() && timestamp > previous {
            timestamp
        } else {
            debug!(
                timestamp,
                previous, "Crash older than ledger entry; keeping recorded timestamp"
            );
            previous
        };

        let record = LedgerRecord {
            count: current.count.saturating_add(1),
            last_timestamp: next.to_string(),
        };
        save_record(&self.file_path, &record)?;
        Ok(record)
    }
}

fn load_record(path: &Path) -> Result<LedgerRecord> {
    let data = match fs_err::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(LedgerRecord::default())
        }
        Err(err) => return Err(ReshadeError::io("read crash ledger", err)),
    };

    serde_json::from_slice(&data).map_err(|err| ReshadeError::json("parse crash ledger", err))
}

fn save_record(path: &Path, record: &LedgerRecord) -> Result<()> {
    let payload = serde_json::to_vec(record)
        .map_err(|err| ReshadeError::json("serialize crash ledger", err))?;
    atomic_write(path, &payload)
}
