//! Crash signal probing.
//!
//! A compositor crash under a bad shader leaves a coredump behind. The probe
//! reports the newest matching artifact's mtime; interpreting it (new vs stale)
//! is the monitor's job.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;

/// Source of the most recent crash timestamp.
///
/// Best-effort: implementations swallow their own I/O errors and report `None`.
pub trait CrashSignalSource: Send + Sync {
    fn latest_crash_timestamp(&self) -> Option<f64>;
}

/// Scans a coredump directory for files matching a name pattern.
pub struct CoredumpDirectory {
    dir: PathBuf,
    pattern: Regex,
}

impl CoredumpDirectory {
    pub fn new(dir: &Path, pattern: &str) -> Result<Self, regex::Error> {
        Ok(CoredumpDirectory {
            dir: dir.to_path_buf(),
            pattern: Regex::new(pattern)?,
        })
    }

    fn scan(&self) -> std::io::Result<Option<f64>> {
        let mut latest: Option<f64> = None;
        for entry in fs_err::read_dir(&self.dir)? {
            let Ok(entry) = entry else {
                continue;
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !self.pattern.is_match(name) {
                continue;
            }

            // Coredump vacuuming may remove files mid-listing.
            let Some(secs) = modified_secs(&entry.path()) else {
                debug!(file = name, "Coredump vanished before it could be inspected");
                continue;
            };
            latest = Some(latest.map_or(secs, |current| current.max(secs)));
        }
        Ok(latest)
    }
}

fn modified_secs(path: &Path) -> Option<f64> {
    let modified = fs_err::metadata(path).ok()?.modified().ok()?;
    modified
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|duration| duration.as_secs_f64())
}

impl CrashSignalSource for CoredumpDirectory {
    fn latest_crash_timestamp(&self) -> Option<f64> {
        match self.scan() {
            Ok(latest) => latest,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                debug!(error = %err, dir = %self.dir.display(), "Coredump probe failed");
                None
            }
        }
    }
}
