//! Installed shader listing.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::warn;

/// `Name_a1B2c3.fx` copies left behind by interrupted installs.
static RE_TEMP_COPY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^.+_[A-Za-z0-9]{6}\.fx$").unwrap());

/// Sorted `.fx` file names in `dir`, skipping hidden staging files and temp copies.
pub fn list_shaders(dir: &Path) -> Vec<String> {
    let entries = match fs_err::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(error = %err, "Failed to list shaders");
            return Vec::new();
        }
    };

    let mut shaders: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".fx"))
        .filter(|name| !name.starts_with('.'))
        .filter(|name| !RE_TEMP_COPY.is_match(name))
        .collect();
    shaders.sort();
    shaders
}
