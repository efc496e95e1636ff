//! Filesystem metadata collector.

use std::collections::BTreeMap;
use std::path::Path;

use kome_core::{AppError, AppResult};
use serde_json::Value;

/// Reads the top-level files of `dir` into a flat metadata map.
///
/// `*.json` files parse into JSON values keyed by file stem; every other
/// file becomes a string value keyed by file name. Subdirectories are
/// skipped. A missing directory is a configuration error, since the caller
/// explicitly pointed at it.
pub fn collect_metadata(dir: &Path) -> AppResult<BTreeMap<String, Value>> {
    let entries = std::fs::read_dir(dir).map_err(|error| {
        AppError::Config(format!(
            "failed to read metadata directory '{}': {error}",
            dir.display()
        ))
    })?;

    let mut metadata = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|error| {
            AppError::Config(format!(
                "failed to read metadata directory '{}': {error}",
                dir.display()
            ))
        })?;

        let file_type = entry.file_type().map_err(|error| {
            AppError::Config(format!(
                "failed to inspect metadata entry '{}': {error}",
                entry.path().display()
            ))
        })?;
        if !file_type.is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().into_owned();
        let contents = std::fs::read_to_string(entry.path()).map_err(|error| {
            AppError::Config(format!(
                "failed to read metadata file '{}': {error}",
                entry.path().display()
            ))
        })?;

        match file_name.strip_suffix(".json") {
            Some(stem) => {
                let value = serde_json::from_str(contents.as_str()).map_err(|error| {
                    AppError::Validation(format!(
                        "invalid JSON in metadata file '{file_name}': {error}"
                    ))
                })?;
                metadata.insert(stem.to_owned(), value);
            }
            None => {
                metadata.insert(file_name, Value::String(contents));
            }
        }
    }

    Ok(metadata)
}
