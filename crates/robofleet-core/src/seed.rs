//! Seed data loading.
//!
//! The fleet is loaded once at startup from a JSON array of device
//! records. Loading never stops the service: a missing or malformed file
//! yields an empty fleet, and individual malformed entries are skipped.

use std::path::Path;

use robofleet_types::DeviceRecord;
use tracing::{info, warn};

/// Errors that can occur when reading a seed file.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    /// The file could not be read.
    #[error("failed to read seed file {path}: {source}")]
    Io {
        /// Path that was being read.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid JSON.
    #[error("failed to parse seed file {path}: {source}")]
    Json {
        /// Path that was being parsed.
        path: String,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// The top-level JSON value is not an array.
    #[error("seed file {path} must contain a JSON array")]
    NotAnArray {
        /// Path that was being parsed.
        path: String,
    },
}

/// Read and parse a seed file.
///
/// Entries that do not deserialize into a [`DeviceRecord`] are logged and
/// skipped.
///
/// # Errors
///
/// Returns [`SeedError`] if the file cannot be read, is not JSON, or is
/// not a JSON array.
pub fn read_seed(path: &Path) -> Result<Vec<DeviceRecord>, SeedError> {
    let display = path.display().to_string();
    let contents = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: display.clone(),
        source,
    })?;
    parse_entries(&contents, &display)
}

/// Parse seed records from a JSON string.
///
/// # Errors
///
/// Returns [`SeedError::Json`] or [`SeedError::NotAnArray`] for
/// structurally invalid input.
pub fn parse_seed(contents: &str) -> Result<Vec<DeviceRecord>, SeedError> {
    parse_entries(contents, "<inline>")
}

fn parse_entries(contents: &str, path: &str) -> Result<Vec<DeviceRecord>, SeedError> {
    let value: serde_json::Value =
        serde_json::from_str(contents).map_err(|source| SeedError::Json {
            path: path.to_owned(),
            source,
        })?;

    let serde_json::Value::Array(entries) = value else {
        return Err(SeedError::NotAnArray {
            path: path.to_owned(),
        });
    };

    let mut records = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<DeviceRecord>(entry) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path, index, error = %e, "skipping malformed seed entry"),
        }
    }
    Ok(records)
}

/// Load seed records, falling back to an empty fleet on any failure.
pub fn load_or_empty(path: &Path) -> Vec<DeviceRecord> {
    match read_seed(path) {
        Ok(records) => {
            info!(path = %path.display(), devices = records.len(), "Seed data loaded");
            records
        }
        Err(e) => {
            warn!(error = %e, "Seed data unavailable, starting with an empty fleet");
            Vec::new()
        }
    }
}
