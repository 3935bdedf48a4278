//! Small JSON state files kept in the cache directory between runs.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed state in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Read a JSON state file; `Ok(None)` when it does not exist yet.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StateError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No state file yet");
            return Ok(None);
        }
        Err(e) => {
            error!(error = ?e, path = %path.display(), "Failed to read state file");
            return Err(StateError::Io {
                path: path.display().to_string(),
                source: e,
            });
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StateError::Json {
            path: path.display().to_string(),
            source: e,
        })
}

/// Write a JSON state file through a temp file in the same directory, so a
/// crash never leaves a half-written file behind.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    let io_err = |source: std::io::Error| StateError::Io {
        path: path.display().to_string(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_err)?;

    let json = serde_json::to_vec_pretty(value).map_err(|e| StateError::Json {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(&json).map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    debug!(path = %path.display(), bytes = json.len(), "Saved state file");
    Ok(())
}

/// Remove a state file, ignoring one that is already gone.
pub fn remove(path: &Path) -> Result<(), StateError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StateError::Io {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

/// Turn an arbitrary name into something safe to use as a file stem.
pub fn slug(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    slug.trim_matches('_').to_string()
}
