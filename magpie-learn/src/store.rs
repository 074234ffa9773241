//! Atomic JSON checkpoints for learner state
//!
//! Both learners persist document-shaped files; a crash mid-write must never
//! corrupt the previous checkpoint, so writes go to a temp file followed by a
//! rename. A missing or unreadable file degrades to a fresh default: loss of
//! cross-run learning, never incorrectness.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Errors from learner persistence
#[derive(Debug, Error)]
pub enum LearnError {
    #[error("State file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("State serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Write state atomically: temp file in the same directory, then rename
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), LearnError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = path.with_extension("tmp");
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load state, falling back to default on absence or corruption
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match fs::read_to_string(path) {
        Ok(json) => match serde_json::from_str(&json) {
            Ok(value) => value,
            Err(e) => {
                warn!("discarding corrupt state file {}: {}", path.display(), e);
                T::default()
            }
        },
        Err(_) => T::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        count: u64,
        label: String,
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("magpie_store_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_round_trip() {
        let path = temp_path("rt.json");
        let value = Sample { count: 7, label: "x".into() };
        save_json(&path, &value).unwrap();
        let loaded: Sample = load_or_default(&path);
        assert_eq!(loaded, value);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_defaults() {
        let loaded: Sample = load_or_default(Path::new("/nonexistent/magpie.json"));
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn test_corrupt_file_defaults() {
        let path = temp_path("corrupt.json");
        fs::write(&path, "{not json").unwrap();
        let loaded: Sample = load_or_default(&path);
        assert_eq!(loaded, Sample::default());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_no_tmp_left_behind() {
        let path = temp_path("clean.json");
        save_json(&path, &Sample::default()).unwrap();
        assert!(!path.with_extension("tmp").exists());
        let _ = fs::remove_file(&path);
    }
}
