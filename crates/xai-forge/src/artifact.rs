//! On-disk storage of fitted models.
//!
//! Each model is one JSON file in the models directory, named
//! `{name}_{uuid}.model.json`. The file wraps the model in a versioned
//! envelope:
//!
//! ```json
//! {
//!   "format": "xai-forge/fitted-model",
//!   "version": 1,
//!   "saved_at": "2026-10-16T09:30:00Z",
//!   "model": { "kind": "regressor", "feature_names": ["age"], "weights": [0.4], "intercept": 1.0 }
//! }
//! ```
//!
//! Writes go to a temporary sibling first and are renamed into place, so a
//! path returned by [`ModelArtifactStore::save()`] always names a complete
//! file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, XaiError};
use crate::model::FittedModel;

/// Envelope `format` marker.
pub const ARTIFACT_FORMAT: &str = "xai-forge/fitted-model";

/// Envelope version written by this build. Other versions are rejected on load.
pub const ARTIFACT_VERSION: u32 = 1;

const ARTIFACT_SUFFIX: &str = ".model.json";
const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactEnvelope {
    format: String,
    version: u32,
    saved_at: DateTime<Utc>,
    model: serde_json::Value,
}

/// Reads and writes [`FittedModel`] files under one directory.
#[derive(Debug, Clone)]
pub struct ModelArtifactStore {
    models_dir: PathBuf,
}

impl ModelArtifactStore {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Serializes `model` under a fresh, collision-free file name.
    ///
    /// # Errors
    ///
    /// Returns [`XaiError::Io`] if the directory or file cannot be written.
    /// Nothing is left behind on failure.
    pub fn save(&self, model: &FittedModel, name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.models_dir)?;

        let file_name = format!("{}_{}{ARTIFACT_SUFFIX}", sanitize_name(name), Uuid::new_v4());
        let path = self.models_dir.join(&file_name);
        let tmp_path = self.models_dir.join(format!("{file_name}.tmp"));

        let envelope = ArtifactEnvelope {
            format: ARTIFACT_FORMAT.to_string(),
            version: ARTIFACT_VERSION,
            saved_at: Utc::now(),
            model: serde_json::to_value(model)?,
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        if let Err(e) = fs::write(&tmp_path, &bytes).and_then(|()| fs::rename(&tmp_path, &path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        info!(path = %path.display(), bytes = bytes.len(), "Saved model artifact");
        Ok(path)
    }

    /// Reads a model back.
    ///
    /// # Errors
    ///
    /// Returns [`XaiError::ArtifactCorrupt`] when the file is missing,
    /// unreadable, truncated, of another format or version, or describes a
    /// model whose dimensions do not agree.
    pub fn load(&self, path: &Path) -> Result<FittedModel> {
        let corrupt = |reason: String| XaiError::ArtifactCorrupt {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => corrupt("file is missing".to_string()),
            _ => corrupt(format!("cannot read file: {e}")),
        })?;

        let envelope: ArtifactEnvelope =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(format!("invalid JSON: {e}")))?;

        if envelope.format != ARTIFACT_FORMAT {
            return Err(corrupt(format!("unexpected format '{}'", envelope.format)));
        }
        if envelope.version != ARTIFACT_VERSION {
            return Err(corrupt(format!(
                "unsupported version {} (expected {ARTIFACT_VERSION})",
                envelope.version
            )));
        }

        let model: FittedModel = serde_json::from_value(envelope.model)
            .map_err(|e| corrupt(format!("invalid model: {e}")))?;
        model.check_consistency().map_err(corrupt)?;

        debug!(path = %path.display(), model_type = %model.model_type(), "Loaded model artifact");
        Ok(model)
    }

    /// Removes an artifact. A file that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`XaiError::ArtifactDeleteFailed`] for any other I/O failure.
    pub fn delete(&self, path: &Path) -> Result<()> {
        remove_file_if_exists(path)?;
        info!(path = %path.display(), "Deleted model artifact");
        Ok(())
    }
}

/// Deletes `path`, treating a missing file as already deleted.
pub(crate) fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "File already removed");
            Ok(())
        }
        Err(source) => Err(XaiError::ArtifactDeleteFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// File-system safe rendition of a model name.
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();

    if cleaned.is_empty() {
        "model".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LinearRegressor;
    use tempfile::TempDir;

    fn model() -> FittedModel {
        FittedModel::Regressor(LinearRegressor {
            feature_names: vec!["age".to_string(), "income".to_string()],
            weights: vec![0.5, 0.001],
            intercept: 2.0,
        })
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = ModelArtifactStore::new(dir.path().join("models"));

        let path = store.save(&model(), "house prices").unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("house_prices_"));
        assert!(name.ends_with(".model.json"));

        assert_eq!(store.load(&path).unwrap(), model());
    }

    #[test]
    fn test_file_names_never_collide() {
        let dir = TempDir::new().unwrap();
        let store = ModelArtifactStore::new(dir.path());

        let first = store.save(&model(), "same").unwrap();
        let second = store.save(&model(), "same").unwrap();
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
    }

    #[test]
    fn test_no_temporary_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = ModelArtifactStore::new(dir.path());
        store.save(&model(), "m").unwrap();

        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_missing_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = ModelArtifactStore::new(dir.path());

        let err = store.load(&dir.path().join("gone.model.json")).unwrap_err();
        assert!(matches!(err, XaiError::ArtifactCorrupt { ref reason, .. } if reason.contains("missing")));
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = ModelArtifactStore::new(dir.path());
        let path = store.save(&model(), "m").unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(matches!(
            store.load(&path),
            Err(XaiError::ArtifactCorrupt { .. })
        ));
    }

    #[test]
    fn test_other_version_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = ModelArtifactStore::new(dir.path());
        let path = store.save(&model(), "m").unwrap();

        let mut json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        json["version"] = serde_json::json!(99);
        fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        let err = store.load(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported version 99"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = ModelArtifactStore::new(dir.path());
        let path = store.save(&model(), "m").unwrap();

        store.delete(&path).unwrap();
        assert!(!path.exists());
        store.delete(&path).unwrap();
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  ../etc/passwd "), "___etc_passwd");
        assert_eq!(sanitize_name(""), "model");
        assert_eq!(sanitize_name(&"x".repeat(100)).len(), MAX_NAME_LEN);
    }
}
