//! Error types for the xai-forge crate.
//!
//! This module defines [`XaiError`], the main error type used throughout
//! the crate. All public API functions return `Result<T, XaiError>`.
//!
//! # Error Handling
//!
//! Errors are designed to be:
//! - **Typed**: every not-found, validation and training failure has its own variant
//! - **Unchanged in transit**: errors are returned at the point of detection and
//!   propagate to the caller as-is, never retried automatically
//! - **Serializable**: errors serialize as `{code, message}` so the hosting
//!   web layer can map them without string matching
//!
//! The single downgraded failure is the quality metric computed after training,
//! which is logged and stored as `None` instead of failing the run.
//!
//! # Example
//!
//! ```no_run
//! use xai_forge::{ForgeConfig, XaiError};
//!
//! fn load() -> Result<ForgeConfig, XaiError> {
//!     // Errors are automatically propagated with ?
//!     let config = ForgeConfig::from_json_file("xai.json")?;
//!     Ok(config)
//! }
//! ```

use serde::Serialize;
use serde::ser::SerializeStruct;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for xai-forge operations.
///
/// This enum covers all error conditions that can occur during:
/// - Dataset registration and lookup
/// - Request and dataset validation
/// - Model training and artifact persistence
/// - Prediction and explanation
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum XaiError {
    /// No dataset with this id exists for the requesting owner.
    ///
    /// Lookups are always scoped by owner, so a dataset owned by someone else
    /// is reported exactly like one that does not exist.
    #[error("Dataset {id} not found")]
    DatasetNotFound {
        /// The dataset id that was requested.
        id: u64,
    },

    /// No trained model with this id exists for the requesting owner.
    #[error("Model {id} not found")]
    ModelNotFound {
        /// The model id that was requested.
        id: u64,
    },

    /// A model has already been trained for this dataset.
    ///
    /// A dataset holds at most one trained model. Delete the existing model
    /// before training a new one.
    #[error("Model already exists for dataset {dataset_id}")]
    ModelAlreadyExists {
        /// The dataset that already has a model bound to it.
        dataset_id: u64,
    },

    /// The parsed dataset is unusable for the requested model family.
    ///
    /// Common causes:
    /// - The dataset has no rows or no feature columns
    /// - A classification target has fewer than 2 distinct classes
    /// - A selected column contains empty cells
    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    /// The training request does not match the dataset.
    ///
    /// Raised before any training work starts, e.g. when a feature or target
    /// column is not one of the dataset headers.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The model type tag is not one of `CLASSIFICATION` or `REGRESSION`.
    ///
    /// This is a configuration error, not a training failure.
    #[error("Unknown model type '{0}'. Expected 'CLASSIFICATION' or 'REGRESSION'")]
    UnknownModelType(String),

    /// The numeric trainer rejected the data or failed to converge.
    #[error("Training failed: {0}")]
    TrainingFailed(String),

    /// Training exceeded the configured upper bound.
    #[error("Training timed out after {}s", timeout.as_secs_f64())]
    TrainingTimeout {
        /// The configured bound that was exceeded.
        timeout: Duration,
    },

    /// A serialized model could not be read back.
    ///
    /// The artifact is missing, truncated, not valid JSON, or was written by an
    /// incompatible format version. This is fatal and not retryable.
    #[error("Model artifact '{}' is corrupt: {reason}", path.display())]
    ArtifactCorrupt {
        /// Location of the artifact.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// No attribution could be produced for the prediction.
    ///
    /// Raised when model weights cannot be used and fallback attribution is
    /// disabled by configuration.
    #[error("Explanation unavailable: {0}")]
    ExplanationUnavailable(String),

    /// The caller is not allowed to act on this resource.
    ///
    /// Reserved for the hosting layer. Lookups inside this crate are scoped by
    /// owner, so an ownership mismatch surfaces as [`XaiError::DatasetNotFound`]
    /// or [`XaiError::ModelNotFound`] instead.
    #[error("Access denied")]
    AuthorizationDenied,

    /// A dataset cannot be removed while a model still references it.
    #[error("Dataset {dataset_id} is still used by model {model_id}")]
    DatasetInUse {
        /// The dataset that was being deleted.
        dataset_id: u64,
        /// The model that still references it.
        model_id: u64,
    },

    /// Every training slot is held by a running fit.
    ///
    /// Fits that timed out keep their slot until the worker finishes.
    #[error("Too many training jobs in progress (limit {limit})")]
    TrainingBusy {
        /// The configured number of concurrent fits.
        limit: usize,
    },

    /// A file backing a model or dataset could not be removed.
    ///
    /// The metadata row is left in place so nothing references a half-deleted
    /// resource.
    #[error("Failed to delete '{}': {source}", path.display())]
    ArtifactDeleteFailed {
        /// The file that could not be deleted.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error while reading a dataset file.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl XaiError {
    /// Get error code for the collaborator layer.
    ///
    /// These codes are stable and can be mapped to transport status codes
    /// without inspecting messages.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DatasetNotFound { .. } => "DATASET_NOT_FOUND",
            Self::ModelNotFound { .. } => "MODEL_NOT_FOUND",
            Self::ModelAlreadyExists { .. } => "MODEL_ALREADY_EXISTS",
            Self::InvalidDataset(_) => "INVALID_DATASET",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::UnknownModelType(_) => "UNKNOWN_MODEL_TYPE",
            Self::TrainingFailed(_) => "TRAINING_FAILED",
            Self::TrainingTimeout { .. } => "TRAINING_TIMEOUT",
            Self::ArtifactCorrupt { .. } => "ARTIFACT_CORRUPT",
            Self::ExplanationUnavailable(_) => "EXPLANATION_UNAVAILABLE",
            Self::AuthorizationDenied => "AUTHORIZATION_DENIED",
            Self::DatasetInUse { .. } => "DATASET_IN_USE",
            Self::TrainingBusy { .. } => "TRAINING_BUSY",
            Self::ArtifactDeleteFailed { .. } => "ARTIFACT_DELETE_FAILED",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// Message suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::DatasetNotFound { .. } => "Dataset not found or access denied".to_string(),
            Self::ModelNotFound { .. } => "Model not found or access denied".to_string(),
            Self::ModelAlreadyExists { .. } => {
                "A model has already been trained for this dataset. \
                 Please delete the existing model first."
                    .to_string()
            }
            Self::InvalidDataset(reason) | Self::InvalidRequest(reason) => reason.clone(),
            Self::UnknownModelType(_) => {
                "Model type must be CLASSIFICATION or REGRESSION".to_string()
            }
            Self::TrainingFailed(_) => "Model training failed".to_string(),
            Self::TrainingTimeout { .. } => {
                "Training took too long. Please try again with a smaller dataset.".to_string()
            }
            Self::ArtifactCorrupt { .. } => {
                "The stored model could not be loaded. Please retrain it.".to_string()
            }
            Self::ExplanationUnavailable(_) => {
                "No explanation can be produced for this model".to_string()
            }
            Self::AuthorizationDenied => "You do not have access to this resource".to_string(),
            Self::DatasetInUse { .. } => {
                "This dataset still has a trained model. Please delete the model first."
                    .to_string()
            }
            Self::TrainingBusy { .. } => {
                "The server is busy training other models. Please try again later.".to_string()
            }
            Self::ArtifactDeleteFailed { .. } => "Failed to delete stored files".to_string(),
            Self::InvalidConfig(_) | Self::Io(_) | Self::Polars(_) | Self::Json(_) => {
                "An unexpected error occurred".to_string()
            }
        }
    }

    /// Check if this error represents a missing (or foreign-owned) resource.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::DatasetNotFound { .. } | Self::ModelNotFound { .. } | Self::AuthorizationDenied
        )
    }

    /// Check if repeating the same call may succeed.
    ///
    /// Only a timeout or a full set of training slots qualifies; everything
    /// else is deterministic for the same inputs.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TrainingTimeout { .. } | Self::TrainingBusy { .. })
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for XaiError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("XaiError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for xai-forge operations.
pub type Result<T> = std::result::Result<T, XaiError>;
