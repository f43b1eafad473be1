//! xai-forge: train tabular models and explain their predictions.
//!
//! This crate takes an uploaded CSV dataset, trains a single-target
//! classification or regression model on selected columns, and answers
//! prediction and explanation requests for new input rows.
//!
//! # Features
//!
//! - **Deterministic encoding**: numeric cells parse as decimals, anything
//!   else maps to a stable hash surrogate, identically at training and inference
//! - **Linear trainers**: multinomial logistic regression and least-squares
//!   regression via `linfa`
//! - **One model per dataset**: enforced atomically, even under concurrent requests
//! - **Versioned artifacts**: JSON model files with collision-free names
//! - **Two-tier attribution**: weight-times-value from the model, with a
//!   configurable heuristic fallback
//!
//! # Quick Start
//!
//! ```no_run
//! use std::collections::HashMap;
//! use xai_forge::{ForgeConfig, TrainRequest, XaiForge};
//!
//! # fn main() -> xai_forge::Result<()> {
//! let forge = XaiForge::new(ForgeConfig::default())?;
//!
//! let dataset = forge.register_dataset(1, "iris.csv", "uploads/iris.csv")?;
//! let model = forge.train_model(
//!     &TrainRequest {
//!         dataset_id: dataset.id,
//!         model_name: "iris".to_string(),
//!         target_variable: "species".to_string(),
//!         feature_names: vec!["petal_length".to_string(), "petal_width".to_string()],
//!         model_type: "CLASSIFICATION".to_string(),
//!     },
//!     1,
//! )?;
//!
//! let input = HashMap::from([
//!     ("petal_length".to_string(), "4.7".to_string()),
//!     ("petal_width".to_string(), "1.4".to_string()),
//! ]);
//! let prediction = forge.predict(model.id, &input, 1)?;
//! let explanation = forge.explain(model.id, &input, 1)?;
//! println!("{} - {}", prediction.prediction, explanation.explanation_text);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//!  TrainRequest ──► TrainingOrchestrator ──► TrainingStrategy ──► FittedModel
//!                          │                                         │
//!                          ▼                                         ▼
//!                       Catalog ◄──────── TrainedModel ◄──── ModelArtifactStore
//!                          │                                         │
//!  RawInput ──► FeatureVectorizer ──► PredictionService ◄────────────┘
//!                                            │
//!                                            ▼
//!                                    ExplanationEngine ──► Explanation
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T>`](Result), with
//! [`XaiError`] carrying one variant per failure kind and a stable
//! [`error_code()`](XaiError::error_code) for the hosting layer.
//!
//! # Thread Safety
//!
//! All services are `Send + Sync`. Lookups are scoped by owner; deletes are
//! ordered against reads by a shared [`DeletionGuard`].

mod artifact;
mod catalog;
mod config;
mod dataset;
mod error;
mod explain;
mod forge;
mod model;
mod predict;
mod strategy;
mod trainer;
mod types;
mod vectorizer;

// Re-export public API
//
// Configuration types
pub use config::{
    DEFAULT_MULTIPLIER, ExplanationConfig, ExplanationConfigBuilder, FeatureMultiplierTable,
    ForgeConfig, MultiplierEntry, TrainingConfig, TrainingConfigBuilder,
};
// Error types
pub use error::{Result, XaiError};
// Records, requests and results
pub use types::{
    AttributionSource, Contribution, Dataset, DatasetId, Direction, Explanation, FeatureVector,
    ModelId, ModelType, NewDataset, NewTrainedModel, OwnerId, PredictionResult,
    REGRESSION_CONFIDENCE, RawInput, TrainRequest, TrainedModel,
};
// Encoding
pub use vectorizer::{EncodedValue, FeatureVectorizer};
// Models and storage
pub use artifact::{ARTIFACT_FORMAT, ARTIFACT_VERSION, ModelArtifactStore};
pub use catalog::{Catalog, CatalogError, DeletionGuard, InMemoryCatalog};
pub use model::{FittedModel, LinearClassifier, LinearRegressor, ModelOutput};
// Services
pub use dataset::{
    DatasetService, TargetColumn, TrainingTable, load_training_table, validate_columns,
};
pub use explain::{ExplanationEngine, attribute, render_text};
pub use forge::{XaiForge, XaiForgeBuilder};
pub use predict::PredictionService;
pub use strategy::TrainingStrategy;
pub use trainer::TrainingOrchestrator;
