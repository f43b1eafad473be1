//! Common types used throughout the xai-forge crate.
//!
//! This module defines the records, requests and result types exchanged with
//! the hosting layer.
//!
//! # Overview
//!
//! - [`ModelType`]: The model family tag (`CLASSIFICATION` or `REGRESSION`)
//! - [`Dataset`]: An uploaded tabular file and its headers
//! - [`TrainedModel`]: The persisted record of a fitted model
//! - [`TrainRequest`]: Input of [`TrainingOrchestrator::train_model()`](crate::TrainingOrchestrator::train_model)
//! - [`FeatureVector`]: Numeric encoding of a raw input row
//! - [`PredictionResult`]: Output of [`PredictionService::predict()`](crate::PredictionService::predict)
//! - [`Explanation`] and [`Contribution`]: Output of [`ExplanationEngine::explain()`](crate::ExplanationEngine::explain)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::XaiError;

/// Identifier of a [`Dataset`].
pub type DatasetId = u64;

/// Identifier of a [`TrainedModel`].
pub type ModelId = u64;

/// Identifier of the user owning datasets and models.
pub type OwnerId = u64;

/// Raw input row: feature name to unparsed string value.
pub type RawInput = HashMap<String, String>;

/// Confidence reported for every regression prediction.
///
/// A regression estimate carries no probability; this constant only marks the
/// field as "not applicable" and must not be read as certainty.
pub const REGRESSION_CONFIDENCE: f64 = 1.0;

/// The model family.
///
/// This determines which validation rules apply, which trainer is used and
/// the shape of prediction output:
/// - [`Classification`](Self::Classification): predicted label, probabilities
/// - [`Regression`](Self::Regression): scalar estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelType {
    /// Predicting discrete class labels.
    Classification,

    /// Predicting a continuous value.
    Regression,
}

impl ModelType {
    /// Returns the tag used in requests and records.
    ///
    /// # Examples
    ///
    /// ```
    /// use xai_forge::ModelType;
    ///
    /// assert_eq!(ModelType::Classification.as_str(), "CLASSIFICATION");
    /// assert_eq!(ModelType::Regression.as_str(), "REGRESSION");
    /// ```
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Classification => "CLASSIFICATION",
            ModelType::Regression => "REGRESSION",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = XaiError;

    /// Parses a model type tag, ignoring ASCII case and surrounding whitespace.
    ///
    /// Any other tag is an [`XaiError::UnknownModelType`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CLASSIFICATION" => Ok(ModelType::Classification),
            "REGRESSION" => Ok(ModelType::Regression),
            _ => Err(XaiError::UnknownModelType(s.to_string())),
        }
    }
}

/// An uploaded tabular dataset.
///
/// Created once on upload and immutable afterwards except for deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub owner_id: OwnerId,
    /// Original file name as uploaded.
    pub file_name: String,
    /// Where the raw CSV lives.
    pub file_path: PathBuf,
    /// Column headers in file order. Never empty.
    pub headers: Vec<String>,
    /// Number of data rows counted at upload time.
    pub row_count: usize,
    pub uploaded_at: DateTime<Utc>,
}

/// Dataset fields supplied on insert; the catalog assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDataset {
    pub owner_id: OwnerId,
    pub file_name: String,
    pub file_path: PathBuf,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// The persisted record of a fitted model.
///
/// A record only becomes visible after its artifact has been written, so
/// `artifact_path` always points at a complete file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub id: ModelId,
    pub name: String,
    pub model_type: ModelType,
    /// The one dataset this model was trained on.
    pub dataset_id: DatasetId,
    /// Owner of the source dataset.
    pub owner_id: OwnerId,
    /// Features in the order the model expects them.
    pub feature_names: Vec<String>,
    pub target_variable: String,
    pub artifact_path: PathBuf,
    /// Quality metric on the training data.
    ///
    /// Accuracy for classification, R² for regression. `None` when the
    /// metric could not be computed.
    pub accuracy: Option<f64>,
    /// Human-readable trainer name, e.g. "Logistic Regression".
    pub algorithm: String,
    pub trained_at: DateTime<Utc>,
    /// Free-form training metadata.
    pub metadata: serde_json::Value,
}

/// Model fields supplied on insert; the catalog assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrainedModel {
    pub name: String,
    pub model_type: ModelType,
    pub dataset_id: DatasetId,
    pub owner_id: OwnerId,
    pub feature_names: Vec<String>,
    pub target_variable: String,
    pub artifact_path: PathBuf,
    pub accuracy: Option<f64>,
    pub algorithm: String,
    pub trained_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// A request to train a model on an uploaded dataset.
///
/// `model_type` is the raw tag from the client; it is parsed during training
/// so that an unknown tag surfaces as [`XaiError::UnknownModelType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainRequest {
    pub dataset_id: DatasetId,
    pub model_name: String,
    pub target_variable: String,
    pub feature_names: Vec<String>,
    pub model_type: String,
}

/// Numeric encoding of a raw input row.
///
/// Entries keep the order of the declared feature list. Features missing from
/// the raw input are absent, not zero-filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    entries: Vec<(String, f64)>,
}

impl FeatureVector {
    /// Creates an empty vector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, name: impl Into<String>, value: f64) {
        self.entries.push((name.into(), value));
    }

    /// Value of `name`, if the feature was present in the input.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(feature, _)| feature == name)
            .map(|(_, value)| *value)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates `(feature, value)` pairs in declared feature order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), *value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of a single prediction.
///
/// # Classification
///
/// `prediction` holds the top class label, `confidence` its probability and
/// `probabilities` the full class to probability map. The probabilities are
/// the softmax output of the multinomial logistic model and sum to 1.0.
///
/// # Regression
///
/// `prediction` holds the estimate formatted as a decimal string,
/// `probabilities` is `None` and `confidence` is always
/// [`REGRESSION_CONFIDENCE`], a placeholder rather than a statistical quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub prediction: String,
    pub confidence: f64,
    pub probabilities: Option<BTreeMap<String, f64>>,
    /// The raw input, echoed back.
    pub input: RawInput,
}

/// Sign of a feature's effect on the prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    /// Direction of a signed score; zero counts as positive.
    #[must_use]
    pub fn of(score: f64) -> Self {
        if score < 0.0 {
            Direction::Negative
        } else {
            Direction::Positive
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Positive => "positive",
            Direction::Negative => "negative",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a contribution was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionSource {
    /// Weight times value, read from the fitted model.
    ModelWeights,

    /// Value times configured multiplier.
    ///
    /// The direction is the sign of the input value and says nothing about
    /// how the model actually uses the feature.
    Heuristic,
}

/// One feature's share of an explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub feature_name: String,
    /// Non-negative magnitude.
    pub contribution: f64,
    pub direction: Direction,
    pub source: AttributionSource,
}

/// Explanation of a single prediction.
///
/// `contributions` is sorted by magnitude descending; equal magnitudes keep
/// the model's feature order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub prediction: String,
    pub contributions: Vec<Contribution>,
    /// The raw input, echoed back.
    pub input: RawInput,
    pub explanation_text: String,
    pub source: AttributionSource,
}
