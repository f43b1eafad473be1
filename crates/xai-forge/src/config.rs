//! Configuration types for training and explanation.
//!
//! This module provides [`TrainingConfig`], [`ExplanationConfig`] and the
//! [`FeatureMultiplierTable`] used by fallback attribution, grouped under
//! [`ForgeConfig`]. Configuration is a plain immutable value: services take it
//! at construction, so several configurations can live in one process.
//!
//! # Example
//!
//! ```
//! use xai_forge::{ExplanationConfig, ForgeConfig};
//!
//! let explanation = ExplanationConfig::builder()
//!     .max_features_in_explanation(5)
//!     .min_contribution_threshold(0.1)
//!     .build()
//!     .expect("valid config");
//!
//! let config = ForgeConfig::from_json_str(r#"{"training": {"max_iterations": 50}}"#)
//!     .expect("valid config");
//! assert_eq!(config.training.max_iterations, 50);
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, XaiError};
use crate::types::ModelType;

/// Multiplier applied to feature names that match no pattern.
pub const DEFAULT_MULTIPLIER: f64 = 1.0;

/// One `pattern -> multiplier` entry of a [`FeatureMultiplierTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplierEntry {
    /// Lowercase name or substring to match.
    pub pattern: String,
    pub multiplier: f64,
}

/// Ordered feature-name to multiplier table.
///
/// Lookup is case-insensitive: an exact match wins, then the first entry (in
/// insertion order) whose pattern is a substring of the name, else
/// [`DEFAULT_MULTIPLIER`].
///
/// # Example
///
/// ```
/// use xai_forge::FeatureMultiplierTable;
///
/// let table = FeatureMultiplierTable::default();
/// assert_eq!(table.multiplier_for("Width_cm"), 2.0);
/// assert_eq!(table.multiplier_for("humidity"), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<MultiplierEntry>", into = "Vec<MultiplierEntry>")]
pub struct FeatureMultiplierTable {
    entries: Vec<MultiplierEntry>,
}

impl FeatureMultiplierTable {
    /// Builds a table from `(pattern, multiplier)` pairs, lowercasing patterns.
    ///
    /// Later duplicates of a pattern are kept but never reached by lookup.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(pattern, multiplier)| MultiplierEntry {
                    pattern: pattern.into().to_lowercase(),
                    multiplier,
                })
                .collect(),
        }
    }

    /// A table that maps every name to [`DEFAULT_MULTIPLIER`].
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Multiplier for `feature_name`.
    #[must_use]
    pub fn multiplier_for(&self, feature_name: &str) -> f64 {
        let name = feature_name.to_lowercase();

        if let Some(entry) = self.entries.iter().find(|e| e.pattern == name) {
            return entry.multiplier;
        }

        self.entries
            .iter()
            .find(|e| name.contains(e.pattern.as_str()))
            .map_or(DEFAULT_MULTIPLIER, |e| e.multiplier)
    }

    pub fn entries(&self) -> &[MultiplierEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn validate(&self) -> Result<()> {
        for entry in &self.entries {
            if entry.pattern.is_empty() {
                return Err(XaiError::InvalidConfig(
                    "feature multiplier patterns must not be empty".to_string(),
                ));
            }
            if !entry.multiplier.is_finite() || entry.multiplier < 0.0 {
                return Err(XaiError::InvalidConfig(format!(
                    "feature multiplier for '{}' must be a finite, non-negative number",
                    entry.pattern
                )));
            }
        }
        Ok(())
    }
}

impl Default for FeatureMultiplierTable {
    fn default() -> Self {
        Self::new([
            ("score", 1.5),
            ("grade", 1.5),
            ("age", 1.2),
            ("year", 1.2),
            ("length", 2.0),
            ("width", 2.0),
            ("color", 1.8),
            ("type", 1.8),
            ("size", 1.5),
            ("area", 1.5),
            ("count", 1.3),
            ("number", 1.3),
        ])
    }
}

impl From<Vec<MultiplierEntry>> for FeatureMultiplierTable {
    fn from(entries: Vec<MultiplierEntry>) -> Self {
        Self::new(entries.into_iter().map(|e| (e.pattern, e.multiplier)))
    }
}

impl From<FeatureMultiplierTable> for Vec<MultiplierEntry> {
    fn from(table: FeatureMultiplierTable) -> Self {
        table.entries
    }
}

/// Configuration for explanation generation.
///
/// Use [`ExplanationConfig::builder()`] to construct a validated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplanationConfig {
    /// Scale applied to fallback contributions of regression models (default: 1.0).
    pub regression_base_factor: f64,

    /// Scale applied to fallback contributions of classification models (default: 1.0).
    pub classification_base_factor: f64,

    /// Multipliers used by fallback attribution.
    pub feature_multipliers: FeatureMultiplierTable,

    /// Whether fallback attribution may be used at all (default: true).
    ///
    /// When disabled and model weights cannot be used, explanation fails with
    /// [`XaiError::ExplanationUnavailable`].
    pub enable_fallback_explanation: bool,

    /// Whether to read weights from the fitted model (default: true).
    ///
    /// Disabling this forces the fallback path.
    pub use_model_weights: bool,

    /// Maximum number of contributions reported (default: 10).
    pub max_features_in_explanation: usize,

    /// Contributions below this magnitude are dropped (default: 0.01).
    pub min_contribution_threshold: f64,
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            regression_base_factor: 1.0,
            classification_base_factor: 1.0,
            feature_multipliers: FeatureMultiplierTable::default(),
            enable_fallback_explanation: true,
            use_model_weights: true,
            max_features_in_explanation: 10,
            min_contribution_threshold: 0.01,
        }
    }
}

impl ExplanationConfig {
    #[must_use]
    pub fn builder() -> ExplanationConfigBuilder {
        ExplanationConfigBuilder::default()
    }

    /// Base factor for `model_type`.
    #[must_use]
    pub fn base_factor(&self, model_type: ModelType) -> f64 {
        match model_type {
            ModelType::Classification => self.classification_base_factor,
            ModelType::Regression => self.regression_base_factor,
        }
    }

    /// Checks every setting.
    ///
    /// # Errors
    ///
    /// Returns [`XaiError::InvalidConfig`] if:
    /// - a base factor is not finite and positive
    /// - `max_features_in_explanation` is 0
    /// - `min_contribution_threshold` is negative or not finite
    /// - a multiplier pattern is empty or its multiplier is invalid
    pub fn validate(&self) -> Result<()> {
        for (name, factor) in [
            ("regression_base_factor", self.regression_base_factor),
            ("classification_base_factor", self.classification_base_factor),
        ] {
            if !factor.is_finite() || factor <= 0.0 {
                return Err(XaiError::InvalidConfig(format!(
                    "{name} must be a finite, positive number"
                )));
            }
        }

        if self.max_features_in_explanation == 0 {
            return Err(XaiError::InvalidConfig(
                "max_features_in_explanation must be at least 1".to_string(),
            ));
        }

        if !self.min_contribution_threshold.is_finite() || self.min_contribution_threshold < 0.0 {
            return Err(XaiError::InvalidConfig(
                "min_contribution_threshold must be a finite, non-negative number".to_string(),
            ));
        }

        self.feature_multipliers.validate()
    }
}

/// Builder for [`ExplanationConfig`].
#[derive(Debug, Clone, Default)]
pub struct ExplanationConfigBuilder {
    config: ExplanationConfig,
}

impl ExplanationConfigBuilder {
    #[must_use]
    pub fn regression_base_factor(mut self, factor: f64) -> Self {
        self.config.regression_base_factor = factor;
        self
    }

    #[must_use]
    pub fn classification_base_factor(mut self, factor: f64) -> Self {
        self.config.classification_base_factor = factor;
        self
    }

    /// Replace the multiplier table.
    #[must_use]
    pub fn feature_multipliers(mut self, table: FeatureMultiplierTable) -> Self {
        self.config.feature_multipliers = table;
        self
    }

    #[must_use]
    pub fn enable_fallback_explanation(mut self, enable: bool) -> Self {
        self.config.enable_fallback_explanation = enable;
        self
    }

    #[must_use]
    pub fn use_model_weights(mut self, enable: bool) -> Self {
        self.config.use_model_weights = enable;
        self
    }

    /// # Panics
    ///
    /// Does not panic, but [`build()`](Self::build) will return an error if `max < 1`.
    #[must_use]
    pub fn max_features_in_explanation(mut self, max: usize) -> Self {
        self.config.max_features_in_explanation = max;
        self
    }

    #[must_use]
    pub fn min_contribution_threshold(mut self, threshold: f64) -> Self {
        self.config.min_contribution_threshold = threshold;
        self
    }

    /// Build the configuration, validating all settings.
    ///
    /// # Errors
    ///
    /// See [`ExplanationConfig::validate()`].
    pub fn build(self) -> Result<ExplanationConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration for the training workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Directory receiving serialized models (default: `uploads/models`).
    pub models_dir: PathBuf,

    /// Upper bound on a single training run, in milliseconds (default: 300000).
    ///
    /// The caller stops waiting when this elapses, but the fit itself cannot
    /// be interrupted: its worker thread keeps running until the trainer
    /// returns and holds one of the `max_concurrent_fits` slots until then.
    pub training_timeout_ms: u64,

    /// Iteration cap passed to the iterative classifier (default: 100).
    pub max_iterations: u64,

    /// Fit workers allowed to run at once, timed-out ones included (default: 4).
    pub max_concurrent_fits: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("uploads").join("models"),
            training_timeout_ms: 300_000,
            max_iterations: 100,
            max_concurrent_fits: 4,
        }
    }
}

impl TrainingConfig {
    #[must_use]
    pub fn builder() -> TrainingConfigBuilder {
        TrainingConfigBuilder::default()
    }

    #[must_use]
    pub fn training_timeout(&self) -> Duration {
        Duration::from_millis(self.training_timeout_ms)
    }

    /// Checks every setting.
    ///
    /// # Errors
    ///
    /// Returns [`XaiError::InvalidConfig`] if:
    /// - `models_dir` is empty
    /// - `training_timeout_ms` is 0
    /// - `max_iterations` is 0
    /// - `max_concurrent_fits` is 0
    pub fn validate(&self) -> Result<()> {
        if self.models_dir.as_os_str().is_empty() {
            return Err(XaiError::InvalidConfig(
                "models_dir must not be empty".to_string(),
            ));
        }

        if self.training_timeout_ms == 0 {
            return Err(XaiError::InvalidConfig(
                "training_timeout_ms must be at least 1".to_string(),
            ));
        }

        if self.max_iterations == 0 {
            return Err(XaiError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        if self.max_concurrent_fits == 0 {
            return Err(XaiError::InvalidConfig(
                "max_concurrent_fits must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`TrainingConfig`].
#[derive(Debug, Clone, Default)]
pub struct TrainingConfigBuilder {
    config: TrainingConfig,
}

impl TrainingConfigBuilder {
    #[must_use]
    pub fn models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.models_dir = dir.into();
        self
    }

    #[must_use]
    pub fn training_timeout(mut self, timeout: Duration) -> Self {
        self.config.training_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn max_iterations(mut self, iterations: u64) -> Self {
        self.config.max_iterations = iterations;
        self
    }

    #[must_use]
    pub fn max_concurrent_fits(mut self, fits: usize) -> Self {
        self.config.max_concurrent_fits = fits;
        self
    }

    /// Build the configuration, validating all settings.
    ///
    /// # Errors
    ///
    /// See [`TrainingConfig::validate()`].
    pub fn build(self) -> Result<TrainingConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Complete configuration, as loaded from a JSON file.
///
/// Missing sections and fields take their defaults.
///
/// ```json
/// {
///   "training": { "models_dir": "/var/lib/xai/models", "training_timeout_ms": 60000 },
///   "explanation": {
///     "max_features_in_explanation": 5,
///     "feature_multipliers": [{ "pattern": "width", "multiplier": 2.0 }]
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub training: TrainingConfig,
    pub explanation: ExplanationConfig,
}

impl ForgeConfig {
    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`XaiError::Json`] for malformed JSON and
    /// [`XaiError::InvalidConfig`] for out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ForgeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// As [`from_json_str()`](Self::from_json_str), plus [`XaiError::Io`] if
    /// the file cannot be read.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.training.validate()?;
        self.explanation.validate()
    }
}
