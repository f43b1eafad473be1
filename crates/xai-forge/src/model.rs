//! Fitted models and their inference.
//!
//! This module provides [`FittedModel`], the in-memory form of a trained
//! model. It is what [`ModelArtifactStore`](crate::ModelArtifactStore) writes
//! and reads, and what prediction and explanation run against.
//!
//! Both families are linear:
//!
//! - [`LinearClassifier`]: one weight row and intercept per class; class
//!   scores are softmax-normalized into probabilities
//! - [`LinearRegressor`]: one weight per feature plus an intercept
//!
//! # Missing features
//!
//! Inference builds a dense input from the model's own feature list. A feature
//! absent from the [`FeatureVector`] contributes 0 to every score.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{FeatureVector, ModelType};

/// A trained model ready for inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedModel {
    Classifier(LinearClassifier),
    Regressor(LinearRegressor),
}

/// Multinomial logistic model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearClassifier {
    pub feature_names: Vec<String>,
    /// Class labels, sorted.
    pub classes: Vec<String>,
    /// `weights[k][j]` is the weight of feature `j` for class `k`.
    pub weights: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

/// Ordinary least-squares linear model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressor {
    pub feature_names: Vec<String>,
    pub weights: Vec<f64>,
    pub intercept: f64,
}

/// Raw output of [`FittedModel::infer()`].
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    Class {
        label: String,
        /// Probability of `label`.
        confidence: f64,
        /// Probability per class; sums to 1.0.
        probabilities: BTreeMap<String, f64>,
    },
    Value(f64),
}

impl ModelOutput {
    /// The prediction as the string handed back to clients.
    ///
    /// Regression values use Rust's shortest round-trip float formatting.
    #[must_use]
    pub fn prediction_string(&self) -> String {
        match self {
            ModelOutput::Class { label, .. } => label.clone(),
            ModelOutput::Value(value) => value.to_string(),
        }
    }
}

fn dense(feature_names: &[String], vector: &FeatureVector) -> Vec<f64> {
    feature_names
        .iter()
        .map(|name| vector.get(name).unwrap_or(0.0))
        .collect()
}

fn dot(weights: &[f64], x: &[f64]) -> f64 {
    weights.iter().zip(x).map(|(w, v)| w * v).sum()
}

/// Numerically stable softmax.
fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

impl LinearClassifier {
    /// Unnormalized score per class, in `classes` order.
    #[must_use]
    pub fn scores(&self, vector: &FeatureVector) -> Vec<f64> {
        let x = dense(&self.feature_names, vector);
        self.weights
            .iter()
            .zip(&self.intercepts)
            .map(|(row, b)| dot(row, &x) + b)
            .collect()
    }

    /// Index of the most probable class. Ties go to the first class.
    fn argmax(probabilities: &[f64]) -> usize {
        probabilities
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(best, best_p), (k, &p)| {
                if p > best_p { (k, p) } else { (best, best_p) }
            })
            .0
    }

    /// Index into `classes` of the predicted label for a dense row.
    pub(crate) fn predict_index(&self, x: &[f64]) -> usize {
        let scores: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.intercepts)
            .map(|(row, b)| dot(row, x) + b)
            .collect();
        Self::argmax(&scores)
    }

    fn infer(&self, vector: &FeatureVector) -> ModelOutput {
        let probabilities = softmax(&self.scores(vector));
        let best = Self::argmax(&probabilities);

        ModelOutput::Class {
            label: self.classes[best].clone(),
            confidence: probabilities[best],
            probabilities: self.classes.iter().cloned().zip(probabilities).collect(),
        }
    }
}

impl LinearRegressor {
    pub(crate) fn predict_dense(&self, x: &[f64]) -> f64 {
        dot(&self.weights, x) + self.intercept
    }

    #[must_use]
    pub fn predict(&self, vector: &FeatureVector) -> f64 {
        self.predict_dense(&dense(&self.feature_names, vector))
    }
}

impl FittedModel {
    #[must_use]
    pub fn model_type(&self) -> ModelType {
        match self {
            FittedModel::Classifier(_) => ModelType::Classification,
            FittedModel::Regressor(_) => ModelType::Regression,
        }
    }

    /// Features in the order the model was trained on.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        match self {
            FittedModel::Classifier(m) => &m.feature_names,
            FittedModel::Regressor(m) => &m.feature_names,
        }
    }

    /// Runs inference on an encoded row.
    #[must_use]
    pub fn infer(&self, vector: &FeatureVector) -> ModelOutput {
        match self {
            FittedModel::Classifier(m) => m.infer(vector),
            FittedModel::Regressor(m) => ModelOutput::Value(m.predict(vector)),
        }
    }

    /// Per-feature weights relevant to the prediction for `vector`.
    ///
    /// For a classifier these are the weights of the predicted class. Returns
    /// `None` when any weight is not finite, so attribution can fall back.
    #[must_use]
    pub fn feature_weights(&self, vector: &FeatureVector) -> Option<&[f64]> {
        let weights: &[f64] = match self {
            FittedModel::Classifier(m) => {
                let x = dense(&m.feature_names, vector);
                m.weights.get(m.predict_index(&x))?.as_slice()
            }
            FittedModel::Regressor(m) => m.weights.as_slice(),
        };

        weights.iter().all(|w| w.is_finite()).then_some(weights)
    }

    /// Checks that dimensions agree with each other.
    ///
    /// # Errors
    ///
    /// Returns a description of the first mismatch found.
    pub fn check_consistency(&self) -> Result<(), String> {
        match self {
            FittedModel::Classifier(m) => {
                let n = m.feature_names.len();
                if n == 0 {
                    return Err("classifier has no features".to_string());
                }
                if m.classes.len() < 2 {
                    return Err(format!("classifier has {} classes", m.classes.len()));
                }
                if m.weights.len() != m.classes.len() || m.intercepts.len() != m.classes.len() {
                    return Err(format!(
                        "expected {} weight rows and intercepts, found {} and {}",
                        m.classes.len(),
                        m.weights.len(),
                        m.intercepts.len()
                    ));
                }
                if let Some(row) = m.weights.iter().find(|row| row.len() != n) {
                    return Err(format!(
                        "weight row has {} entries for {n} features",
                        row.len()
                    ));
                }
                Ok(())
            }
            FittedModel::Regressor(m) => {
                if m.feature_names.is_empty() {
                    return Err("regressor has no features".to_string());
                }
                if m.weights.len() != m.feature_names.len() {
                    return Err(format!(
                        "{} weights for {} features",
                        m.weights.len(),
                        m.feature_names.len()
                    ));
                }
                Ok(())
            }
        }
    }
}
