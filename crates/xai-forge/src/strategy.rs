//! Per-family validation and training.
//!
//! [`TrainingStrategy`] is selected from a [`ModelType`] and owns everything
//! family specific: which datasets are acceptable, which trainer runs and how
//! the trained model is scored.
//!
//! | Family         | Trainer                               | Quality metric      |
//! |----------------|---------------------------------------|---------------------|
//! | Classification | multinomial logistic (`linfa-logistic`) | training accuracy |
//! | Regression     | ordinary least squares (`linfa-linear`) | training R²       |

use linfa::DatasetBase;
use linfa::traits::Fit;
use linfa_linear::LinearRegression;
use linfa_logistic::MultiLogisticRegression;
use ndarray::{Array1, Array2};
use tracing::{debug, info};

use crate::config::TrainingConfig;
use crate::dataset::{TargetColumn, TrainingTable};
use crate::error::{Result, XaiError};
use crate::model::{FittedModel, LinearClassifier, LinearRegressor};
use crate::types::ModelType;

/// Training behaviour of one model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingStrategy {
    Classification,
    Regression,
}

impl TrainingStrategy {
    #[must_use]
    pub fn for_model_type(model_type: ModelType) -> Self {
        match model_type {
            ModelType::Classification => TrainingStrategy::Classification,
            ModelType::Regression => TrainingStrategy::Regression,
        }
    }

    #[must_use]
    pub fn model_type(&self) -> ModelType {
        match self {
            TrainingStrategy::Classification => ModelType::Classification,
            TrainingStrategy::Regression => ModelType::Regression,
        }
    }

    /// Human-readable trainer name stored with the model.
    #[must_use]
    pub fn algorithm_name(&self) -> &'static str {
        match self {
            TrainingStrategy::Classification => "Logistic Regression",
            TrainingStrategy::Regression => "Linear Regression",
        }
    }

    /// Name of the metric returned by [`evaluate()`](Self::evaluate).
    #[must_use]
    pub fn metric_name(&self) -> &'static str {
        match self {
            TrainingStrategy::Classification => "accuracy",
            TrainingStrategy::Regression => "r2",
        }
    }

    /// Checks that `table` can be trained on.
    ///
    /// # Errors
    ///
    /// Returns [`XaiError::InvalidDataset`] if the table has no rows or
    /// features, rows of the wrong width, fewer than 2 classes
    /// (classification) or a non-numeric target (regression).
    pub fn validate(&self, table: &TrainingTable) -> Result<()> {
        if table.n_rows() == 0 || table.target.is_empty() {
            return Err(XaiError::InvalidDataset(
                "Dataset cannot be empty".to_string(),
            ));
        }
        if table.n_features() == 0 {
            return Err(XaiError::InvalidDataset(
                "Dataset must have at least one feature".to_string(),
            ));
        }
        if table.target.len() != table.n_rows() {
            return Err(XaiError::InvalidDataset(format!(
                "Dataset has {} rows but {} target values",
                table.n_rows(),
                table.target.len()
            )));
        }
        if let Some(i) = table.rows.iter().position(|r| r.len() != table.n_features()) {
            return Err(XaiError::InvalidDataset(format!(
                "Row {} has {} values, expected {}",
                i + 1,
                table.rows[i].len(),
                table.n_features()
            )));
        }

        match (self, &table.target) {
            (TrainingStrategy::Classification, TargetColumn::Labels(_)) => {
                let classes = table.classes().len();
                if classes < 2 {
                    return Err(XaiError::InvalidDataset(format!(
                        "Classification requires at least 2 classes, found {classes}"
                    )));
                }
                Ok(())
            }
            (TrainingStrategy::Regression, TargetColumn::Values(_)) => Ok(()),
            (TrainingStrategy::Classification, TargetColumn::Values(_)) => Err(
                XaiError::InvalidDataset("Classification requires a label target".to_string()),
            ),
            (TrainingStrategy::Regression, TargetColumn::Labels(_)) => Err(
                XaiError::InvalidDataset(
                    "Regression requires at least one numeric output variable".to_string(),
                ),
            ),
        }
    }

    /// Validates `table` and fits a model on it.
    ///
    /// # Errors
    ///
    /// [`XaiError::InvalidDataset`] from [`validate()`](Self::validate), or
    /// [`XaiError::TrainingFailed`] if the trainer fails or produces
    /// non-finite parameters.
    pub fn train(&self, table: &TrainingTable, config: &TrainingConfig) -> Result<FittedModel> {
        self.validate(table)?;

        info!(
            algorithm = self.algorithm_name(),
            rows = table.n_rows(),
            features = table.n_features(),
            "Training model"
        );

        let records = records(table)?;
        let model = match &table.target {
            TargetColumn::Labels(labels) => train_classifier(table, labels, records, config)?,
            TargetColumn::Values(values) => train_regressor(table, values, records)?,
        };

        debug!(algorithm = self.algorithm_name(), "Training finished");
        Ok(model)
    }

    /// Scores `model` on the data it was trained on.
    ///
    /// # Errors
    ///
    /// Returns [`XaiError::TrainingFailed`] when the metric is undefined, e.g.
    /// R² of a constant target.
    pub fn evaluate(&self, model: &FittedModel, table: &TrainingTable) -> Result<f64> {
        let metric = match (model, &table.target) {
            (FittedModel::Classifier(m), TargetColumn::Labels(labels)) => {
                let correct = table
                    .rows
                    .iter()
                    .zip(labels)
                    .filter(|(row, label)| m.classes[m.predict_index(row)] == **label)
                    .count();
                correct as f64 / table.n_rows() as f64
            }
            (FittedModel::Regressor(m), TargetColumn::Values(values)) => {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                let ss_tot: f64 = values.iter().map(|y| (y - mean).powi(2)).sum();
                let ss_res: f64 = table
                    .rows
                    .iter()
                    .zip(values)
                    .map(|(row, y)| (y - m.predict_dense(row)).powi(2))
                    .sum();
                1.0 - ss_res / ss_tot
            }
            _ => {
                return Err(XaiError::TrainingFailed(
                    "model family does not match the target column".to_string(),
                ));
            }
        };

        if metric.is_finite() {
            Ok(metric)
        } else {
            Err(XaiError::TrainingFailed(format!(
                "{} is undefined for this dataset",
                self.metric_name()
            )))
        }
    }
}

fn records(table: &TrainingTable) -> Result<Array2<f64>> {
    Array2::from_shape_vec((table.n_rows(), table.n_features()), table.rows.concat())
        .map_err(|e| XaiError::TrainingFailed(format!("cannot shape training matrix: {e}")))
}

fn all_finite<'a>(values: impl IntoIterator<Item = &'a f64>) -> bool {
    values.into_iter().all(|v| v.is_finite())
}

fn train_classifier(
    table: &TrainingTable,
    labels: &[String],
    records: Array2<f64>,
    config: &TrainingConfig,
) -> Result<FittedModel> {
    let classes = table.classes();

    // Targets are indices into the sorted class list; the trainer orders its
    // output columns by sorted target value, so column k belongs to classes[k].
    let targets: Array1<usize> = labels
        .iter()
        .map(|label| classes.binary_search(label).unwrap_or_default())
        .collect();

    let fitted = MultiLogisticRegression::default()
        .max_iterations(config.max_iterations)
        .fit(&DatasetBase::new(records, targets))
        .map_err(|e| XaiError::TrainingFailed(e.to_string()))?;

    let params = fitted.params();
    let intercept = fitted.intercept();
    if !all_finite(params.iter()) || !all_finite(intercept.iter()) {
        return Err(XaiError::TrainingFailed(
            "classifier produced non-finite weights".to_string(),
        ));
    }

    let weights = (0..classes.len())
        .map(|k| params.column(k).to_vec())
        .collect();

    info!(classes = classes.len(), "Fitted logistic regression");
    Ok(FittedModel::Classifier(LinearClassifier {
        feature_names: table.feature_names.clone(),
        classes,
        weights,
        intercepts: intercept.to_vec(),
    }))
}

fn train_regressor(
    table: &TrainingTable,
    values: &[f64],
    records: Array2<f64>,
) -> Result<FittedModel> {
    let targets = Array1::from_vec(values.to_vec());

    let fitted = LinearRegression::new()
        .fit(&DatasetBase::new(records, targets))
        .map_err(|e| XaiError::TrainingFailed(e.to_string()))?;

    let weights = fitted.params().to_vec();
    let intercept = fitted.intercept();
    if !all_finite(&weights) || !intercept.is_finite() {
        return Err(XaiError::TrainingFailed(
            "regressor produced non-finite weights".to_string(),
        ));
    }

    info!(outputs = 1, "Fitted linear regression");
    Ok(FittedModel::Regressor(LinearRegressor {
        feature_names: table.feature_names.clone(),
        weights,
        intercept,
    }))
}
