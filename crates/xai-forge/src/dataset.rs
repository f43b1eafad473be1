//! Dataset registration and training-table loading.
//!
//! [`DatasetService`] records uploaded CSV files in the [`Catalog`] and deletes
//! them again. [`load_training_table()`] turns a registered file into the
//! numeric [`TrainingTable`] the trainers consume.
//!
//! Feature cells go through [`FeatureVectorizer::encode_value()`], the same
//! rule used at inference, so a value encodes identically in both places.

use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::artifact::{ModelArtifactStore, remove_file_if_exists};
use crate::catalog::{Catalog, CatalogError, DeletionGuard};
use crate::error::{Result, XaiError};
use crate::types::{Dataset, DatasetId, ModelType, NewDataset, OwnerId};
use crate::vectorizer::FeatureVectorizer;

/// Target column of a [`TrainingTable`].
#[derive(Debug, Clone, PartialEq)]
pub enum TargetColumn {
    /// Class labels, trimmed.
    Labels(Vec<String>),
    /// Numeric outputs.
    Values(Vec<f64>),
}

impl TargetColumn {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            TargetColumn::Labels(labels) => labels.len(),
            TargetColumn::Values(values) => values.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Encoded rows ready for training.
///
/// `rows[i][j]` is the value of `feature_names[j]` in row `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingTable {
    pub feature_names: Vec<String>,
    pub target_name: String,
    pub rows: Vec<Vec<f64>>,
    pub target: TargetColumn,
}

impl TrainingTable {
    pub fn new(
        feature_names: Vec<String>,
        target_name: impl Into<String>,
        rows: Vec<Vec<f64>>,
        target: TargetColumn,
    ) -> Self {
        Self {
            feature_names,
            target_name: target_name.into(),
            rows,
            target,
        }
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Distinct class labels, sorted. Empty for numeric targets.
    #[must_use]
    pub fn classes(&self) -> Vec<String> {
        match &self.target {
            TargetColumn::Labels(labels) => {
                let mut classes = labels.clone();
                classes.sort();
                classes.dedup();
                classes
            }
            TargetColumn::Values(_) => Vec::new(),
        }
    }
}

/// Checks the requested columns against the dataset headers.
///
/// # Errors
///
/// Returns [`XaiError::InvalidRequest`] if the feature list is empty or has
/// duplicates, a column is not a header, or the target is also a feature.
pub fn validate_columns(headers: &[String], feature_names: &[String], target: &str) -> Result<()> {
    if feature_names.is_empty() {
        return Err(XaiError::InvalidRequest(
            "At least one feature must be selected".to_string(),
        ));
    }

    let known: HashSet<&str> = headers.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();

    for name in feature_names {
        if !known.contains(name.as_str()) {
            return Err(XaiError::InvalidRequest(format!(
                "Feature '{name}' is not a column of the dataset"
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(XaiError::InvalidRequest(format!(
                "Feature '{name}' is selected more than once"
            )));
        }
    }

    if !known.contains(target) {
        return Err(XaiError::InvalidRequest(format!(
            "Target '{target}' is not a column of the dataset"
        )));
    }
    if seen.contains(target) {
        return Err(XaiError::InvalidRequest(format!(
            "Target '{target}' cannot also be a feature"
        )));
    }

    Ok(())
}

fn read_csv(path: &Path) -> Result<DataFrame> {
    // Zero-length schema inference reads every column as String.
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// Trimmed cell values of one column; empty or null cells are rejected.
fn string_cells(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = df.column(name)?.as_materialized_series();
    let cells = series.str()?;

    cells
        .into_iter()
        .enumerate()
        .map(|(i, cell)| match cell.map(str::trim) {
            Some(value) if !value.is_empty() => Ok(value.to_string()),
            _ => Err(XaiError::InvalidDataset(format!(
                "Column '{name}' has an empty value in row {}",
                i + 1
            ))),
        })
        .collect()
}

/// Loads the requested columns of `dataset` into a [`TrainingTable`].
///
/// Column names are checked against the stored headers before the file is
/// read. Regression targets must parse as finite numbers.
///
/// # Errors
///
/// - [`XaiError::InvalidRequest`]: see [`validate_columns()`]
/// - [`XaiError::InvalidDataset`]: empty cells, non-numeric regression target
/// - [`XaiError::Polars`] / [`XaiError::Io`]: the file cannot be parsed
pub fn load_training_table(
    dataset: &Dataset,
    feature_names: &[String],
    target: &str,
    model_type: ModelType,
) -> Result<TrainingTable> {
    validate_columns(&dataset.headers, feature_names, target)?;

    let df = read_csv(&dataset.file_path)?;
    debug!(
        dataset_id = dataset.id,
        rows = df.height(),
        columns = df.width(),
        "Read dataset file"
    );

    let mut rows = vec![Vec::with_capacity(feature_names.len()); df.height()];
    for name in feature_names {
        for (row, cell) in rows.iter_mut().zip(string_cells(&df, name)?) {
            row.push(FeatureVectorizer::encode_value(&cell).value());
        }
    }

    let labels = string_cells(&df, target)?;
    let target_column = match model_type {
        ModelType::Classification => TargetColumn::Labels(labels),
        ModelType::Regression => TargetColumn::Values(
            labels
                .iter()
                .enumerate()
                .map(|(i, label)| match label.parse::<f64>() {
                    Ok(v) if v.is_finite() => Ok(v),
                    _ => Err(XaiError::InvalidDataset(format!(
                        "Regression target '{target}' has a non-numeric value '{label}' in row {}",
                        i + 1
                    ))),
                })
                .collect::<Result<Vec<f64>>>()?,
        ),
    };

    Ok(TrainingTable::new(
        feature_names.to_vec(),
        target,
        rows,
        target_column,
    ))
}

fn is_csv(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

/// Registers, looks up and deletes uploaded datasets.
pub struct DatasetService {
    catalog: Arc<dyn Catalog>,
    artifacts: ModelArtifactStore,
    guard: Arc<DeletionGuard>,
}

impl DatasetService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        artifacts: ModelArtifactStore,
        guard: Arc<DeletionGuard>,
    ) -> Self {
        Self {
            catalog,
            artifacts,
            guard,
        }
    }

    /// Records an uploaded CSV file.
    ///
    /// The file is parsed once to capture its headers and row count.
    ///
    /// # Errors
    ///
    /// Returns [`XaiError::InvalidDataset`] if `file_name` is not a `.csv`, or
    /// the file is empty, unparseable or has no header row.
    pub fn register_dataset(
        &self,
        owner: OwnerId,
        file_name: &str,
        path: impl Into<PathBuf>,
    ) -> Result<Dataset> {
        let path = path.into();

        if !is_csv(file_name) {
            return Err(XaiError::InvalidDataset(format!(
                "Only CSV files are supported, got '{file_name}'"
            )));
        }

        let df = read_csv(&path).map_err(|e| match e {
            XaiError::Polars(e) => {
                XaiError::InvalidDataset(format!("Cannot parse '{file_name}': {e}"))
            }
            other => other,
        })?;

        let headers: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        if headers.is_empty() {
            return Err(XaiError::InvalidDataset(format!(
                "'{file_name}' has no header row"
            )));
        }

        let dataset = self.catalog.insert_dataset(NewDataset {
            owner_id: owner,
            file_name: file_name.to_string(),
            file_path: path,
            headers,
            row_count: df.height(),
        });

        info!(
            dataset_id = dataset.id,
            owner_id = owner,
            rows = dataset.row_count,
            columns = dataset.headers.len(),
            "Registered dataset"
        );
        Ok(dataset)
    }

    /// # Errors
    ///
    /// [`XaiError::DatasetNotFound`] if absent or owned by someone else.
    pub fn get_dataset(&self, id: DatasetId, owner: OwnerId) -> Result<Dataset> {
        self.catalog
            .find_dataset(id, owner)
            .ok_or(XaiError::DatasetNotFound { id })
    }

    pub fn list_datasets(&self, owner: OwnerId) -> Vec<Dataset> {
        self.catalog.list_datasets(owner)
    }

    /// Deletes a dataset together with its model, if any.
    ///
    /// Files are removed before their rows. If a file cannot be removed the
    /// call fails with [`XaiError::ArtifactDeleteFailed`] and the rows that
    /// still reference it stay in place.
    ///
    /// # Errors
    ///
    /// [`XaiError::DatasetNotFound`] or [`XaiError::ArtifactDeleteFailed`].
    /// [`XaiError::DatasetInUse`] if a model was bound to the dataset after
    /// the cascade ran, which only an external [`Catalog`] can allow.
    pub fn delete_dataset(&self, id: DatasetId, owner: OwnerId) -> Result<()> {
        let _exclusive = self.guard.write();

        let dataset = self.get_dataset(id, owner)?;

        if let Some(model) = self.catalog.find_model_by_dataset(id) {
            self.artifacts.delete(&model.artifact_path)?;
            self.catalog.remove_model(model.id);
            info!(model_id = model.id, dataset_id = id, "Deleted model with its dataset");
        }

        remove_file_if_exists(&dataset.file_path)?;
        self.catalog.remove_dataset(id).map_err(|e| match e {
            CatalogError::ModelStillBound {
                dataset_id,
                model_id,
            } => XaiError::DatasetInUse {
                dataset_id,
                model_id,
            },
            CatalogError::DatasetMissing { dataset_id }
            | CatalogError::ModelBindingExists { dataset_id } => {
                XaiError::DatasetNotFound { id: dataset_id }
            }
        })?;

        info!(dataset_id = id, owner_id = owner, "Deleted dataset");
        Ok(())
    }
}
