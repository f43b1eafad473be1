//! Metadata storage for datasets and trained models.
//!
//! The [`Catalog`] trait is the seam to whatever persists records (a relational
//! database in a web deployment). [`InMemoryCatalog`] is the bundled
//! implementation, used by the CLI and the tests.
//!
//! Implementations must enforce the dataset to model uniqueness constraint
//! inside [`Catalog::insert_model()`]: of two concurrent inserts for the same
//! dataset exactly one succeeds and the other gets
//! [`CatalogError::ModelBindingExists`].

use chrono::Utc;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::types::{
    Dataset, DatasetId, ModelId, NewDataset, NewTrainedModel, OwnerId, TrainedModel,
};

/// Constraint violations reported by a [`Catalog`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The dataset already has a model bound to it.
    #[error("dataset {dataset_id} already has a model")]
    ModelBindingExists { dataset_id: DatasetId },

    /// The dataset row is gone.
    #[error("dataset {dataset_id} does not exist")]
    DatasetMissing { dataset_id: DatasetId },

    /// The dataset cannot be removed while a model references it.
    #[error("dataset {dataset_id} is still referenced by model {model_id}")]
    ModelStillBound {
        dataset_id: DatasetId,
        model_id: ModelId,
    },
}

/// Storage for [`Dataset`] and [`TrainedModel`] records.
///
/// Lookups taking an `owner` return `None` for records owned by someone else.
pub trait Catalog: Send + Sync {
    /// Stores a dataset and assigns its id and upload time.
    fn insert_dataset(&self, dataset: NewDataset) -> Dataset;

    fn find_dataset(&self, id: DatasetId, owner: OwnerId) -> Option<Dataset>;

    fn list_datasets(&self, owner: OwnerId) -> Vec<Dataset>;

    /// Removes a dataset row. Fails while a model is bound to it.
    fn remove_dataset(&self, id: DatasetId) -> Result<Option<Dataset>, CatalogError>;

    /// The model bound to `dataset_id`, whoever owns it.
    fn find_model_by_dataset(&self, dataset_id: DatasetId) -> Option<TrainedModel>;

    /// Stores a model, enforcing one model per dataset.
    fn insert_model(&self, model: NewTrainedModel) -> Result<TrainedModel, CatalogError>;

    fn find_model(&self, id: ModelId, owner: OwnerId) -> Option<TrainedModel>;

    fn list_models(&self, owner: OwnerId) -> Vec<TrainedModel>;

    fn remove_model(&self, id: ModelId) -> Option<TrainedModel>;
}

#[derive(Debug, Default)]
struct CatalogState {
    last_dataset_id: DatasetId,
    last_model_id: ModelId,
    datasets: BTreeMap<DatasetId, Dataset>,
    models: BTreeMap<ModelId, TrainedModel>,
    model_by_dataset: HashMap<DatasetId, ModelId>,
}

/// [`Catalog`] kept in process memory behind a single lock.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Catalog for InMemoryCatalog {
    fn insert_dataset(&self, dataset: NewDataset) -> Dataset {
        let mut state = self.state.write();
        state.last_dataset_id += 1;

        let record = Dataset {
            id: state.last_dataset_id,
            owner_id: dataset.owner_id,
            file_name: dataset.file_name,
            file_path: dataset.file_path,
            headers: dataset.headers,
            row_count: dataset.row_count,
            uploaded_at: Utc::now(),
        };
        state.datasets.insert(record.id, record.clone());
        record
    }

    fn find_dataset(&self, id: DatasetId, owner: OwnerId) -> Option<Dataset> {
        self.state
            .read()
            .datasets
            .get(&id)
            .filter(|d| d.owner_id == owner)
            .cloned()
    }

    fn list_datasets(&self, owner: OwnerId) -> Vec<Dataset> {
        self.state
            .read()
            .datasets
            .values()
            .filter(|d| d.owner_id == owner)
            .cloned()
            .collect()
    }

    fn remove_dataset(&self, id: DatasetId) -> Result<Option<Dataset>, CatalogError> {
        let mut state = self.state.write();
        if let Some(&model_id) = state.model_by_dataset.get(&id) {
            return Err(CatalogError::ModelStillBound {
                dataset_id: id,
                model_id,
            });
        }
        Ok(state.datasets.remove(&id))
    }

    fn find_model_by_dataset(&self, dataset_id: DatasetId) -> Option<TrainedModel> {
        let state = self.state.read();
        state
            .model_by_dataset
            .get(&dataset_id)
            .and_then(|id| state.models.get(id))
            .cloned()
    }

    fn insert_model(&self, model: NewTrainedModel) -> Result<TrainedModel, CatalogError> {
        // Check and insert under one write lock: this is the uniqueness constraint.
        let mut state = self.state.write();

        if !state.datasets.contains_key(&model.dataset_id) {
            return Err(CatalogError::DatasetMissing {
                dataset_id: model.dataset_id,
            });
        }
        if state.model_by_dataset.contains_key(&model.dataset_id) {
            return Err(CatalogError::ModelBindingExists {
                dataset_id: model.dataset_id,
            });
        }

        state.last_model_id += 1;
        let record = TrainedModel {
            id: state.last_model_id,
            name: model.name,
            model_type: model.model_type,
            dataset_id: model.dataset_id,
            owner_id: model.owner_id,
            feature_names: model.feature_names,
            target_variable: model.target_variable,
            artifact_path: model.artifact_path,
            accuracy: model.accuracy,
            algorithm: model.algorithm,
            trained_at: model.trained_at,
            metadata: model.metadata,
        };
        state.model_by_dataset.insert(record.dataset_id, record.id);
        state.models.insert(record.id, record.clone());
        Ok(record)
    }

    fn find_model(&self, id: ModelId, owner: OwnerId) -> Option<TrainedModel> {
        self.state
            .read()
            .models
            .get(&id)
            .filter(|m| m.owner_id == owner)
            .cloned()
    }

    fn list_models(&self, owner: OwnerId) -> Vec<TrainedModel> {
        self.state
            .read()
            .models
            .values()
            .filter(|m| m.owner_id == owner)
            .cloned()
            .collect()
    }

    fn remove_model(&self, id: ModelId) -> Option<TrainedModel> {
        let mut state = self.state.write();
        let model = state.models.remove(&id)?;
        state.model_by_dataset.remove(&model.dataset_id);
        Some(model)
    }
}

/// Orders deletions against reads of stored models and datasets.
///
/// Readers (prediction, explanation, persisting a freshly trained model) hold
/// [`read()`](Self::read) from record lookup until they are done with the
/// files. Deletions hold [`write()`](Self::write) while removing the file and
/// the row, so a reader sees either both or neither.
#[derive(Debug, Default)]
pub struct DeletionGuard {
    lock: RwLock<()>,
}

impl DeletionGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write()
    }
}
