//! The train-and-persist workflow.
//!
//! [`TrainingOrchestrator::train_model()`] runs these steps in order and
//! stops at the first failure:
//!
//! 1. Resolve the dataset for the owner
//! 2. Refuse if the dataset already has a model
//! 3. Parse the model type tag
//! 4. Load the requested columns (unknown columns fail here, before training)
//! 5. Validate and fit under the configured timeout
//! 6. Write the artifact, score the model (best-effort), insert the record
//!
//! Nothing is persisted before step 6. If the record insert loses a race for
//! the dataset, the freshly written artifact is removed again and the caller
//! gets [`XaiError::ModelAlreadyExists`].

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::artifact::ModelArtifactStore;
use crate::catalog::{Catalog, CatalogError, DeletionGuard};
use crate::config::TrainingConfig;
use crate::dataset::{TrainingTable, load_training_table};
use crate::error::{Result, XaiError};
use crate::model::FittedModel;
use crate::strategy::TrainingStrategy;
use crate::types::{ModelId, ModelType, NewTrainedModel, OwnerId, TrainRequest, TrainedModel};

/// Counts fit workers that are still running, including those whose caller
/// already gave up after a timeout.
#[derive(Debug, Default)]
struct FitSlots {
    running: AtomicUsize,
}

/// One occupied slot, released when the worker holding it finishes.
struct FitPermit(Arc<FitSlots>);

impl FitSlots {
    fn try_acquire(self: &Arc<Self>, limit: usize) -> Option<FitPermit> {
        self.running
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()
            .map(|_| FitPermit(Arc::clone(self)))
    }

    fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for FitPermit {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Trains models, and looks up and deletes them afterwards.
pub struct TrainingOrchestrator {
    catalog: Arc<dyn Catalog>,
    artifacts: ModelArtifactStore,
    guard: Arc<DeletionGuard>,
    config: TrainingConfig,
    slots: Arc<FitSlots>,
}

impl TrainingOrchestrator {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        artifacts: ModelArtifactStore,
        guard: Arc<DeletionGuard>,
        config: TrainingConfig,
    ) -> Self {
        Self {
            catalog,
            artifacts,
            guard,
            config,
            slots: Arc::default(),
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Trains a model on a registered dataset and records it.
    ///
    /// # Errors
    ///
    /// - [`XaiError::DatasetNotFound`]: no such dataset for `owner`
    /// - [`XaiError::ModelAlreadyExists`]: the dataset already has a model,
    ///   including when a concurrent call wins the race
    /// - [`XaiError::UnknownModelType`]: the type tag is not recognized
    /// - [`XaiError::InvalidRequest`]: bad model name or column selection
    /// - [`XaiError::InvalidDataset`]: the data cannot train this family
    /// - [`XaiError::TrainingFailed`] / [`XaiError::TrainingTimeout`]
    /// - [`XaiError::TrainingBusy`]: `max_concurrent_fits` workers are running
    /// - [`XaiError::Io`]: the artifact cannot be written
    pub fn train_model(&self, request: &TrainRequest, owner: OwnerId) -> Result<TrainedModel> {
        let dataset = self
            .catalog
            .find_dataset(request.dataset_id, owner)
            .ok_or(XaiError::DatasetNotFound {
                id: request.dataset_id,
            })?;

        if self.catalog.find_model_by_dataset(dataset.id).is_some() {
            return Err(XaiError::ModelAlreadyExists {
                dataset_id: dataset.id,
            });
        }

        let model_type: ModelType = request.model_type.parse()?;

        if request.model_name.trim().is_empty() {
            return Err(XaiError::InvalidRequest(
                "Model name must not be empty".to_string(),
            ));
        }

        let table = Arc::new(load_training_table(
            &dataset,
            &request.feature_names,
            &request.target_variable,
            model_type,
        )?);

        let strategy = TrainingStrategy::for_model_type(model_type);
        info!(
            dataset_id = dataset.id,
            model_type = %model_type,
            rows = table.n_rows(),
            features = table.n_features(),
            "Starting training"
        );

        let started = Instant::now();
        let fitted = self.fit_with_timeout(strategy, Arc::clone(&table))?;
        let training_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        // Held from artifact write to record insert so a concurrent dataset
        // delete cannot interleave.
        let _shared = self.guard.read();

        let artifact_path = self.artifacts.save(&fitted, &request.model_name)?;

        let accuracy = match strategy.evaluate(&fitted, &table) {
            Ok(metric) => Some(metric),
            Err(e) => {
                warn!(dataset_id = dataset.id, error = %e, "Could not compute quality metric");
                None
            }
        };

        let classes = match &fitted {
            FittedModel::Classifier(m) => json!(m.classes),
            FittedModel::Regressor(_) => serde_json::Value::Null,
        };

        let inserted = self.catalog.insert_model(NewTrainedModel {
            name: request.model_name.trim().to_string(),
            model_type,
            dataset_id: dataset.id,
            owner_id: dataset.owner_id,
            feature_names: request.feature_names.clone(),
            target_variable: request.target_variable.clone(),
            artifact_path: artifact_path.clone(),
            accuracy,
            algorithm: strategy.algorithm_name().to_string(),
            trained_at: Utc::now(),
            metadata: json!({
                "rows": table.n_rows(),
                "features": table.n_features(),
                "classes": classes,
                "metric": strategy.metric_name(),
                "training_ms": training_ms,
            }),
        });

        match inserted {
            Ok(model) => {
                info!(
                    model_id = model.id,
                    dataset_id = dataset.id,
                    accuracy = ?model.accuracy,
                    training_ms,
                    "Model trained"
                );
                Ok(model)
            }
            Err(conflict) => {
                if let Err(e) = self.artifacts.delete(&artifact_path) {
                    error!(path = %artifact_path.display(), error = %e, "Failed to remove orphaned artifact");
                }
                Err(match conflict {
                    CatalogError::DatasetMissing { dataset_id } => {
                        XaiError::DatasetNotFound { id: dataset_id }
                    }
                    CatalogError::ModelBindingExists { dataset_id }
                    | CatalogError::ModelStillBound { dataset_id, .. } => {
                        XaiError::ModelAlreadyExists { dataset_id }
                    }
                })
            }
        }
    }

    /// Runs the fit on a worker thread and waits at most the configured timeout.
    ///
    /// On timeout the worker is left to finish on its own; its result is
    /// dropped and nothing it produced is persisted. The worker keeps its fit
    /// slot until it returns.
    fn fit_with_timeout(
        &self,
        strategy: TrainingStrategy,
        table: Arc<TrainingTable>,
    ) -> Result<FittedModel> {
        let limit = self.config.max_concurrent_fits;
        let permit = self.slots.try_acquire(limit).ok_or_else(|| {
            warn!(limit, "All training slots are busy");
            XaiError::TrainingBusy { limit }
        })?;

        let timeout = self.config.training_timeout();
        let config = self.config.clone();
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("xai-forge-train".to_string())
            .spawn(move || {
                let result = strategy.train(&table, &config);
                drop(permit);
                // The receiver is gone after a timeout.
                let _ = tx.send(result);
            })?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.config.training_timeout_ms,
                    running_fits = self.slots.running(),
                    "Training timed out"
                );
                Err(XaiError::TrainingTimeout { timeout })
            }
            Err(RecvTimeoutError::Disconnected) => Err(XaiError::TrainingFailed(
                "training worker stopped without a result".to_string(),
            )),
        }
    }

    /// # Errors
    ///
    /// [`XaiError::ModelNotFound`] if absent or owned by someone else.
    pub fn get_model(&self, id: ModelId, owner: OwnerId) -> Result<TrainedModel> {
        self.catalog
            .find_model(id, owner)
            .ok_or(XaiError::ModelNotFound { id })
    }

    pub fn list_models(&self, owner: OwnerId) -> Vec<TrainedModel> {
        self.catalog.list_models(owner)
    }

    /// Deletes a model's artifact, then its record.
    ///
    /// # Errors
    ///
    /// [`XaiError::ModelNotFound`], or [`XaiError::ArtifactDeleteFailed`] in
    /// which case the record is kept.
    pub fn delete_model(&self, id: ModelId, owner: OwnerId) -> Result<()> {
        let _exclusive = self.guard.write();

        let model = self.get_model(id, owner)?;
        self.artifacts.delete(&model.artifact_path)?;
        self.catalog.remove_model(model.id);

        info!(model_id = id, dataset_id = model.dataset_id, "Deleted model");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fit_slots_are_bounded_and_released() {
        let slots = Arc::new(FitSlots::default());

        let first = slots.try_acquire(2).unwrap();
        let second = slots.try_acquire(2).unwrap();
        assert!(slots.try_acquire(2).is_none());
        assert_eq!(slots.running(), 2);

        drop(first);
        assert_eq!(slots.running(), 1);
        let third = slots.try_acquire(2).unwrap();

        drop(second);
        drop(third);
        assert_eq!(slots.running(), 0);
    }

    #[test]
    fn test_slot_outlives_caller_until_worker_finishes() {
        let slots = Arc::new(FitSlots::default());
        let permit = slots.try_acquire(1).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let worker = thread::spawn(move || {
            let _permit = permit;
            let _ = release_rx.recv();
        });

        // The caller has stopped waiting but the worker still runs.
        assert!(slots.try_acquire(1).is_none());

        release_tx.send(()).unwrap();
        worker.join().unwrap();
        assert_eq!(slots.running(), 0);
        assert!(slots.try_acquire(1).is_some());
    }

    #[test]
    fn test_full_slots_reject_training_before_fitting() {
        let dir = tempfile::TempDir::new().unwrap();
        let csv = dir.path().join("d.csv");
        std::fs::write(&csv, "x,y\n1,2\n2,4\n3,6\n").unwrap();

        let catalog: Arc<dyn Catalog> = Arc::new(crate::catalog::InMemoryCatalog::new());
        let artifacts = ModelArtifactStore::new(dir.path().join("models"));
        let guard = Arc::new(DeletionGuard::new());
        let datasets = crate::dataset::DatasetService::new(
            Arc::clone(&catalog),
            artifacts.clone(),
            Arc::clone(&guard),
        );
        let dataset = datasets.register_dataset(1, "d.csv", &csv).unwrap();

        let config = TrainingConfig::builder()
            .models_dir(dir.path().join("models"))
            .training_timeout(Duration::from_secs(30))
            .max_concurrent_fits(1)
            .build()
            .unwrap();
        let trainer = TrainingOrchestrator::new(catalog, artifacts, guard, config);
        let request = TrainRequest {
            dataset_id: dataset.id,
            model_name: "m".to_string(),
            target_variable: "y".to_string(),
            feature_names: vec!["x".to_string()],
            model_type: "REGRESSION".to_string(),
        };

        // A timed-out worker still holding the only slot.
        let held = trainer.slots.try_acquire(1).unwrap();
        let err = trainer.train_model(&request, 1).unwrap_err();
        assert!(matches!(err, XaiError::TrainingBusy { limit: 1 }), "{err}");
        assert!(err.is_retryable());
        assert!(trainer.list_models(1).is_empty());

        drop(held);
        assert!(trainer.train_model(&request, 1).is_ok());
        assert_eq!(trainer.slots.running(), 0);
    }
}
