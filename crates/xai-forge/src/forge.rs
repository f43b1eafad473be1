//! The [`XaiForge`] facade.
//!
//! Wires the services together over one [`Catalog`], one artifact directory
//! and one [`DeletionGuard`], and exposes every operation the hosting layer
//! needs through a single value.

use std::path::PathBuf;
use std::sync::Arc;

use crate::artifact::ModelArtifactStore;
use crate::catalog::{Catalog, DeletionGuard, InMemoryCatalog};
use crate::config::ForgeConfig;
use crate::dataset::DatasetService;
use crate::error::Result;
use crate::explain::ExplanationEngine;
use crate::predict::PredictionService;
use crate::trainer::TrainingOrchestrator;
use crate::types::{
    Dataset, DatasetId, Explanation, ModelId, OwnerId, PredictionResult, RawInput, TrainRequest,
    TrainedModel,
};

/// Entry point to dataset, training, prediction and explanation operations.
///
/// `XaiForge` is `Send + Sync`; share it behind an `Arc` across request
/// handlers.
///
/// # Example
///
/// ```no_run
/// use std::collections::HashMap;
/// use xai_forge::{ForgeConfig, TrainRequest, XaiForge};
///
/// # fn main() -> xai_forge::Result<()> {
/// let forge = XaiForge::builder()
///     .config(ForgeConfig::from_json_file("xai.json")?)
///     .build()?;
///
/// let owner = 1;
/// let dataset = forge.register_dataset(owner, "houses.csv", "uploads/houses.csv")?;
/// let model = forge.train_model(
///     &TrainRequest {
///         dataset_id: dataset.id,
///         model_name: "prices".to_string(),
///         target_variable: "price".to_string(),
///         feature_names: vec!["rooms".to_string(), "area".to_string()],
///         model_type: "REGRESSION".to_string(),
///     },
///     owner,
/// )?;
///
/// let input = HashMap::from([("rooms".to_string(), "4".to_string())]);
/// let explanation = forge.explain(model.id, &input, owner)?;
/// println!("{}", explanation.explanation_text);
/// # Ok(())
/// # }
/// ```
pub struct XaiForge {
    config: ForgeConfig,
    datasets: DatasetService,
    trainer: TrainingOrchestrator,
    predictions: Arc<PredictionService>,
    explanations: ExplanationEngine,
}

impl XaiForge {
    #[must_use]
    pub fn builder() -> XaiForgeBuilder {
        XaiForgeBuilder::default()
    }

    /// A forge over a fresh [`InMemoryCatalog`].
    ///
    /// # Errors
    ///
    /// [`XaiError::InvalidConfig`](crate::XaiError::InvalidConfig) if `config` is invalid.
    pub fn new(config: ForgeConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    /// See [`DatasetService::register_dataset()`].
    pub fn register_dataset(
        &self,
        owner: OwnerId,
        file_name: &str,
        path: impl Into<PathBuf>,
    ) -> Result<Dataset> {
        self.datasets.register_dataset(owner, file_name, path)
    }

    pub fn get_dataset(&self, id: DatasetId, owner: OwnerId) -> Result<Dataset> {
        self.datasets.get_dataset(id, owner)
    }

    pub fn list_datasets(&self, owner: OwnerId) -> Vec<Dataset> {
        self.datasets.list_datasets(owner)
    }

    /// See [`DatasetService::delete_dataset()`].
    pub fn delete_dataset(&self, id: DatasetId, owner: OwnerId) -> Result<()> {
        self.datasets.delete_dataset(id, owner)
    }

    /// See [`TrainingOrchestrator::train_model()`].
    pub fn train_model(&self, request: &TrainRequest, owner: OwnerId) -> Result<TrainedModel> {
        self.trainer.train_model(request, owner)
    }

    pub fn get_model(&self, id: ModelId, owner: OwnerId) -> Result<TrainedModel> {
        self.trainer.get_model(id, owner)
    }

    pub fn list_models(&self, owner: OwnerId) -> Vec<TrainedModel> {
        self.trainer.list_models(owner)
    }

    /// See [`TrainingOrchestrator::delete_model()`].
    pub fn delete_model(&self, id: ModelId, owner: OwnerId) -> Result<()> {
        self.trainer.delete_model(id, owner)
    }

    /// See [`PredictionService::predict()`].
    pub fn predict(
        &self,
        model_id: ModelId,
        raw: &RawInput,
        owner: OwnerId,
    ) -> Result<PredictionResult> {
        self.predictions.predict(model_id, raw, owner)
    }

    /// See [`ExplanationEngine::explain()`].
    pub fn explain(&self, model_id: ModelId, raw: &RawInput, owner: OwnerId) -> Result<Explanation> {
        self.explanations.explain(model_id, raw, owner)
    }
}

/// Builder for [`XaiForge`].
#[derive(Default)]
pub struct XaiForgeBuilder {
    config: ForgeConfig,
    catalog: Option<Arc<dyn Catalog>>,
}

impl XaiForgeBuilder {
    #[must_use]
    pub fn config(mut self, config: ForgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an external catalog instead of a fresh [`InMemoryCatalog`].
    #[must_use]
    pub fn catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// # Errors
    ///
    /// [`XaiError::InvalidConfig`](crate::XaiError::InvalidConfig) if the configuration is invalid.
    pub fn build(self) -> Result<XaiForge> {
        self.config.validate()?;

        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(InMemoryCatalog::new()) as Arc<dyn Catalog>);
        let artifacts = ModelArtifactStore::new(&self.config.training.models_dir);
        let guard = Arc::new(DeletionGuard::new());

        let datasets =
            DatasetService::new(Arc::clone(&catalog), artifacts.clone(), Arc::clone(&guard));
        let trainer = TrainingOrchestrator::new(
            Arc::clone(&catalog),
            artifacts.clone(),
            Arc::clone(&guard),
            self.config.training.clone(),
        );
        let predictions = Arc::new(PredictionService::new(catalog, artifacts, guard));
        let explanations =
            ExplanationEngine::new(self.config.explanation.clone(), Arc::clone(&predictions));

        Ok(XaiForge {
            config: self.config,
            datasets,
            trainer,
            predictions,
            explanations,
        })
    }
}

static_assertions::assert_impl_all!(XaiForge: Send, Sync);
static_assertions::assert_impl_all!(TrainingOrchestrator: Send, Sync);
static_assertions::assert_impl_all!(PredictionService: Send, Sync);
static_assertions::assert_impl_all!(ExplanationEngine: Send, Sync);
static_assertions::assert_impl_all!(InMemoryCatalog: Send, Sync);
