//! Single-row prediction against a stored model.

use std::sync::Arc;
use tracing::debug;

use crate::artifact::ModelArtifactStore;
use crate::catalog::{Catalog, DeletionGuard};
use crate::error::{Result, XaiError};
use crate::model::{FittedModel, ModelOutput};
use crate::types::{
    FeatureVector, ModelId, OwnerId, PredictionResult, REGRESSION_CONFIDENCE, RawInput,
    TrainedModel,
};
use crate::vectorizer::FeatureVectorizer;

/// A stored model loaded for one request, with the input encoded for it.
pub(crate) struct LoadedInference {
    pub record: TrainedModel,
    pub model: FittedModel,
    pub vector: FeatureVector,
    pub output: ModelOutput,
}

/// Runs predictions for stored models.
pub struct PredictionService {
    catalog: Arc<dyn Catalog>,
    artifacts: ModelArtifactStore,
    guard: Arc<DeletionGuard>,
}

impl PredictionService {
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

    /// Predicts the target for one raw input row.
    ///
    /// Input keys that are not model features are ignored; model features
    /// missing from the input contribute 0. See [`PredictionResult`] for the
    /// meaning of `confidence` per family.
    ///
    /// # Errors
    ///
    /// - [`XaiError::ModelNotFound`]: no such model for `owner`
    /// - [`XaiError::ArtifactCorrupt`]: the stored model cannot be loaded
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use std::collections::HashMap;
    /// # use xai_forge::{PredictionService, Result};
    /// # fn run(service: &PredictionService) -> Result<()> {
    /// let input = HashMap::from([
    ///     ("age".to_string(), "34".to_string()),
    ///     ("income".to_string(), "50000".to_string()),
    /// ]);
    /// let result = service.predict(1, &input, 42)?;
    /// println!("{} ({:.2})", result.prediction, result.confidence);
    /// # Ok(())
    /// # }
    /// ```
    pub fn predict(
        &self,
        model_id: ModelId,
        raw: &RawInput,
        owner: OwnerId,
    ) -> Result<PredictionResult> {
        let loaded = self.run(model_id, raw, owner)?;

        let result = match loaded.output {
            ModelOutput::Class {
                label,
                confidence,
                probabilities,
            } => PredictionResult {
                prediction: label,
                confidence,
                probabilities: Some(probabilities),
                input: raw.clone(),
            },
            ModelOutput::Value(value) => PredictionResult {
                prediction: value.to_string(),
                confidence: REGRESSION_CONFIDENCE,
                probabilities: None,
                input: raw.clone(),
            },
        };

        debug!(model_id, prediction = %result.prediction, "Prediction made");
        Ok(result)
    }

    /// Loads the model, encodes `raw` and runs inference.
    ///
    /// The shared guard is held until the artifact has been read, so a
    /// concurrent delete is seen either not at all or as a clean not-found.
    pub(crate) fn run(
        &self,
        model_id: ModelId,
        raw: &RawInput,
        owner: OwnerId,
    ) -> Result<LoadedInference> {
        let (record, model) = {
            let _shared = self.guard.read();
            let record = self
                .catalog
                .find_model(model_id, owner)
                .ok_or(XaiError::ModelNotFound { id: model_id })?;
            let model = self.artifacts.load(&record.artifact_path)?;
            (record, model)
        };

        if model.model_type() != record.model_type || model.feature_names() != record.feature_names {
            return Err(XaiError::ArtifactCorrupt {
                path: record.artifact_path.clone(),
                reason: "artifact does not match its model record".to_string(),
            });
        }

        let vector = FeatureVectorizer::vectorize(raw, &record.feature_names);
        let output = model.infer(&vector);

        Ok(LoadedInference {
            record,
            model,
            vector,
            output,
        })
    }
}
