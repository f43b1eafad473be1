//! Feature attribution for single predictions.
//!
//! Attribution has two tiers:
//!
//! - **Model weights** (preferred): the contribution of feature `f` is
//!   `weight(f) * value(f)`, using the predicted class's weights for a
//!   classifier. Direction is the sign of the product.
//! - **Heuristic fallback**: used when weights are disabled by configuration
//!   or not usable. The magnitude is `|value(f) * multiplier(f) * base_factor|`
//!   with the multiplier from [`FeatureMultiplierTable`](crate::FeatureMultiplierTable).
//!   The direction is the sign of the input value only; it does not reflect
//!   how the model uses the feature, and such contributions are tagged
//!   [`AttributionSource::Heuristic`].
//!
//! Both tiers then drop contributions below `min_contribution_threshold`,
//! sort by magnitude (ties keep model feature order) and keep the first
//! `max_features_in_explanation`.

use std::sync::Arc;
use tracing::debug;

use crate::config::ExplanationConfig;
use crate::error::{Result, XaiError};
use crate::model::FittedModel;
use crate::predict::PredictionService;
use crate::types::{
    AttributionSource, Contribution, Direction, Explanation, FeatureVector, ModelId, OwnerId,
    RawInput,
};

/// Number of features named in the explanation text.
const TEXT_FEATURES: usize = 3;

/// Explains predictions of stored models.
pub struct ExplanationEngine {
    config: ExplanationConfig,
    predictions: Arc<PredictionService>,
}

impl ExplanationEngine {
    pub fn new(config: ExplanationConfig, predictions: Arc<PredictionService>) -> Self {
        Self {
            config,
            predictions,
        }
    }

    pub fn config(&self) -> &ExplanationConfig {
        &self.config
    }

    /// Predicts for `raw` and explains the result.
    ///
    /// # Errors
    ///
    /// - [`XaiError::ModelNotFound`] / [`XaiError::ArtifactCorrupt`]: as for prediction
    /// - [`XaiError::ExplanationUnavailable`]: weights unusable and fallback disabled
    pub fn explain(&self, model_id: ModelId, raw: &RawInput, owner: OwnerId) -> Result<Explanation> {
        let loaded = self.predictions.run(model_id, raw, owner)?;

        let (contributions, source) = attribute(&loaded.model, &loaded.vector, &self.config)?;
        let explanation_text = render_text(&contributions);

        debug!(
            model_id = loaded.record.id,
            source = ?source,
            contributions = contributions.len(),
            "Explanation generated"
        );

        Ok(Explanation {
            prediction: loaded.output.prediction_string(),
            contributions,
            input: raw.clone(),
            explanation_text,
            source,
        })
    }
}

/// Computes ranked contributions for an encoded input.
///
/// Features absent from `vector` get no contribution.
///
/// # Errors
///
/// Returns [`XaiError::ExplanationUnavailable`] if weights cannot be used and
/// `config.enable_fallback_explanation` is false.
pub fn attribute(
    model: &FittedModel,
    vector: &FeatureVector,
    config: &ExplanationConfig,
) -> Result<(Vec<Contribution>, AttributionSource)> {
    let weights = if config.use_model_weights {
        model.feature_weights(vector)
    } else {
        None
    };

    let (mut contributions, source) = match weights {
        Some(weights) => {
            let contributions = model
                .feature_names()
                .iter()
                .zip(weights)
                .filter_map(|(name, weight)| {
                    let score = weight * vector.get(name)?;
                    Some(Contribution {
                        feature_name: name.clone(),
                        contribution: score.abs(),
                        direction: Direction::of(score),
                        source: AttributionSource::ModelWeights,
                    })
                })
                .collect::<Vec<_>>();
            (contributions, AttributionSource::ModelWeights)
        }
        None if config.enable_fallback_explanation => {
            debug!(model_type = %model.model_type(), "Using heuristic attribution");
            (heuristic(model, vector, config), AttributionSource::Heuristic)
        }
        None => {
            let reason = if config.use_model_weights {
                "model weights are not usable and fallback attribution is disabled"
            } else {
                "weight attribution and fallback attribution are both disabled"
            };
            return Err(XaiError::ExplanationUnavailable(reason.to_string()));
        }
    };

    contributions.retain(|c| c.contribution >= config.min_contribution_threshold);
    // Stable: equal magnitudes keep feature order.
    contributions.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));
    contributions.truncate(config.max_features_in_explanation);

    Ok((contributions, source))
}

fn heuristic(
    model: &FittedModel,
    vector: &FeatureVector,
    config: &ExplanationConfig,
) -> Vec<Contribution> {
    let base = config.base_factor(model.model_type());

    vector
        .iter()
        .map(|(name, value)| {
            let multiplier = config.feature_multipliers.multiplier_for(name);
            Contribution {
                feature_name: name.to_string(),
                contribution: (value * multiplier * base).abs(),
                direction: Direction::of(value),
                source: AttributionSource::Heuristic,
            }
        })
        .collect()
}

/// Renders the top contributions as one sentence.
///
/// ```
/// use xai_forge::{AttributionSource, Contribution, Direction, render_text};
///
/// let c = |name: &str, v: f64, d| Contribution {
///     feature_name: name.to_string(),
///     contribution: v,
///     direction: d,
///     source: AttributionSource::ModelWeights,
/// };
/// let text = render_text(&[
///     c("income", 3.456, Direction::Positive),
///     c("age", 1.2, Direction::Negative),
/// ]);
/// assert_eq!(
///     text,
///     "The model's prediction is primarily influenced by: \
///      income (positive impact: 3.46) and age (negative impact: 1.20)."
/// );
/// ```
#[must_use]
pub fn render_text(contributions: &[Contribution]) -> String {
    let parts: Vec<String> = contributions
        .iter()
        .take(TEXT_FEATURES)
        .map(|c| {
            format!(
                "{} ({} impact: {:.2})",
                c.feature_name, c.direction, c.contribution
            )
        })
        .collect();

    match parts.as_slice() {
        [] => "No feature contributed enough to explain this prediction.".to_string(),
        [only] => format!("The model's prediction is primarily influenced by: {only}."),
        [init @ .., last] => format!(
            "The model's prediction is primarily influenced by: {} and {last}.",
            init.join(", ")
        ),
    }
}
