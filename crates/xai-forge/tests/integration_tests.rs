//! Integration tests for the train, predict and explain workflow.
//!
//! Every test works in its own temporary directory holding the CSV files and
//! the model artifacts.

use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use xai_forge::{
    AttributionSource, Dataset, Direction, ExplanationConfig, ForgeConfig, ModelType,
    REGRESSION_CONFIDENCE, RawInput, TrainRequest, TrainingConfig, XaiError, XaiForge,
};

const OWNER: u64 = 1;
const OTHER_OWNER: u64 = 2;

// ============================================================================
// Helper Functions
// ============================================================================

struct TestEnv {
    dir: TempDir,
    forge: XaiForge,
}

impl TestEnv {
    fn new() -> Self {
        Self::with_config(|config| config)
    }

    fn with_config(customize: impl FnOnce(ForgeConfig) -> ForgeConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = ForgeConfig::default();
        config.training.models_dir = dir.path().join("models");
        let forge = XaiForge::new(customize(config)).unwrap();
        Self { dir, forge }
    }

    fn models_dir(&self) -> PathBuf {
        self.dir.path().join("models")
    }

    fn artifact_count(&self) -> usize {
        count_files(&self.models_dir())
    }

    fn register(&self, name: &str, contents: &str) -> Dataset {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).unwrap();
        self.forge.register_dataset(OWNER, name, path).unwrap()
    }
}

fn count_files(dir: &Path) -> usize {
    match fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).count(),
        Err(_) => 0,
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn raw(pairs: &[(&str, &str)]) -> RawInput {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn request(dataset: &Dataset, target: &str, features: &[&str], model_type: &str) -> TrainRequest {
    TrainRequest {
        dataset_id: dataset.id,
        model_name: "test model".to_string(),
        target_variable: target.to_string(),
        feature_names: names(features),
        model_type: model_type.to_string(),
    }
}

/// 50 rows where `target = 0.5 * age + 0.001 * income + 3`.
fn people_csv() -> String {
    let mut csv = String::from("age,income,target\n");
    for i in 0..50 {
        let age = 20 + (i * 7) % 45;
        let income = 20_000 + (i * 3_701) % 60_000;
        let target = 0.5 * f64::from(age) + 0.001 * f64::from(income) + 3.0;
        csv.push_str(&format!("{age},{income},{target}\n"));
    }
    csv
}

/// Three flower species separated by petal length, with a text color column.
fn flowers_csv(rows: usize) -> String {
    let mut csv = String::from("petal_length,Width_cm,color,species\n");
    for i in 0..rows {
        let length = 1.0 + (i % 60) as f64 * 0.1;
        let width = length * 0.4 + (i % 3) as f64 * 0.05;
        let (color, species) = if length < 2.5 {
            ("white", "setosa")
        } else if length < 5.0 {
            ("blue", "versicolor")
        } else {
            ("purple", "virginica")
        };
        csv.push_str(&format!("{length:.1},{width:.2},{color},{species}\n"));
    }
    csv
}

// ============================================================================
// Training and Prediction
// ============================================================================

#[test]
fn test_regression_train_and_predict() {
    let env = TestEnv::new();
    let dataset = env.register("people.csv", &people_csv());
    assert_eq!(dataset.headers, names(&["age", "income", "target"]));
    assert_eq!(dataset.row_count, 50);

    let model = env
        .forge
        .train_model(&request(&dataset, "target", &["age", "income"], "REGRESSION"), OWNER)
        .unwrap();

    assert_eq!(model.model_type, ModelType::Regression);
    assert_eq!(model.algorithm, "Linear Regression");
    assert!(model.artifact_path.exists());
    assert!(model.accuracy.unwrap() > 0.99);
    assert_eq!(model.metadata["rows"], 50);

    let result = env
        .forge
        .predict(model.id, &raw(&[("age", "34"), ("income", "50000")]), OWNER)
        .unwrap();

    let value: f64 = result.prediction.parse().unwrap();
    assert!((value - 70.0).abs() < 1e-3, "prediction {value}");
    assert_eq!(result.confidence, REGRESSION_CONFIDENCE);
    assert!(result.probabilities.is_none());
    assert_eq!(result.input.get("age").map(String::as_str), Some("34"));
}

#[test]
fn test_classification_probabilities() {
    let env = TestEnv::new();
    let dataset = env.register("flowers.csv", &flowers_csv(120));

    let model = env
        .forge
        .train_model(
            &request(&dataset, "species", &["petal_length", "Width_cm"], "classification"),
            OWNER,
        )
        .unwrap();
    assert_eq!(model.model_type, ModelType::Classification);
    assert_eq!(
        model.metadata["classes"],
        serde_json::json!(["setosa", "versicolor", "virginica"])
    );

    let result = env
        .forge
        .predict(
            model.id,
            &raw(&[("petal_length", "1.2"), ("Width_cm", "0.5")]),
            OWNER,
        )
        .unwrap();

    let probabilities = result.probabilities.unwrap();
    assert_eq!(probabilities.len(), 3);
    let sum: f64 = probabilities.values().sum();
    assert!((sum - 1.0).abs() < 1e-9);
    assert_eq!(probabilities[&result.prediction], result.confidence);
    assert!(probabilities.values().all(|p| *p <= result.confidence));
}

#[test]
fn test_prediction_ignores_unknown_and_missing_inputs() {
    let env = TestEnv::new();
    let dataset = env.register("people.csv", &people_csv());
    let model = env
        .forge
        .train_model(&request(&dataset, "target", &["age", "income"], "REGRESSION"), OWNER)
        .unwrap();

    let partial = env
        .forge
        .predict(model.id, &raw(&[("age", "34"), ("shoe_size", "44")]), OWNER)
        .unwrap();
    assert!(partial.prediction.parse::<f64>().is_ok());
}

// ============================================================================
// Validation Failures
// ============================================================================

#[test]
fn test_unknown_column_fails_before_training() {
    let env = TestEnv::new();
    let dataset = env.register("people.csv", &people_csv());

    let err = env
        .forge
        .train_model(&request(&dataset, "target", &["age", "height"], "REGRESSION"), OWNER)
        .unwrap_err();

    assert!(matches!(err, XaiError::InvalidRequest(ref m) if m.contains("height")));
    assert!(env.forge.list_models(OWNER).is_empty());
    assert_eq!(env.artifact_count(), 0);
}

#[test]
fn test_single_class_dataset_is_rejected() {
    let env = TestEnv::new();
    let dataset = env.register("one_class.csv", "x,label\n1,yes\n2,yes\n3,yes\n");

    let err = env
        .forge
        .train_model(&request(&dataset, "label", &["x"], "CLASSIFICATION"), OWNER)
        .unwrap_err();

    assert!(matches!(err, XaiError::InvalidDataset(_)));
    assert!(err.to_string().contains("at least 2 classes"));
    assert!(env.forge.list_models(OWNER).is_empty());
    assert_eq!(env.artifact_count(), 0);
}

#[test]
fn test_unknown_model_type_is_a_configuration_error() {
    let env = TestEnv::new();
    let dataset = env.register("people.csv", &people_csv());

    let err = env
        .forge
        .train_model(&request(&dataset, "target", &["age"], "CLUSTERING"), OWNER)
        .unwrap_err();

    assert_eq!(err.error_code(), "UNKNOWN_MODEL_TYPE");
    assert!(env.forge.list_models(OWNER).is_empty());
}

#[test]
fn test_foreign_dataset_is_not_found() {
    let env = TestEnv::new();
    let dataset = env.register("people.csv", &people_csv());

    let err = env
        .forge
        .train_model(
            &request(&dataset, "target", &["age"], "REGRESSION"),
            OTHER_OWNER,
        )
        .unwrap_err();
    assert!(matches!(err, XaiError::DatasetNotFound { .. }));
}

// ============================================================================
// One Model per Dataset
// ============================================================================

#[test]
fn test_second_training_is_rejected() {
    let env = TestEnv::new();
    let dataset = env.register("people.csv", &people_csv());
    let req = request(&dataset, "target", &["age", "income"], "REGRESSION");

    let first = env.forge.train_model(&req, OWNER).unwrap();
    let err = env.forge.train_model(&req, OWNER).unwrap_err();

    assert!(matches!(err, XaiError::ModelAlreadyExists { dataset_id } if dataset_id == dataset.id));
    assert_eq!(env.forge.list_models(OWNER).len(), 1);
    assert_eq!(env.forge.get_model(first.id, OWNER).unwrap(), first);
    assert_eq!(env.artifact_count(), 1);
}

#[test]
fn test_concurrent_training_has_one_winner() {
    let env = TestEnv::new();
    let dataset = env.register("people.csv", &people_csv());
    let forge = Arc::new(env.forge);
    let req = request(&dataset, "target", &["age", "income"], "REGRESSION");

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let forge = Arc::clone(&forge);
            let req = req.clone();
            thread::spawn(move || forge.train_model(&req, OWNER))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(r, Err(XaiError::ModelAlreadyExists { .. }))));
    assert_eq!(forge.list_models(OWNER).len(), 1);
    assert_eq!(count_files(&env.dir.path().join("models")), 1);
}

// ============================================================================
// Explanations
// ============================================================================

#[test]
fn test_explanation_from_model_weights() {
    let env = TestEnv::new();
    let dataset = env.register("people.csv", &people_csv());
    let model = env
        .forge
        .train_model(&request(&dataset, "target", &["age", "income"], "REGRESSION"), OWNER)
        .unwrap();

    let input = raw(&[("age", "34"), ("income", "50000")]);
    let explanation = env.forge.explain(model.id, &input, OWNER).unwrap();
    let prediction = env.forge.predict(model.id, &input, OWNER).unwrap();

    assert_eq!(explanation.prediction, prediction.prediction);
    assert_eq!(explanation.source, AttributionSource::ModelWeights);
    // income: 0.001 * 50000 = 50, age: 0.5 * 34 = 17
    let order: Vec<&str> = explanation
        .contributions
        .iter()
        .map(|c| c.feature_name.as_str())
        .collect();
    assert_eq!(order, vec!["income", "age"]);
    assert!((explanation.contributions[0].contribution - 50.0).abs() < 1e-3);
    assert_eq!(explanation.contributions[0].direction, Direction::Positive);
    assert!(
        explanation
            .explanation_text
            .starts_with("The model's prediction is primarily influenced by: income (positive impact: 50.00) and age")
    );
}

#[test]
fn test_fallback_explanation_uses_multiplier_table() {
    let env = TestEnv::with_config(|mut config| {
        config.explanation = ExplanationConfig::builder()
            .use_model_weights(false)
            .build()
            .unwrap();
        config
    });
    let dataset = env.register("flowers.csv", &flowers_csv(60));
    let model = env
        .forge
        .train_model(
            &request(&dataset, "species", &["petal_length", "Width_cm"], "CLASSIFICATION"),
            OWNER,
        )
        .unwrap();

    let explanation = env
        .forge
        .explain(model.id, &raw(&[("Width_cm", "3"), ("petal_length", "1")]), OWNER)
        .unwrap();

    assert_eq!(explanation.source, AttributionSource::Heuristic);
    let width = explanation
        .contributions
        .iter()
        .find(|c| c.feature_name == "Width_cm")
        .unwrap();
    // substring "width" matches with multiplier 2.0
    assert_eq!(width.contribution, 6.0);
    assert_eq!(width.source, AttributionSource::Heuristic);
}

#[test]
fn test_explanation_unavailable_when_fallback_disabled() {
    let env = TestEnv::with_config(|mut config| {
        config.explanation = ExplanationConfig::builder()
            .use_model_weights(false)
            .enable_fallback_explanation(false)
            .build()
            .unwrap();
        config
    });
    let dataset = env.register("people.csv", &people_csv());
    let model = env
        .forge
        .train_model(&request(&dataset, "target", &["age"], "REGRESSION"), OWNER)
        .unwrap();

    let err = env
        .forge
        .explain(model.id, &raw(&[("age", "40")]), OWNER)
        .unwrap_err();
    assert_eq!(err.error_code(), "EXPLANATION_UNAVAILABLE");

    // prediction still works
    assert!(env.forge.predict(model.id, &raw(&[("age", "40")]), OWNER).is_ok());
}

// ============================================================================
// Artifacts, Timeouts and Deletion
// ============================================================================

#[test]
fn test_corrupt_artifact_is_reported() {
    let env = TestEnv::new();
    let dataset = env.register("people.csv", &people_csv());
    let model = env
        .forge
        .train_model(&request(&dataset, "target", &["age"], "REGRESSION"), OWNER)
        .unwrap();

    fs::write(&model.artifact_path, b"{\"format\": \"xai-forge/fitted-m").unwrap();

    let err = env
        .forge
        .predict(model.id, &raw(&[("age", "40")]), OWNER)
        .unwrap_err();
    assert!(matches!(err, XaiError::ArtifactCorrupt { .. }));
    assert!(!err.is_retryable());
}

#[test]
fn test_training_timeout_persists_nothing() {
    let env = TestEnv::with_config(|mut config| {
        config.training = TrainingConfig::builder()
            .models_dir(config.training.models_dir.clone())
            .training_timeout(Duration::from_millis(1))
            .max_iterations(10_000)
            .build()
            .unwrap();
        config
    });
    let dataset = env.register("flowers.csv", &flowers_csv(30_000));

    let err = env
        .forge
        .train_model(
            &request(&dataset, "species", &["petal_length", "Width_cm"], "CLASSIFICATION"),
            OWNER,
        )
        .unwrap_err();

    assert!(matches!(err, XaiError::TrainingTimeout { .. }));
    assert!(err.is_retryable());
    assert!(env.forge.list_models(OWNER).is_empty());
    assert_eq!(env.artifact_count(), 0);
}

#[test]
fn test_delete_model_allows_retraining() {
    let env = TestEnv::new();
    let dataset = env.register("people.csv", &people_csv());
    let req = request(&dataset, "target", &["age", "income"], "REGRESSION");
    let model = env.forge.train_model(&req, OWNER).unwrap();

    assert!(env.forge.delete_model(model.id, OTHER_OWNER).unwrap_err().is_not_found());
    env.forge.delete_model(model.id, OWNER).unwrap();

    assert!(!model.artifact_path.exists());
    let err = env
        .forge
        .predict(model.id, &raw(&[("age", "40")]), OWNER)
        .unwrap_err();
    assert!(matches!(err, XaiError::ModelNotFound { .. }));

    let retrained = env.forge.train_model(&req, OWNER).unwrap();
    assert_ne!(retrained.id, model.id);
}

#[test]
fn test_delete_dataset_cascades_to_model() {
    let env = TestEnv::new();
    let dataset = env.register("people.csv", &people_csv());
    let model = env
        .forge
        .train_model(&request(&dataset, "target", &["age"], "REGRESSION"), OWNER)
        .unwrap();

    env.forge.delete_dataset(dataset.id, OWNER).unwrap();

    assert!(!model.artifact_path.exists());
    assert!(!dataset.file_path.exists());
    assert!(env.forge.get_model(model.id, OWNER).is_err());
    assert!(env.forge.list_datasets(OWNER).is_empty());
}

#[test]
fn test_models_are_scoped_by_owner() {
    let env = TestEnv::new();
    let dataset = env.register("people.csv", &people_csv());
    let model = env
        .forge
        .train_model(&request(&dataset, "target", &["age"], "REGRESSION"), OWNER)
        .unwrap();

    let err = env
        .forge
        .predict(model.id, &raw(&[("age", "40")]), OTHER_OWNER)
        .unwrap_err();
    assert!(matches!(err, XaiError::ModelNotFound { id } if id == model.id));
    assert!(env.forge.list_models(OTHER_OWNER).is_empty());
}

/// Replaces a model file with a non-empty directory so it cannot be removed.
fn block_artifact_removal(path: &Path) {
    fs::remove_file(path).unwrap();
    fs::create_dir(path).unwrap();
    fs::write(path.join("pinned"), b"x").unwrap();
}

#[test]
fn test_failed_artifact_delete_keeps_model_record() {
    let env = TestEnv::new();
    let dataset = env.register("people.csv", &people_csv());
    let model = env
        .forge
        .train_model(&request(&dataset, "target", &["age"], "REGRESSION"), OWNER)
        .unwrap();
    block_artifact_removal(&model.artifact_path);

    let err = env.forge.delete_model(model.id, OWNER).unwrap_err();
    assert!(matches!(err, XaiError::ArtifactDeleteFailed { .. }), "{err}");
    assert_eq!(err.error_code(), "ARTIFACT_DELETE_FAILED");

    let kept = env.forge.get_model(model.id, OWNER).unwrap();
    assert_eq!(kept.artifact_path, model.artifact_path);
    assert_eq!(env.forge.list_models(OWNER).len(), 1);
}

#[test]
fn test_failed_cascade_keeps_dataset_and_model_records() {
    let env = TestEnv::new();
    let dataset = env.register("people.csv", &people_csv());
    let model = env
        .forge
        .train_model(&request(&dataset, "target", &["age"], "REGRESSION"), OWNER)
        .unwrap();
    block_artifact_removal(&model.artifact_path);

    let err = env.forge.delete_dataset(dataset.id, OWNER).unwrap_err();
    assert!(matches!(err, XaiError::ArtifactDeleteFailed { .. }), "{err}");

    assert!(env.forge.get_dataset(dataset.id, OWNER).is_ok());
    assert!(env.forge.get_model(model.id, OWNER).is_ok());
    assert!(dataset.file_path.exists());
}

#[test]
fn test_explanations_are_scoped_by_owner() {
    let env = TestEnv::new();
    let dataset = env.register("people.csv", &people_csv());
    let model = env
        .forge
        .train_model(&request(&dataset, "target", &["age"], "REGRESSION"), OWNER)
        .unwrap();

    let err = env
        .forge
        .explain(model.id, &raw(&[("age", "40")]), OTHER_OWNER)
        .unwrap_err();
    assert!(matches!(err, XaiError::ModelNotFound { id } if id == model.id));
    assert!(env.forge.explain(model.id, &raw(&[("age", "40")]), OWNER).is_ok());
}

#[test]
fn test_reads_racing_a_delete_never_see_a_dangling_model() {
    let env = TestEnv::new();
    let dataset = env.register("people.csv", &people_csv());
    let model = env
        .forge
        .train_model(&request(&dataset, "target", &["age", "income"], "REGRESSION"), OWNER)
        .unwrap();
    let input = raw(&[("age", "40"), ("income", "50000")]);

    thread::scope(|scope| {
        let readers: Vec<_> = (0..4)
            .map(|i| {
                let forge = &env.forge;
                let input = &input;
                scope.spawn(move || {
                    let mut seen_gone = false;
                    for _ in 0..200 {
                        let outcome = if i % 2 == 0 {
                            forge.predict(model.id, input, OWNER).map(|_| ())
                        } else {
                            forge.explain(model.id, input, OWNER).map(|_| ())
                        };
                        match outcome {
                            Ok(()) => assert!(!seen_gone, "model reappeared after delete"),
                            Err(XaiError::ModelNotFound { .. }) => seen_gone = true,
                            Err(other) => panic!("unexpected error during delete: {other}"),
                        }
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(5));
        env.forge.delete_model(model.id, OWNER).unwrap();

        for reader in readers {
            reader.join().unwrap();
        }
    });

    assert!(!model.artifact_path.exists());
    assert!(env.forge.list_models(OWNER).is_empty());
}

#[test]
fn test_forge_from_json_config() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("xai.json");
    let models_dir = dir.path().join("artifacts");
    fs::write(
        &config_path,
        serde_json::json!({
            "training": { "models_dir": models_dir },
            "explanation": { "max_features_in_explanation": 1 }
        })
        .to_string(),
    )
    .unwrap();

    let forge = XaiForge::new(ForgeConfig::from_json_file(&config_path).unwrap()).unwrap();
    let csv = dir.path().join("people.csv");
    fs::write(&csv, people_csv()).unwrap();
    let dataset = forge.register_dataset(OWNER, "people.csv", &csv).unwrap();
    let model = forge
        .train_model(&request(&dataset, "target", &["age", "income"], "REGRESSION"), OWNER)
        .unwrap();

    assert!(model.artifact_path.starts_with(&models_dir));
    let explanation = forge
        .explain(model.id, &HashMap::from([("age".to_string(), "30".to_string())]), OWNER)
        .unwrap();
    assert_eq!(explanation.contributions.len(), 1);
}
