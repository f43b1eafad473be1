//! Command-line front end: train a model on a CSV file, then optionally
//! predict and explain one input row.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;
use xai_forge::{ForgeConfig, ModelType, RawInput, TrainRequest, XaiForge};

/// CLI-compatible model type enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliModelType {
    /// Predict a discrete class label
    Classification,
    /// Predict a continuous value
    Regression,
}

impl From<CliModelType> for ModelType {
    fn from(cli: CliModelType) -> Self {
        match cli {
            CliModelType::Classification => ModelType::Classification,
            CliModelType::Regression => ModelType::Regression,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Train a tabular model and explain its predictions",
    long_about = "Registers a CSV dataset, trains a classification or regression model on \
                  the selected columns and prints the results as JSON.\n\n\
                  EXAMPLES:\n  \
                  # Train only\n  \
                  xai-forge -d houses.csv -t price -f rooms,area -m regression\n\n  \
                  # Train, then predict and explain one row\n  \
                  xai-forge -d iris.csv -t species -f petal_length,petal_width \\\n    \
                  -m classification --input petal_length=4.7 --input petal_width=1.4"
)]
struct Args {
    /// Path to the CSV dataset
    #[arg(short, long)]
    data: PathBuf,

    /// Target column
    #[arg(short, long)]
    target: String,

    /// Feature columns, comma separated
    #[arg(short, long, value_delimiter = ',', required = true)]
    features: Vec<String>,

    /// Model family
    #[arg(short, long, value_enum)]
    model_type: CliModelType,

    /// Name of the trained model
    #[arg(short, long, default_value = "model")]
    name: String,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for model artifacts (overrides the configuration file)
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Input value as name=value; repeat for each feature
    ///
    /// When given, the trained model is used to predict and explain this row.
    #[arg(short, long = "input", value_parser = parse_key_val)]
    inputs: Vec<(String, String)>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{s}'"))?;
    Ok((key.trim().to_string(), value.to_string()))
}

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr so stdout only carries the JSON result.
fn init_logging(level: &str, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.quiet);

    let mut config = match &args.config {
        Some(path) => ForgeConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ForgeConfig::default(),
    };
    if let Some(dir) = &args.models_dir {
        config.training.models_dir = dir.clone();
    }

    let forge = XaiForge::new(config)?;
    let owner = 1;

    let file_name = args
        .data
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow!("Not a file: {}", args.data.display()))?;

    info!("Loading dataset from: {}", args.data.display());
    let dataset = forge.register_dataset(owner, &file_name, &args.data)?;

    let model_type = ModelType::from(args.model_type);
    let model = forge.train_model(
        &TrainRequest {
            dataset_id: dataset.id,
            model_name: args.name.clone(),
            target_variable: args.target.clone(),
            feature_names: args.features.clone(),
            model_type: model_type.as_str().to_string(),
        },
        owner,
    )?;

    let model_id = model.id;
    let mut output = json!({ "dataset": dataset, "model": model });

    if !args.inputs.is_empty() {
        let raw: RawInput = args.inputs.iter().cloned().collect();
        let prediction = forge.predict(model_id, &raw, owner)?;
        let explanation = forge.explain(model_id, &raw, owner)?;
        output["prediction"] = serde_json::to_value(prediction)?;
        output["explanation"] = serde_json::to_value(explanation)?;
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
