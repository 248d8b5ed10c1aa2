//! DermaCare CLI
//!
//! Offline entry point for the skin image classifier: run inference on
//! files, inspect the label codec, and produce model artifacts.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use dermacare::backend::{backend_name, default_device, InferenceBackend};
use dermacare::dataset::{ImagePreprocessor, ImageSource, LabelCodec};
use dermacare::inference::{export_model, load_predictor, ModelArtifacts, DEFAULT_TOP_K};
use dermacare::model::SkinClassifierConfig;
use dermacare::utils::logging::{init_logging, LogConfig};

/// Extensions accepted when scanning a directory of images
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// DermaCare skin condition classifier
#[derive(Parser, Debug)]
#[command(name = "dermacare")]
#[command(version)]
#[command(about = "Skin image classification with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a single image or every image in a directory
    Infer {
        /// Path to an image or a directory of images
        #[arg(short, long)]
        input: PathBuf,

        /// Path to the weight record
        #[arg(short, long, env = "DERMACARE_MODEL")]
        model: PathBuf,

        /// Path to the label codec JSON
        #[arg(short, long, env = "DERMACARE_LABELS")]
        labels: PathBuf,

        /// Optional architecture config written next to exported weights
        #[arg(long, env = "DERMACARE_MODEL_CONFIG")]
        model_config: Option<PathBuf>,

        /// Number of ranked classes to print
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// Print results as JSON lines instead of text
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Write randomly initialized weights with a label codec and config
    InitWeights {
        /// Comma separated class names
        #[arg(short, long, value_delimiter = ',', default_value = "acne,healthy,sun_damage")]
        classes: Vec<String>,

        /// Output directory for the artifacts
        #[arg(short, long, default_value = "model")]
        output_dir: PathBuf,

        /// EfficientNet width multiplier
        #[arg(long, default_value = "1.0")]
        width: f64,

        /// EfficientNet depth multiplier
        #[arg(long, default_value = "1.0")]
        depth: f64,
    },

    /// Print the classes of a label codec
    Labels {
        /// Path to the label codec JSON
        #[arg(short, long, env = "DERMACARE_LABELS")]
        labels: PathBuf,
    },

    /// Save the preprocessed model input back as an image
    Preview {
        /// Input image
        #[arg(short, long)]
        input: PathBuf,

        /// Output PNG
        #[arg(short, long, default_value = "preview.png")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Infer {
            input,
            model,
            labels,
            model_config,
            top_k,
            json,
        } => {
            let mut artifacts = ModelArtifacts::new(model, labels);
            if let Some(path) = model_config {
                artifacts = artifacts.with_model_config(path);
            }
            cmd_infer(&input, &artifacts, top_k, json)?;
        }

        Commands::InitWeights {
            classes,
            output_dir,
            width,
            depth,
        } => {
            cmd_init_weights(classes, &output_dir, width, depth)?;
        }

        Commands::Labels { labels } => {
            cmd_labels(&labels)?;
        }

        Commands::Preview { input, output } => {
            cmd_preview(&input, &output)?;
        }
    }

    Ok(())
}

fn collect_images(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("Input path not found: {}", input.display());
    }

    let mut images: Vec<PathBuf> = std::fs::read_dir(input)
        .with_context(|| format!("Failed to read directory {}", input.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    images.sort();
    Ok(images)
}

fn cmd_infer(input: &Path, artifacts: &ModelArtifacts, top_k: usize, json: bool) -> Result<()> {
    let images = collect_images(input)?;

    if !json {
        println!("{}", "Inference Configuration:".cyan().bold());
        println!("  Input:   {}", input.display());
        println!("  Weights: {}", artifacts.weights.display());
        println!("  Labels:  {}", artifacts.labels.display());
        println!("  Backend: {}", backend_name());
        println!("  Images:  {}", images.len());
        println!();
    }

    let device = default_device();
    let predictor = load_predictor::<InferenceBackend>(artifacts, &device)
        .context("Failed to load model")?;

    for path in &images {
        let source = ImageSource::Path(path);
        let (result, ranked) = match predictor.predict_ranked(source, top_k) {
            Ok(prediction) => prediction,
            Err(e) if e.is_client_error() => {
                eprintln!("{} {}", "Skipped:".yellow(), e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if json {
            println!("{}", serde_json::to_string(&result)?);
            continue;
        }

        println!("{}", path.display().to_string().bold());
        println!(
            "  Prediction: {} ({:.1}%)",
            result.predicted_class.green().bold(),
            result.confidence * 100.0
        );
        if top_k > 1 {
            println!("  Top-{}:", top_k);
            for (i, entry) in ranked.iter().enumerate() {
                println!(
                    "    {}. {} ({:.1}%)",
                    i + 1,
                    entry.class_name,
                    entry.probability * 100.0
                );
            }
        }
        println!();
    }

    info!("Classified {} images", images.len());
    Ok(())
}

fn cmd_init_weights(classes: Vec<String>, output_dir: &Path, width: f64, depth: f64) -> Result<()> {
    let codec = LabelCodec::new(classes).map_err(anyhow::Error::msg)?;
    let config = SkinClassifierConfig::new(codec.class_count())
        .with_width_multiplier(width)
        .with_depth_multiplier(depth);

    println!("{}", "Initializing model...".cyan());
    let device = default_device();
    let model = config.init::<InferenceBackend>(&device);
    let artifacts = export_model(model, &codec, &config, output_dir)?;

    println!("{}", "Artifacts written:".green().bold());
    println!("  Weights: {}", artifacts.weights.display());
    println!("  Labels:  {}", artifacts.labels.display());
    if let Some(path) = &artifacts.model_config {
        println!("  Config:  {}", path.display());
    }
    println!(
        "{}",
        "Weights are random; predictions are meaningless until trained weights are supplied."
            .yellow()
    );
    Ok(())
}

fn cmd_labels(labels: &Path) -> Result<()> {
    let codec = LabelCodec::load(labels)?;

    println!("{}", "Label Codec:".cyan().bold());
    println!("  Classes: {}", codec.class_count());
    for (i, name) in codec.classes().iter().enumerate() {
        println!("  {:>3}  {}", i, name);
    }
    Ok(())
}

fn cmd_preview(input: &Path, output: &Path) -> Result<()> {
    let preprocessor = ImagePreprocessor::default();
    let tensor = preprocessor.preprocess(ImageSource::Path(input))?;
    let image = preprocessor.denormalize(&tensor);
    image
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "{} {:?} -> {}",
        "Saved model input".green(),
        tensor.shape(),
        output.display()
    );
    Ok(())
}
