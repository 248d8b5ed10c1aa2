//! Startup loading of the inference artifacts
//!
//! Sequence, run once per process:
//! 1. load the label codec
//! 2. read the class count
//! 3. instantiate the classifier for that count
//! 4. read the weight record
//! 5. verify the record's head against the codec and load it
//!
//! Any failure aborts before a single request is served.

use std::path::{Path, PathBuf};

use burn::{
    config::Config,
    module::Module,
    record::{CompactRecorder, Recorder},
    tensor::backend::Backend,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::{ImagePreprocessor, LabelCodec};
use crate::model::{SkinClassifier, SkinClassifierConfig, SkinClassifierRecord};
use crate::utils::error::{DermaCareError, Result};
use crate::utils::logging::StepLogger;

use super::predictor::Predictor;

/// File names used when artifacts are exported into a directory
pub const WEIGHTS_FILE: &str = "skin_classifier.mpk";
pub const LABELS_FILE: &str = "labels.json";
pub const MODEL_CONFIG_FILE: &str = "model_config.json";

/// Locations of the files a predictor is built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelArtifacts {
    /// Burn record with the classifier weights
    pub weights: PathBuf,

    /// Label codec JSON
    pub labels: PathBuf,

    /// Architecture overrides; EfficientNet-B0 defaults when absent
    pub model_config: Option<PathBuf>,
}

impl ModelArtifacts {
    pub fn new(weights: impl Into<PathBuf>, labels: impl Into<PathBuf>) -> Self {
        Self {
            weights: weights.into(),
            labels: labels.into(),
            model_config: None,
        }
    }

    /// Artifacts laid out by [`export_model`]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            weights: dir.join(WEIGHTS_FILE),
            labels: dir.join(LABELS_FILE),
            model_config: Some(dir.join(MODEL_CONFIG_FILE)),
        }
    }

    pub fn with_model_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_config = Some(path.into());
        self
    }
}

/// Burn's file recorders add the `.mpk` extension themselves, so accept both
/// `model` and `model.mpk`
fn resolve_weights_path(path: &Path) -> Result<PathBuf> {
    let with_extension = path.with_extension("mpk");
    if with_extension.is_file() || path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(DermaCareError::WeightLoad(
            path.to_path_buf(),
            "file not found".to_string(),
        ))
    }
}

/// Architecture for a codec of `class_count` classes
fn model_config(artifacts: &ModelArtifacts, class_count: usize) -> Result<SkinClassifierConfig> {
    let mut config = match &artifacts.model_config {
        Some(path) => SkinClassifierConfig::load(path).map_err(|e| {
            DermaCareError::Config(format!("invalid model config {:?}: {:?}", path, e))
        })?,
        None => SkinClassifierConfig::new(class_count),
    };
    // The codec is authoritative for the class count; a stale value in the
    // config file surfaces as a weight mismatch instead
    config.num_classes = class_count;
    Ok(config)
}

/// Check the record's backbone depth and classification head against the
/// instantiated topology
fn verify_record<B: Backend>(
    record: &SkinClassifierRecord<B>,
    config: &SkinClassifierConfig,
    path: &Path,
) -> Result<()> {
    let blocks = record.backbone.blocks.len();
    let expected_blocks = config.backbone().block_count();
    if blocks != expected_blocks {
        return Err(DermaCareError::WeightLoad(
            path.to_path_buf(),
            format!(
                "backbone has {} blocks, architecture expects {}",
                blocks, expected_blocks
            ),
        ));
    }

    let fc1 = record.head.fc1.weight.val().dims();
    let fc2 = record.head.fc2.weight.val().dims();
    let features = config.backbone().feature_dim();

    if fc1 != [features, config.hidden_units] {
        return Err(DermaCareError::WeightLoad(
            path.to_path_buf(),
            format!(
                "hidden layer has shape {:?}, expected {:?}",
                fc1,
                [features, config.hidden_units]
            ),
        ));
    }
    if fc2 != [config.hidden_units, config.num_classes] {
        return Err(DermaCareError::WeightLoad(
            path.to_path_buf(),
            format!(
                "output layer has {} classes, label codec has {}",
                fc2[1], config.num_classes
            ),
        ));
    }
    Ok(())
}

/// Read a weight record into a freshly built classifier
pub fn load_classifier<B: Backend>(
    path: &Path,
    config: &SkinClassifierConfig,
    device: &B::Device,
) -> Result<SkinClassifier<B>> {
    let path = resolve_weights_path(path)?;
    let model = config.init::<B>(device);

    let recorder = CompactRecorder::new();
    let record: SkinClassifierRecord<B> =
        Recorder::<B>::load(&recorder, path.clone(), device)
            .map_err(|e| DermaCareError::WeightLoad(path.clone(), format!("{:?}", e)))?;

    verify_record(&record, config, &path)?;
    Ok(model.load_record(record))
}

/// Build the predictor from its artifacts
pub fn load_predictor<B: Backend>(
    artifacts: &ModelArtifacts,
    device: &B::Device,
) -> Result<Predictor<B>> {
    let mut steps = StepLogger::new("Model startup", 5);

    steps.step(&format!("loading label codec {:?}", artifacts.labels));
    let codec = LabelCodec::load(&artifacts.labels)?;

    steps.step("reading class count");
    let class_count = codec.class_count();
    steps.done(&format!("{} classes: {:?}", class_count, codec.classes()));

    steps.step("instantiating classifier");
    let config = model_config(artifacts, class_count)?;
    info!(
        "EfficientNet width={} depth={}, head {} -> {} -> {}",
        config.width_multiplier,
        config.depth_multiplier,
        config.backbone().feature_dim(),
        config.hidden_units,
        config.num_classes
    );

    steps.step(&format!("loading weights {:?}", artifacts.weights));
    let model = load_classifier::<B>(&artifacts.weights, &config, device)?;

    steps.step("verifying class count");
    let predictor = Predictor::new(model, codec, ImagePreprocessor::default(), device.clone())
        .map_err(|e| DermaCareError::WeightLoad(artifacts.weights.clone(), e.to_string()))?;

    steps.finish();
    Ok(predictor)
}

/// Write weights, codec and architecture so that [`load_predictor`] can
/// rebuild the same model
pub fn export_model<B: Backend>(
    model: SkinClassifier<B>,
    codec: &LabelCodec,
    config: &SkinClassifierConfig,
    dir: &Path,
) -> Result<ModelArtifacts> {
    std::fs::create_dir_all(dir)?;
    let artifacts = ModelArtifacts::in_dir(dir);

    model
        .save_file(&artifacts.weights, &CompactRecorder::new())
        .map_err(|e| DermaCareError::WeightLoad(artifacts.weights.clone(), format!("{:?}", e)))?;
    codec.save(&artifacts.labels)?;
    if let Some(path) = &artifacts.model_config {
        config.save(path)?;
    }

    info!("Exported model artifacts to {:?}", dir);
    Ok(artifacts)
}
