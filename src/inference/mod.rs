//! Inference module: startup loading and per-image prediction
//!
//! - `loader`: builds a [`Predictor`] from weight, codec and config files
//! - `predictor`: preprocess -> classify -> softmax -> argmax -> label

pub mod loader;
pub mod predictor;

// Re-export main types for convenience
pub use loader::{export_model, load_classifier, load_predictor, ModelArtifacts};
pub use predictor::{argmax, top_k, ClassScore, PredictionResult, Predictor};

/// Default number of ranked classes returned by top-k queries
pub const DEFAULT_TOP_K: usize = 3;
