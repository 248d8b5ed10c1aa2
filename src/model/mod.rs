//! Model module for the skin condition classifier
//!
//! - `efficientnet`: the EfficientNet-B0 feature extractor
//! - `classifier`: the backbone plus the classification head

pub mod classifier;
pub mod efficientnet;

// Re-export main types for convenience
pub use classifier::{ClassifierHead, SkinClassifier, SkinClassifierConfig, SkinClassifierRecord};
pub use efficientnet::{EfficientNet, EfficientNetConfig};

/// Dropout applied to backbone features before the hidden layer
pub const DEFAULT_DROPOUT: f64 = 0.4;

/// Width of the hidden layer in the classification head
pub const DEFAULT_HIDDEN_UNITS: usize = 512;
