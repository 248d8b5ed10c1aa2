//! # DermaCare
//!
//! Skin image classification with the Burn framework.
//!
//! ## Modules
//!
//! - `dataset`: Image preprocessing and the label codec
//! - `model`: EfficientNet-B0 backbone and the classification head
//! - `inference`: Startup loading and the prediction service
//! - `backend`: Compile-time selection of the inference backend
//! - `utils`: Logging and error handling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dermacare::inference::{load_predictor, ModelArtifacts};
//! use dermacare::dataset::ImageSource;
//!
//! let artifacts = ModelArtifacts::new("model/skin_classifier.mpk", "model/labels.json");
//! let predictor = load_predictor::<InferenceBackend>(&artifacts, &default_device())?;
//! let result = predictor.predict(ImageSource::Path(Path::new("mole.jpg")))?;
//! println!("{} ({:.1}%)", result.predicted_class, result.confidence * 100.0);
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod utils;

// Re-export commonly used items for convenience
pub use backend::{default_device, InferenceBackend, InferenceDevice};
pub use dataset::{ImagePreprocessor, ImageSource, ImageTensor, LabelCodec};
pub use inference::{load_predictor, ModelArtifacts, PredictionResult, Predictor};
pub use model::{SkinClassifier, SkinClassifierConfig};
pub use utils::error::{DermaCareError, ErrorKind, Result};

/// Side length of the square model input
pub const IMAGE_SIZE: usize = 224;

/// Number of color channels of the model input
pub const IMAGE_CHANNELS: usize = 3;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
