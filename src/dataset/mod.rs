//! Dataset module: everything between a raw upload and the model input
//!
//! - `preprocess`: decoding, resizing and normalization of images
//! - `labels`: the persisted class index <-> name table

pub mod labels;
pub mod preprocess;

// Re-export main types for convenience
pub use labels::LabelCodec;
pub use preprocess::{
    ImagePreprocessor, ImageSource, ImageTensor, PreprocessConfig, IMAGENET_MEAN, IMAGENET_STD,
};
