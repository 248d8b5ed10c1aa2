//! Error Handling Module
//!
//! Defines the closed set of failures the inference pipeline can produce.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Who is at fault for a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input was bad; the caller can correct it and try again
    Client,
    /// The service itself is broken (bad artifacts or an internal bug)
    Server,
}

/// Main error type for DermaCare operations
#[derive(Error, Debug)]
pub enum DermaCareError {
    /// The image source is not readable or does not decode as an image
    #[error("Failed to decode image from {source_desc}: {reason}")]
    Decode { source_desc: String, reason: String },

    /// A tensor does not have the shape the classifier was built for
    #[error("Tensor shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The weight blob is missing, corrupt, or disagrees with the topology
    #[error("Failed to load weights from '{0}': {1}")]
    WeightLoad(PathBuf, String),

    /// The label codec artifact is missing or corrupt
    #[error("Failed to load label codec from '{0}': {1}")]
    CodecLoad(PathBuf, String),

    /// A class index has no name in the codec
    #[error("Unknown class index {index} (codec has {class_count} classes)")]
    UnknownIndex { index: usize, class_count: usize },

    /// The classifier produced scores no class can be picked from
    #[error("Classifier produced an invalid output: {0}")]
    InvalidOutput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DermaCareError {
    /// Build a decode error for an image that came from a file
    pub fn decode_path(path: &std::path::Path, reason: impl ToString) -> Self {
        Self::Decode {
            source_desc: format!("'{}'", path.display()),
            reason: reason.to_string(),
        }
    }

    /// Build a decode error for an in-memory image
    pub fn decode_bytes(len: usize, reason: impl ToString) -> Self {
        Self::Decode {
            source_desc: format!("{} byte buffer", len),
            reason: reason.to_string(),
        }
    }

    /// Classify the error as a client or server fault
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode { .. } => ErrorKind::Client,
            Self::ShapeMismatch { .. }
            | Self::WeightLoad(..)
            | Self::CodecLoad(..)
            | Self::UnknownIndex { .. }
            | Self::InvalidOutput(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Serialization(_) => ErrorKind::Server,
        }
    }

    /// Whether the caller can fix this by sending different input
    pub fn is_client_error(&self) -> bool {
        self.kind() == ErrorKind::Client
    }
}

impl From<serde_json::Error> for DermaCareError {
    fn from(err: serde_json::Error) -> Self {
        DermaCareError::Serialization(err.to_string())
    }
}

/// Convenience Result type for DermaCare operations
pub type Result<T> = std::result::Result<T, DermaCareError>;
