//! Custom error types for doctile.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the doctile library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to load an image file.
    #[error("failed to load image from {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Failed to save an image file.
    #[error("failed to save image to {path}: {source}")]
    ImageSave {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Tile or crop dimensions do not fit the image.
    #[error("invalid geometry for image {height}x{width}: {reason}")]
    InvalidGeometry {
        height: usize,
        width: usize,
        reason: String,
    },

    /// A crop request is out of bounds, wraps around, or is oversized.
    #[error("invalid crop {spec:?} on image {height}x{width}: {reason}")]
    InvalidCrop {
        spec: String,
        height: usize,
        width: usize,
        reason: String,
    },

    /// The pipeline named an operation that does not exist.
    #[error("unknown transform: {0:?}")]
    UnknownTransform(String),

    /// A known operation was given missing or malformed parameters.
    #[error("invalid transform {spec:?}: {reason}")]
    InvalidTransform { spec: String, reason: String },

    /// Failed to load an ONNX model.
    #[error("failed to load ONNX model {name}: {source}")]
    ModelLoad {
        name: String,
        #[source]
        source: ort::Error,
    },

    /// Model inference failed.
    #[error("model inference failed: {source}")]
    Inference {
        #[source]
        source: ort::Error,
    },

    /// A labeled data source could not be read.
    #[error("invalid data source {path}: {reason}")]
    DataSource { path: PathBuf, reason: String },

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shape mismatch in tensor operations.
    #[error("tensor shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },
}

/// Result type alias for doctile operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn shape_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
