//! Error types for render-test-rs.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using RenderTestError.
pub type RenderTestResult<T> = Result<T, RenderTestError>;

/// Errors that can occur while loading, running or comparing a scenario.
#[derive(Debug, Error)]
pub enum RenderTestError {
    /// Failed to read or write a file.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid JSON.
    #[error("Failed to parse {path:?} at line {line}, column {column}: {message}")]
    JsonParse {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    /// A `metadata.test` entry has the wrong type or an out of range value.
    #[error("Invalid test metadata in {path:?}: {message}")]
    InvalidMetadata { path: PathBuf, message: String },

    /// The scenario asks for a harness feature that is not implemented.
    #[error("Unsupported test feature `{feature}` in {path:?}")]
    UnsupportedFeature { path: PathBuf, feature: String },

    /// Image encoding or decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// The golden image for a scenario does not exist.
    #[error("Failed to load expected image {0:?}")]
    MissingExpectedImage(PathBuf),

    /// Expected and actual images have different dimensions.
    #[error("Expected and actual image sizes differ: expected {expected:?}, actual {actual:?}")]
    ImageSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// The pixel difference algorithm failed.
    #[error("Pixel diff error: {0}")]
    PixelDiff(String),

    /// The renderer backend failed to create an instance or a frame.
    #[error("Renderer error: {0}")]
    Renderer(String),
}

impl RenderTestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RenderTestError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Error produced by the engine when a JSON value cannot be converted into a
/// typed style object (filter, layer, source, light or property value).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConversionError {
    pub message: String,
}

impl ConversionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised while replaying a single scripted operation. None of these
/// abort a scenario.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("Malformed operation: {0}")]
    Malformed(String),

    #[error("Invalid arguments for `{operation}`: {message}")]
    InvalidArguments { operation: String, message: String },

    #[error("Unsupported operation {0}")]
    Unsupported(String),

    #[error("Unable to convert {kind}: {source}")]
    Conversion {
        kind: &'static str,
        #[source]
        source: ConversionError,
    },

    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    #[error("Unable to set property `{property}` on layer `{layer}`: {source}")]
    Property {
        layer: String,
        property: String,
        #[source]
        source: ConversionError,
    },

    #[error("Failed to load image {path:?}: {message}")]
    ImageLoad { path: PathBuf, message: String },

    #[error("Failed to load style {path}: {source}")]
    StyleLoad {
        path: String,
        #[source]
        source: Box<RenderTestError>,
    },

    #[error(transparent)]
    Render(#[from] RenderTestError),
}
