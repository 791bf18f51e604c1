//! Error types for the Extractor

use stixweave_bundler::BundlerError;
use stixweave_gatekeeper::GatekeeperError;
use thiserror::Error;

/// Errors that end a whole run
///
/// Per-chunk failures never surface here; they are recorded in the chunk's
/// report and the run continues.
#[derive(Error, Debug)]
pub enum ExtractorError {
    /// Invalid segmentation parameters
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    /// The run was cancelled before it finished
    #[error("Run cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bundle post-processing failed
    #[error("Bundle assembly error: {0}")]
    Bundle(#[from] BundlerError),

    /// Invalid object format in a model answer
    #[error("Invalid object format: {0}")]
    InvalidFormat(String),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(String),
}

impl From<serde_json::Error> for ExtractorError {
    fn from(e: serde_json::Error) -> Self {
        ExtractorError::JsonParse(e.to_string())
    }
}

impl From<GatekeeperError> for ExtractorError {
    fn from(e: GatekeeperError) -> Self {
        ExtractorError::Config(e.to_string())
    }
}
