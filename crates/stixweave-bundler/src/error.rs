//! Error types for bundle post-processing

use thiserror::Error;

/// Errors that can occur while assembling a bundle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BundlerError {
    /// A fresh identifier could not be made unique
    #[error("Identifier generation failed: {0}")]
    IdGeneration(String),
}
