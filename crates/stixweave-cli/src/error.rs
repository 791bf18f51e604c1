//! Error types for the CLI application.

use thiserror::Error;

/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Extraction run failed
    #[error("Extraction error: {0}")]
    Extractor(#[from] stixweave_extractor::ExtractorError),

    /// Bundle post-processing failed
    #[error("Bundle error: {0}")]
    Bundler(#[from] stixweave_bundler::BundlerError),

    /// Reasoning provider could not be set up
    #[error("Provider error: {0}")]
    Provider(#[from] stixweave_llm::LlmError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
