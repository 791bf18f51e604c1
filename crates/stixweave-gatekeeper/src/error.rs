//! Gatekeeper error types

use stixweave_domain::CapabilityError;
use thiserror::Error;

/// Errors that can occur during gatekeeper operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatekeeperError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input that cannot be treated as a STIX object at all
    #[error("Invalid object: {0}")]
    InvalidObject(String),
}

impl From<GatekeeperError> for CapabilityError {
    fn from(err: GatekeeperError) -> Self {
        CapabilityError::Permanent(err.to_string())
    }
}
