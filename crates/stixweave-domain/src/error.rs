//! Capability error classification

use thiserror::Error;

/// Error returned by any external capability (reasoning, reference lookup, draft validation)
///
/// Every failure is classified up front so the retry layer never has to guess.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// Worth retrying with the identical payload (network, timeout, rate limit, 5xx)
    #[error("transient failure: {0}")]
    Transient(String),

    /// Retrying cannot help (authentication, malformed request, quota)
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl CapabilityError {
    /// Whether the failure should be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, CapabilityError::Transient(_))
    }

    /// The failure message without classification
    pub fn message(&self) -> &str {
        match self {
            CapabilityError::Transient(m) | CapabilityError::Permanent(m) => m,
        }
    }
}
