//! Gatekeeper configuration

use serde::{Deserialize, Serialize};

/// Configuration for draft validation rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Report fields the field completer would fill anyway (timestamps, `spec_version`, type defaults)
    pub require_defaultable_fields: bool,

    /// Reject object types outside the known STIX 2.1 table
    pub reject_unknown_types: bool,

    /// Require relationship endpoints to reference objects in the same draft
    pub require_reference_closure: bool,

    /// Maximum number of problems reported back per draft
    pub max_errors: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            require_defaultable_fields: false,
            reject_unknown_types: false,
            require_reference_closure: true,
            max_errors: 20,
        }
    }
}

impl ValidationConfig {
    /// Create a permissive configuration (structural checks only)
    pub fn permissive() -> Self {
        Self {
            require_defaultable_fields: false,
            reject_unknown_types: false,
            require_reference_closure: false,
            max_errors: 20,
        }
    }

    /// Create a strict configuration (every required field, known types only)
    pub fn strict() -> Self {
        Self {
            require_defaultable_fields: true,
            reject_unknown_types: true,
            require_reference_closure: true,
            max_errors: 50,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_errors == 0 {
            return Err("max_errors must be greater than 0".to_string());
        }
        Ok(())
    }
}
