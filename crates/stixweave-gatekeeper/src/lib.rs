//! Stixweave Gatekeeper
//!
//! Quality control for STIX objects before they enter the bundle.
//!
//! The Gatekeeper provides:
//! - Draft validation (required fields, type spelling, relationship closure),
//!   exposed to the extraction loop as the `validate_draft` tool
//! - Field completion (STIX 2.1 defaults for fields models tend to omit)
//! - Type-name canonicalization
//!
//! # Examples
//!
//! ```
//! use stixweave_gatekeeper::{DraftGatekeeper, ValidationConfig};
//! use serde_json::json;
//!
//! let gatekeeper = DraftGatekeeper::new(ValidationConfig::default()).unwrap();
//! let verdict = gatekeeper.validate_objects(&[json!({"type": "tool", "id": "tool--1"})]);
//! assert!(!verdict.ok); // a tool needs a name
//! ```

#![warn(missing_docs)]

mod completer;
mod config;
mod error;
mod required;
mod validator;

pub use completer::{CompletionReport, FieldCompleter};
pub use config::ValidationConfig;
pub use error::GatekeeperError;
pub use required::{
    canonical_type, canonical_verb, is_defaultable, is_known_type, required_fields, stix_timestamp,
};
pub use validator::{DraftGatekeeper, DraftIssue};
