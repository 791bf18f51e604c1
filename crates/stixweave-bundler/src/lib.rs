//! Stixweave Bundler
//!
//! Post-processing that turns per-chunk extraction results into one
//! consistent STIX 2.1 bundle.
//!
//! # Overview
//!
//! The Bundler is responsible for:
//! - **Merging**: folding duplicate nodes found in several chunks into one
//!   canonical node and deduplicating identical edges
//! - **Completion**: filling required STIX fields with defaults
//! - **Identifier normalization**: rewriting every non-conforming id and every
//!   reference to it, with collisions renamed
//! - **Relationship remapping**: rewriting or removing edges the
//!   OpenCTI-compatible table does not allow
//! - **Consistency checks**: auditing ids and reporting indicators in the
//!   source text that no object mentions
//!
//! # Stage order
//!
//! | Stage | Module | Changes the bundle |
//! |-------|--------|--------------------|
//! | Merge | [`merger`] | yes |
//! | Complete | `stixweave_gatekeeper::FieldCompleter` | yes |
//! | Normalize ids | [`identifiers`] | yes |
//! | Remap | [`remapper`] | yes |
//! | Audit / scan | [`consistency`] | no |
//!
//! # Usage
//!
//! ```
//! use stixweave_bundler::{Bundler, BundlerConfig};
//! use stixweave_domain::{Bundle, StixObject};
//!
//! # fn main() -> Result<(), stixweave_bundler::BundlerError> {
//! let bundle = Bundle::new(vec![
//!     StixObject::new("malware", "malware-1").with("name", "Ryuk"),
//!     StixObject::new("tool", "tool-1").with("name", "AdFind"),
//!     StixObject::relationship("rel-1", "uses", "malware-1", "tool-1"),
//! ]);
//!
//! let assembly = Bundler::new(BundlerConfig::default()).finalize(bundle, None)?;
//! assert!(assembly.report.id_audit.is_clean());
//! println!("{}", assembly.stats.summary());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! ```toml
//! [bundler]
//! name_normalization = "case_fold"
//! unknown_source_types = "keep"
//! fill_defaults = true
//! scan_missing_candidates = true
//! ```

#![warn(missing_docs)]

mod bundler;
mod config;
mod error;

pub mod consistency;
pub mod identifiers;
pub mod merger;
pub mod remapper;

pub use bundler::{Assembly, Bundler};
pub use config::{collapse_whitespace, BundlerConfig, NameNormalization, UnknownTypePolicy};
pub use consistency::{audit_ids, find_missing_candidates};
pub use error::BundlerError;
pub use identifiers::{normalize_ids, CollisionRename, IdentifierMap, NormalizeOutcome};
pub use merger::{ChunkObjects, MergeConflict, MergeOutcome, Merger};
pub use remapper::{RelationshipRemapper, RemapOutcome};
