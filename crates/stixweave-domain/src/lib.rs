//! Stixweave Domain Layer
//!
//! Core model shared by every other crate: identifiers, STIX objects and
//! bundles, text chunks, per-chunk conversation state, the capability traits
//! the extraction loop talks to, and the report types a run produces.
//!
//! ## Key Concepts
//!
//! - **StixId**: `{type}--{UUIDv4}`, checked against a bit-exact grammar
//! - **StixObject**: a typed node or a relationship edge with free-form properties
//! - **Bundle**: the container holding every object of a run
//! - **ConversationState**: header turns plus atomic exchange groups
//! - **Capabilities**: reasoning, reference lookup and draft validation
//!
//! ## Architecture
//!
//! Pure data and trait definitions; infrastructure implementations live in
//! other crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bundle;
pub mod chunk;
pub mod conversation;
pub mod error;
pub mod id;
pub mod object;
pub mod report;
pub mod traits;

// Re-exports for convenience
pub use bundle::{Bundle, SPEC_VERSION};
pub use chunk::Chunk;
pub use conversation::{ConversationState, ToolCall, Turn};
pub use error::CapabilityError;
pub use id::StixId;
pub use object::StixObject;
pub use report::{
    CandidateKind, ChunkReport, ChunkStatus, EdgeSummary, IdAudit, MissingCandidate,
    PipelineStats, RemappedRelationship, RemovedRelationship, RunResult, StrippedReference,
    ValidationReport,
};
pub use traits::{
    DraftValidator, DraftVerdict, ReasoningReply, ReasoningService, ReferenceLookup,
    SEARCH_REFERENCE_TOOL, VALIDATE_DRAFT_TOOL,
};
