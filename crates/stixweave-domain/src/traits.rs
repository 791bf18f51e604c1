//! Trait definitions for external interactions
//!
//! These traits define the boundaries between the pipeline and the services
//! it depends on. Implementations live in other crates (stixweave-llm,
//! stixweave-gatekeeper, stixweave-extractor) or in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::{ConversationState, ToolCall};
use crate::error::CapabilityError;

/// Tool name for reference lookup
pub const SEARCH_REFERENCE_TOOL: &str = "search_reference";

/// Tool name for draft validation
pub const VALIDATE_DRAFT_TOOL: &str = "validate_draft";

/// What the reasoning service decided to do next
#[derive(Debug, Clone, PartialEq)]
pub enum ReasoningReply {
    /// A final answer; expected to contain the extracted objects as JSON
    Final(String),

    /// One or more tool invocations to execute before thinking again
    ToolCalls(Vec<ToolCall>),
}

/// Outcome of validating a draft object set
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DraftVerdict {
    /// True when no errors were found
    pub ok: bool,

    /// Human-readable problems
    pub errors: Vec<String>,
}

impl DraftVerdict {
    /// Build a verdict from a list of errors
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            ok: errors.is_empty(),
            errors,
        }
    }
}

/// The external reasoning/completion service
///
/// Implemented by the infrastructure layer (stixweave-llm). Must behave
/// identically when retried with the same conversation.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Ask for the next step given the full (window-compressed) conversation
    async fn invoke(&self, conversation: &ConversationState)
        -> Result<ReasoningReply, CapabilityError>;

    /// Identifier for logs
    fn model_id(&self) -> &str;
}

/// Lookup of reference material about the output format
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    /// Ranked snippets relevant to `query`, best first
    async fn search(&self, query: &str) -> Result<Vec<String>, CapabilityError>;
}

/// Checks a candidate object set before the model commits to it
#[async_trait]
pub trait DraftValidator: Send + Sync {
    /// Validate candidate objects
    async fn validate(&self, objects: &[Value]) -> Result<DraftVerdict, CapabilityError>;
}
