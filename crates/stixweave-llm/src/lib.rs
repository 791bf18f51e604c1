//! Stixweave LLM Provider Layer
//!
//! Implementations of the `ReasoningService` trait from `stixweave-domain`.
//!
//! # Providers
//!
//! - `MockReasoner`: Scripted, deterministic replies for testing
//! - `OpenAiProvider`: Any OpenAI-compatible chat-completions endpoint with tool calling
//!
//! # Failure classification
//!
//! Every `LlmError` is either transient or permanent, and converts into the
//! domain's `CapabilityError` accordingly. Providers never retry on their own;
//! that is the extraction loop's job.
//!
//! # Examples
//!
//! ```
//! use stixweave_llm::MockReasoner;
//! use stixweave_domain::{ConversationState, ReasoningReply, ReasoningService};
//!
//! # tokio_test::block_on(async {
//! let reasoner = MockReasoner::new("[]");
//! let state = ConversationState::new("system", "chunk text");
//! let reply = reasoner.invoke(&state).await.unwrap();
//! assert_eq!(reply, ReasoningReply::Final("[]".to_string()));
//! # });
//! ```

#![warn(missing_docs)]

pub mod openai;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use stixweave_domain::{
    CapabilityError, ConversationState, ReasoningReply, ReasoningService, ToolCall, Turn,
};
use thiserror::Error;

pub use openai::OpenAiProvider;

/// Errors that can occur during LLM operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Network or API communication error
    #[error("Communication error: {0}")]
    Communication(String),

    /// The request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Non-success HTTP status
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// Status code
        status: u16,
        /// Response body (possibly truncated)
        body: String,
    },

    /// Invalid response from LLM
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Provider misconfiguration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic error
    #[error("LLM error: {0}")]
    Other(String),
}

/// Whether an HTTP status is worth retrying
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 409 | 425 | 429) || (500..600).contains(&status)
}

impl LlmError {
    /// Whether retrying the identical request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Communication(_) | LlmError::Timeout(_) => true,
            LlmError::HttpStatus { status, .. } => is_transient_status(*status),
            LlmError::InvalidResponse(_) | LlmError::Configuration(_) | LlmError::Other(_) => {
                false
            }
        }
    }
}

impl From<LlmError> for CapabilityError {
    fn from(err: LlmError) -> Self {
        if err.is_transient() {
            CapabilityError::Transient(err.to_string())
        } else {
            CapabilityError::Permanent(err.to_string())
        }
    }
}

/// One scripted step of a [`MockReasoner`]
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Reply normally
    Reply(ReasoningReply),
    /// Fail the call
    Fail(CapabilityError),
}

impl MockStep {
    /// A final answer
    pub fn answer(text: impl Into<String>) -> Self {
        MockStep::Reply(ReasoningReply::Final(text.into()))
    }

    /// A single tool call
    pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        MockStep::Reply(ReasoningReply::ToolCalls(vec![ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }]))
    }

    /// A transient failure
    pub fn transient(message: &str) -> Self {
        MockStep::Fail(CapabilityError::Transient(message.to_string()))
    }

    /// A permanent failure
    pub fn permanent(message: &str) -> Self {
        MockStep::Fail(CapabilityError::Permanent(message.to_string()))
    }
}

#[derive(Debug, Default)]
struct Script {
    steps: Vec<MockStep>,
    cursor: usize,
}

/// Mock reasoning service for deterministic testing
///
/// Scripts are keyed by a marker substring looked up in the chunk prompt, so
/// each chunk of a run can be given its own behavior. Each call consumes the
/// next step of the matching script; the last step repeats once the script is
/// exhausted. Prompts with no matching marker get the default answer.
///
/// # Examples
///
/// ```
/// use stixweave_llm::{MockReasoner, MockStep};
/// use stixweave_domain::{ConversationState, ReasoningService};
///
/// # tokio_test::block_on(async {
/// let mut reasoner = MockReasoner::default();
/// reasoner.add_script("PART-B", vec![MockStep::permanent("401 unauthorized")]);
///
/// let ok = ConversationState::new("sys", "PART-A text");
/// assert!(reasoner.invoke(&ok).await.is_ok());
///
/// let bad = ConversationState::new("sys", "PART-B text");
/// assert!(reasoner.invoke(&bad).await.is_err());
/// assert_eq!(reasoner.call_count(), 2);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MockReasoner {
    default_answer: String,
    scripts: Arc<Mutex<Vec<(String, Script)>>>,
    call_count: Arc<Mutex<usize>>,
    calls_by_marker: Arc<Mutex<HashMap<String, usize>>>,
}

impl MockReasoner {
    /// Create a mock that answers every prompt with `answer`
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            default_answer: answer.into(),
            scripts: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
            calls_by_marker: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Script the replies for prompts containing `marker`
    pub fn add_script(&mut self, marker: impl Into<String>, steps: Vec<MockStep>) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push((marker.into(), Script { steps, cursor: 0 }));
        }
    }

    /// Builder form of [`MockReasoner::add_script`]
    pub fn with_script(mut self, marker: impl Into<String>, steps: Vec<MockStep>) -> Self {
        self.add_script(marker, steps);
        self
    }

    /// Total number of invocations
    pub fn call_count(&self) -> usize {
        self.call_count.lock().map(|c| *c).unwrap_or(0)
    }

    /// Number of invocations that matched `marker`
    pub fn calls_for(&self, marker: &str) -> usize {
        self.calls_by_marker
            .lock()
            .ok()
            .and_then(|m| m.get(marker).copied())
            .unwrap_or(0)
    }

    /// Reset the call counters
    pub fn reset_call_count(&self) {
        if let Ok(mut c) = self.call_count.lock() {
            *c = 0;
        }
        if let Ok(mut m) = self.calls_by_marker.lock() {
            m.clear();
        }
    }

    fn next_step(&self, prompt: &str) -> Result<MockStep, CapabilityError> {
        let mut scripts = self
            .scripts
            .lock()
            .map_err(|_| CapabilityError::Permanent("mock script lock poisoned".to_string()))?;
        for (marker, script) in scripts.iter_mut() {
            if !prompt.contains(marker.as_str()) {
                continue;
            }
            if let Ok(mut m) = self.calls_by_marker.lock() {
                *m.entry(marker.clone()).or_insert(0) += 1;
            }
            let Some(last) = script.steps.len().checked_sub(1) else {
                break;
            };
            let step = script.steps[script.cursor.min(last)].clone();
            script.cursor += 1;
            return Ok(step);
        }
        Ok(MockStep::answer(self.default_answer.clone()))
    }
}

impl Default for MockReasoner {
    fn default() -> Self {
        Self::new("[]")
    }
}

fn chunk_prompt(conversation: &ConversationState) -> &str {
    conversation
        .turns()
        .iter()
        .find_map(|t| match t {
            Turn::User { content } => Some(content.as_str()),
            _ => None,
        })
        .unwrap_or_default()
}

#[async_trait]
impl ReasoningService for MockReasoner {
    async fn invoke(
        &self,
        conversation: &ConversationState,
    ) -> Result<ReasoningReply, CapabilityError> {
        if let Ok(mut c) = self.call_count.lock() {
            *c += 1;
        }
        match self.next_step(chunk_prompt(conversation))? {
            MockStep::Reply(reply) => Ok(reply),
            MockStep::Fail(err) => Err(err),
        }
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}
