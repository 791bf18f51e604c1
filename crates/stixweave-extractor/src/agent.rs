//! Per-chunk extraction loop
//!
//! An explicit think/act/observe state machine:
//!
//! ```text
//! THINK ──final answer──────────────▶ DONE
//!   │  └─unparseable answer─▶ (answer + feedback) ─▶ THINK
//!   └─tool calls─▶ ACT ─▶ observations ─▶ THINK
//! any unrecoverable call failure ─────▶ FAILED
//! iteration cap reached ──────────────▶ INCOMPLETE (last validated draft)
//! ```

use crate::config::ExtractorConfig;
use crate::parser::{objects_from_values, parse_draft_arguments, parse_objects};
use crate::prompt::PromptBuilder;
use crate::retry::{RetryError, RetryPolicy};
use crate::window::WindowManager;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use stixweave_domain::{
    CapabilityError, Chunk, ChunkReport, ChunkStatus, ConversationState, DraftValidator,
    ReasoningReply, ReasoningService, ReferenceLookup, StixObject, ToolCall,
    SEARCH_REFERENCE_TOOL, VALIDATE_DRAFT_TOOL,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one chunk's loop
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutcome {
    /// Chunk index
    pub index: usize,
    /// Final status
    pub status: ChunkStatus,
    /// Extracted objects (empty when failed)
    pub objects: Vec<StixObject>,
    /// Reasoning cycles used
    pub iterations: usize,
    /// Failure or degradation detail
    pub error: Option<String>,
}

impl ChunkOutcome {
    /// Summary for the run report
    pub fn report(&self) -> ChunkReport {
        ChunkReport {
            index: self.index,
            status: self.status,
            objects: self.objects.len(),
            iterations: self.iterations,
            error: self.error.clone(),
        }
    }
}

enum LoopState {
    Think,
    Act(Vec<ToolCall>),
    Done(Vec<StixObject>),
    Incomplete,
    Failed(String),
}

/// Runs the reasoning loop for one chunk at a time
pub struct ExtractionAgent {
    reasoner: Arc<dyn ReasoningService>,
    reference: Arc<dyn ReferenceLookup>,
    validator: Arc<dyn DraftValidator>,
    prompts: PromptBuilder,
    window: WindowManager,
    retry: RetryPolicy,
    max_iterations: usize,
    call_timeout: Duration,
}

impl ExtractionAgent {
    /// Create an agent over the three capabilities
    pub fn new(
        reasoner: Arc<dyn ReasoningService>,
        reference: Arc<dyn ReferenceLookup>,
        validator: Arc<dyn DraftValidator>,
        config: &ExtractorConfig,
    ) -> Self {
        Self {
            reasoner,
            reference,
            validator,
            prompts: PromptBuilder::new(),
            window: WindowManager::new(config.max_turns),
            retry: RetryPolicy::from_config(&config.retry),
            max_iterations: config.max_iterations,
            call_timeout: config.call_timeout(),
        }
    }

    /// Use a specific prompt builder
    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    /// Run the loop for `chunk`
    ///
    /// Never returns an error: every failure is folded into the outcome.
    pub async fn run(&self, chunk: &Chunk, cancel: &CancellationToken) -> ChunkOutcome {
        if chunk.text.trim().is_empty() {
            debug!("{} is empty, skipping", chunk.label());
            return self.finish(chunk, ChunkStatus::Done, Vec::new(), 0, None);
        }

        let mut conversation = ConversationState::new(
            self.prompts.system_prompt(),
            self.prompts.chunk_prompt(chunk),
        );
        let mut last_draft: Option<Vec<StixObject>> = None;
        let mut iterations = 0;
        let mut state = LoopState::Think;

        loop {
            state = match state {
                LoopState::Think if iterations >= self.max_iterations => LoopState::Incomplete,
                LoopState::Think => {
                    iterations += 1;
                    self.window.compress(&mut conversation);
                    debug!(
                        chunk = chunk.index,
                        iteration = iterations,
                        turns = conversation.len(),
                        "Invoking {}",
                        self.reasoner.model_id()
                    );
                    let conv = &conversation;
                    let reply = self
                        .retry
                        .run("reason", cancel, move || self.timed(self.reasoner.invoke(conv)))
                        .await;
                    match reply {
                        Ok(ReasoningReply::Final(answer)) => match parse_objects(&answer) {
                            Ok(objects) => LoopState::Done(objects),
                            Err(e) => {
                                warn!("{}: unusable answer: {}", chunk.label(), e);
                                let feedback = self.prompts.correction(&e.to_string());
                                conversation.push_rejected_answer(answer, feedback);
                                LoopState::Think
                            }
                        },
                        Ok(ReasoningReply::ToolCalls(calls)) if calls.is_empty() => {
                            let feedback = self.prompts.correction("no answer and no tool calls");
                            conversation.push_rejected_answer("", feedback);
                            LoopState::Think
                        }
                        Ok(ReasoningReply::ToolCalls(calls)) => LoopState::Act(calls),
                        Err(e) => LoopState::Failed(e.to_string()),
                    }
                }
                LoopState::Act(calls) => {
                    debug!(chunk = chunk.index, calls = calls.len(), "Executing tool calls");
                    conversation.push_action(None, calls.clone());
                    let mut failure = None;
                    for call in &calls {
                        match self.execute(call, cancel, &mut last_draft).await {
                            Ok(observation) => {
                                conversation.push_observation(&call.id, &call.name, observation)
                            }
                            Err(e) => {
                                failure = Some(e.to_string());
                                break;
                            }
                        }
                    }
                    match failure {
                        Some(error) => LoopState::Failed(error),
                        None => LoopState::Think,
                    }
                }
                LoopState::Done(objects) => {
                    return self.finish(chunk, ChunkStatus::Done, objects, iterations, None);
                }
                LoopState::Incomplete => {
                    let objects = last_draft.take().unwrap_or_default();
                    let detail = format!(
                        "no final answer after {} iterations; kept last draft of {} objects",
                        iterations,
                        objects.len()
                    );
                    return self.finish(chunk, ChunkStatus::Incomplete, objects, iterations, Some(detail));
                }
                LoopState::Failed(error) => {
                    return self.finish(chunk, ChunkStatus::Failed, Vec::new(), iterations, Some(error));
                }
            };
        }
    }

    fn finish(
        &self,
        chunk: &Chunk,
        status: ChunkStatus,
        objects: Vec<StixObject>,
        iterations: usize,
        error: Option<String>,
    ) -> ChunkOutcome {
        match &error {
            Some(e) if status == ChunkStatus::Failed => warn!("{} failed: {}", chunk.label(), e),
            Some(e) => warn!("{} {}: {}", chunk.label(), status, e),
            None => info!(
                "{} {}: {} objects in {} iterations",
                chunk.label(),
                status,
                objects.len(),
                iterations
            ),
        }
        ChunkOutcome {
            index: chunk.index,
            status,
            objects,
            iterations,
            error,
        }
    }

    /// Execute one tool call
    ///
    /// Bad tool names and arguments become error observations; only capability
    /// failures surface as errors.
    async fn execute(
        &self,
        call: &ToolCall,
        cancel: &CancellationToken,
        last_draft: &mut Option<Vec<StixObject>>,
    ) -> Result<String, RetryError> {
        match call.name.as_str() {
            SEARCH_REFERENCE_TOOL => {
                let Some(query) = call.arguments.get("query").and_then(Value::as_str) else {
                    return Ok(format!(
                        "Error: {} expects {{\"query\": string}}",
                        SEARCH_REFERENCE_TOOL
                    ));
                };
                let snippets = self
                    .retry
                    .run(SEARCH_REFERENCE_TOOL, cancel, move || {
                        self.timed(self.reference.search(query))
                    })
                    .await?;
                if snippets.is_empty() {
                    Ok(format!("No reference material found for '{}'.", query))
                } else {
                    Ok(snippets.join("\n---\n"))
                }
            }
            VALIDATE_DRAFT_TOOL => {
                let objects = match parse_draft_arguments(&call.arguments) {
                    Ok(objects) => objects,
                    Err(e) => return Ok(format!("Error: {}", e)),
                };
                *last_draft = Some(objects_from_values(objects.clone()));
                let draft = &objects;
                let verdict = self
                    .retry
                    .run(VALIDATE_DRAFT_TOOL, cancel, move || {
                        self.timed(self.validator.validate(draft))
                    })
                    .await?;
                Ok(json!({"ok": verdict.ok, "errors": verdict.errors}).to_string())
            }
            other => Ok(format!(
                "Error: unknown tool '{}'. Available tools: {}, {}",
                other, SEARCH_REFERENCE_TOOL, VALIDATE_DRAFT_TOOL
            )),
        }
    }

    /// Bound a capability call by the per-call timeout
    async fn timed<T>(
        &self,
        call: impl Future<Output = Result<T, CapabilityError>>,
    ) -> Result<T, CapabilityError> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CapabilityError::Transient(format!(
                "call timed out after {}s",
                self.call_timeout.as_secs()
            ))),
        }
    }
}
