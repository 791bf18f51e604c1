//! Pipeline orchestration

use crate::agent::{ChunkOutcome, ExtractionAgent};
use crate::chunking::Segmenter;
use crate::config::{ExecutionMode, ExtractorConfig};
use crate::error::ExtractorError;
use crate::prompt::PromptBuilder;
use crate::reference::ReferenceCorpus;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use stixweave_bundler::{Bundler, ChunkObjects};
use stixweave_domain::{
    Chunk, ChunkStatus, DraftValidator, ReasoningService, ReferenceLookup, RunResult,
};
use stixweave_gatekeeper::{DraftGatekeeper, FieldCompleter};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Converts a document into a STIX bundle
///
/// Segments the text, runs one [`ExtractionAgent`] loop per chunk, waits for
/// every chunk, then hands the ordered results to the [`Bundler`].
pub struct Extractor {
    reasoner: Arc<dyn ReasoningService>,
    reference: Arc<dyn ReferenceLookup>,
    validator: Arc<dyn DraftValidator>,
    completer: FieldCompleter,
    source_name: Option<String>,
    config: ExtractorConfig,
}

impl Extractor {
    /// Create an Extractor backed by the built-in reference corpus and the
    /// local draft gatekeeper
    ///
    /// # Errors
    ///
    /// `Config` when the configuration does not validate.
    pub fn new(
        reasoner: Arc<dyn ReasoningService>,
        config: ExtractorConfig,
    ) -> Result<Self, ExtractorError> {
        Segmenter::new(config.chunk_size, config.overlap)?;
        config.validate().map_err(ExtractorError::Config)?;
        let validator = DraftGatekeeper::new(config.draft_validation.clone())?;
        Ok(Self {
            reasoner,
            reference: Arc::new(ReferenceCorpus::builtin()),
            validator: Arc::new(validator),
            completer: FieldCompleter::new(),
            source_name: None,
            config,
        })
    }

    /// Use another reference lookup
    pub fn with_reference(mut self, reference: Arc<dyn ReferenceLookup>) -> Self {
        self.reference = reference;
        self
    }

    /// Use another draft validator
    pub fn with_validator(mut self, validator: Arc<dyn DraftValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Use a specific field completer, e.g. one with a fixed timestamp
    pub fn with_completer(mut self, completer: FieldCompleter) -> Self {
        self.completer = completer;
        self
    }

    /// Name the source document in chunk prompts
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Convert `text` into a bundle
    pub async fn run(&self, text: &str) -> Result<RunResult, ExtractorError> {
        self.run_with_cancel(text, CancellationToken::new()).await
    }

    /// Convert `text` into a bundle, stopping early when `cancel` fires
    ///
    /// # Errors
    ///
    /// `Segmentation` for invalid chunking parameters, `Cancelled` when the
    /// token fired and partial output is not enabled, `Bundle` when
    /// post-processing fails. Chunk failures are reported, not returned.
    pub async fn run_with_cancel(
        &self,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<RunResult, ExtractorError> {
        let started = Instant::now();
        let segmenter = Segmenter::new(self.config.chunk_size, self.config.overlap)?;
        let chunks = segmenter.segment(text);
        info!(
            "Segmented {} characters into {} chunks ({:?} execution)",
            text.chars().count(),
            chunks.len(),
            self.config.execution
        );

        let agent = self.agent();
        let outcomes = match self.config.execution {
            ExecutionMode::Sequential => self.run_sequential(&agent, &chunks, &cancel).await,
            ExecutionMode::Parallel => self.run_parallel(&agent, &chunks, &cancel).await,
        };

        if cancel.is_cancelled() {
            if !self.config.emit_partial_on_cancel {
                warn!("Run cancelled after {:?}", started.elapsed());
                return Err(ExtractorError::Cancelled);
            }
            warn!("Run cancelled, assembling finished chunks");
        }

        let mut notes = Vec::new();
        for outcome in &outcomes {
            match (&outcome.status, &outcome.error) {
                (ChunkStatus::Incomplete, Some(e)) => {
                    notes.push(format!("chunk {} incomplete: {}", outcome.index + 1, e))
                }
                (ChunkStatus::Failed, Some(e)) => {
                    notes.push(format!("chunk {} failed: {}", outcome.index + 1, e))
                }
                _ => {}
            }
        }
        let reports = outcomes.iter().map(ChunkOutcome::report).collect();
        let chunk_objects = outcomes
            .into_iter()
            .map(|outcome| ChunkObjects {
                index: outcome.index,
                objects: outcome.objects,
            })
            .collect();

        let bundler = Bundler::new(self.config.bundler.clone()).with_completer(self.completer.clone());
        let mut assembly = bundler.assemble(chunk_objects, Some(text))?;
        notes.append(&mut assembly.report.notes);
        assembly.report.notes = notes;

        info!(
            "Run finished in {:?}: {} objects; {}",
            started.elapsed(),
            assembly.bundle.objects.len(),
            assembly.stats.summary()
        );

        Ok(RunResult {
            bundle: assembly.bundle,
            report: assembly.report,
            chunks: reports,
            stats: assembly.stats,
        })
    }

    fn agent(&self) -> ExtractionAgent {
        let mut prompts = PromptBuilder::new();
        if let Some(name) = &self.source_name {
            prompts = prompts.with_source_name(name.clone());
        }
        ExtractionAgent::new(
            Arc::clone(&self.reasoner),
            Arc::clone(&self.reference),
            Arc::clone(&self.validator),
            &self.config,
        )
        .with_prompts(prompts)
    }

    async fn run_sequential(
        &self,
        agent: &ExtractionAgent,
        chunks: &[Chunk],
        cancel: &CancellationToken,
    ) -> Vec<ChunkOutcome> {
        let mut outcomes = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if cancel.is_cancelled() {
                outcomes.push(cancelled(chunk));
                continue;
            }
            outcomes.push(agent.run(chunk, cancel).await);
        }
        outcomes
    }

    /// Chunks run through a pool of `concurrency` loops; results come back in
    /// chunk order
    async fn run_parallel(
        &self,
        agent: &ExtractionAgent,
        chunks: &[Chunk],
        cancel: &CancellationToken,
    ) -> Vec<ChunkOutcome> {
        stream::iter(chunks.iter().map(|chunk| agent.run(chunk, cancel)))
            .buffered(self.config.concurrency)
            .collect()
            .await
    }
}

fn cancelled(chunk: &Chunk) -> ChunkOutcome {
    ChunkOutcome {
        index: chunk.index,
        status: ChunkStatus::Failed,
        objects: Vec::new(),
        iterations: 0,
        error: Some("cancelled".to_string()),
    }
}
