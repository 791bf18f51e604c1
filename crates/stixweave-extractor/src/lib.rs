//! Stixweave Extractor
//!
//! Converts unstructured threat-intelligence text into a STIX 2.1 bundle by
//! driving a reasoning service over overlapping chunks of the document.
//!
//! # Overview
//!
//! ```text
//! Text → Segmenter → ExtractionAgent × N → Bundler → RunResult
//!                     │  ├─ WindowManager (bounded conversation)
//!                     │  ├─ RetryPolicy (transient failures)
//!                     │  └─ tools: search_reference, validate_draft
//! ```
//!
//! # Key Features
//!
//! - **Segmentation**: fixed-stride chunks with character offsets and overlap
//! - **Tool-using loop**: an explicit think/act/observe state machine per chunk
//! - **Failure isolation**: a failed chunk contributes nothing and the run continues
//! - **Cancellation**: a run-level token interrupts calls and backoff sleeps
//! - **Sequential or bounded-parallel** chunk scheduling with ordered results
//!
//! # Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use stixweave_extractor::{Extractor, ExtractorConfig};
//! use stixweave_llm::MockReasoner;
//!
//! # tokio_test::block_on(async {
//! let reasoner = MockReasoner::new(
//!     r#"[{"type": "malware", "id": "malware--x", "name": "Emotet", "is_family": true}]"#,
//! );
//! let extractor = Extractor::new(Arc::new(reasoner), ExtractorConfig::default())?;
//!
//! let result = extractor.run("Emotet was delivered by phishing mail.").await?;
//! assert_eq!(result.bundle.objects.len(), 1);
//! assert!(result.report.id_audit.is_clean());
//! # Ok::<(), stixweave_extractor::ExtractorError>(())
//! # }).unwrap();
//! ```

#![warn(missing_docs)]

mod agent;
mod chunking;
mod config;
mod error;
mod extractor;
mod parser;
mod prompt;
mod reference;
mod retry;
mod window;

#[cfg(test)]
mod tests;

pub use agent::{ChunkOutcome, ExtractionAgent};
pub use chunking::Segmenter;
pub use config::{ExecutionMode, ExtractorConfig, RetryConfig};
pub use error::ExtractorError;
pub use extractor::Extractor;
pub use parser::parse_objects;
pub use prompt::PromptBuilder;
pub use reference::{ReferenceCorpus, ReferenceEntry, DEFAULT_TOP_K};
pub use retry::{RetryError, RetryPolicy};
pub use window::{WindowManager, WindowOutcome};
