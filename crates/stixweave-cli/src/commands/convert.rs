//! Convert command implementation.

use crate::cli::ConvertArgs;
use crate::commands::{read_input, write_bundle};
use crate::config::{Config, API_KEY_ENV};
use crate::error::Result;
use crate::output::Formatter;
use std::path::Path;
use std::sync::Arc;
use stixweave_domain::{ReasoningService, RunResult};
use stixweave_extractor::{ExecutionMode, Extractor, ExtractorConfig};
use stixweave_llm::OpenAiProvider;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Execute the convert command.
pub async fn execute_convert(
    args: ConvertArgs,
    config: &Config,
    formatter: &Formatter,
    cancel: CancellationToken,
) -> Result<()> {
    let text = read_input(&args.input)?;
    let extractor_config = apply_overrides(config.extractor.clone(), &args);
    let reasoner = build_provider(config, &args)?;

    let source_name = (args.input != "-").then(|| {
        Path::new(&args.input)
            .file_name()
            .map_or(args.input.clone(), |n| n.to_string_lossy().into_owned())
    });

    let result = convert_text(&text, source_name, reasoner, extractor_config, cancel).await?;

    write_bundle(&result.bundle, args.output.as_deref())?;
    if let Some(path) = &args.output {
        info!("Bundle written to {}", path.display());
    }
    eprintln!("{}", formatter.run_report(&result)?);
    Ok(())
}

/// Run the whole pipeline over `text`.
pub async fn convert_text(
    text: &str,
    source_name: Option<String>,
    reasoner: Arc<dyn ReasoningService>,
    config: ExtractorConfig,
    cancel: CancellationToken,
) -> Result<RunResult> {
    let mut extractor = Extractor::new(reasoner, config)?;
    if let Some(name) = source_name {
        extractor = extractor.with_source_name(name);
    }
    Ok(extractor.run_with_cancel(text, cancel).await?)
}

fn apply_overrides(mut config: ExtractorConfig, args: &ConvertArgs) -> ExtractorConfig {
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(overlap) = args.overlap {
        config.overlap = overlap;
    }
    if args.parallel {
        config.execution = ExecutionMode::Parallel;
    }
    if args.partial {
        config.emit_partial_on_cancel = true;
    }
    config
}

fn build_provider(config: &Config, args: &ConvertArgs) -> Result<Arc<dyn ReasoningService>> {
    let base_url = args
        .base_url
        .clone()
        .unwrap_or_else(|| config.provider.base_url.clone());
    let model = args
        .model
        .clone()
        .unwrap_or_else(|| config.provider.model.clone());
    debug!("Using model {} at {}", model, base_url);

    let mut provider =
        OpenAiProvider::new(base_url, model)?.with_temperature(config.provider.temperature);
    match Config::api_key() {
        Some(key) => provider = provider.with_api_key(key),
        None => warn!("{} is not set; sending requests without credentials", API_KEY_ENV),
    }
    Ok(Arc::new(provider))
}
