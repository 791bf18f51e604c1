//! Stixweave CLI - Convert threat-intelligence text into STIX 2.1 bundles.

use clap::Parser;
use stixweave_cli::commands;
use stixweave_cli::config::OutputFormat;
use stixweave_cli::{Cli, Command, Config, Formatter};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Exit code for a bundle that failed `check`.
const EXIT_INCONSISTENT: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(EXIT_INCONSISTENT),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Log to stderr so bundles written to stdout stay clean.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> stixweave_cli::Result<bool> {
    let config_path = Config::resolve_path(cli.config.as_deref())?;

    // init-config must work even when the existing file is broken
    if let Command::InitConfig(args) = &cli.command {
        let formatter = Formatter::new(OutputFormat::Table, !cli.no_color);
        commands::execute_init_config(args, &config_path, &formatter)?;
        return Ok(true);
    }

    let config = Config::load(Some(&config_path))?;
    let format = cli
        .format
        .map(Into::into)
        .unwrap_or(config.settings.format);
    let color_enabled = !cli.no_color && config.settings.color;
    let formatter = Formatter::new(format, color_enabled);

    match cli.command {
        Command::Convert(args) => {
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling run");
                    trigger.cancel();
                }
            });
            commands::execute_convert(args, &config, &formatter, cancel).await?;
            Ok(true)
        }
        Command::FixIds(args) => {
            commands::execute_fix_ids(args, &formatter)?;
            Ok(true)
        }
        Command::Remap(args) => {
            commands::execute_remap(args, &formatter)?;
            Ok(true)
        }
        Command::Check(args) => commands::execute_check(args, &formatter),
        Command::InitConfig(_) => Ok(true),
    }
}
