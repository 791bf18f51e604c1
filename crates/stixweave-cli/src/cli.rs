//! CLI command definitions and argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stixweave - Convert threat-intelligence text into STIX 2.1 bundles.
#[derive(Debug, Parser)]
#[command(name = "stixweave")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Report format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file path (default: ~/.stixweave/config.toml)
    #[arg(short, long, global = true, env = "STIXWEAVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Report format options.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliFormat {
    /// Table format (default)
    Table,
    /// JSON format
    Json,
    /// Quiet format (counts only)
    Quiet,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert a text document into a STIX bundle
    Convert(ConvertArgs),

    /// Rewrite invalid or duplicate identifiers in a bundle
    FixIds(FixIdsArgs),

    /// Remap relationships onto the OpenCTI-compatible vocabulary
    Remap(RemapArgs),

    /// Audit identifiers and reference closure of a bundle
    Check(CheckArgs),

    /// Write a default configuration file
    InitConfig(InitConfigArgs),
}

/// Arguments for the convert command.
#[derive(Debug, Parser)]
pub struct ConvertArgs {
    /// Input text file, or '-' for stdin
    pub input: String,

    /// Output file for the bundle (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Override the model from the configuration
    #[arg(short, long)]
    pub model: Option<String>,

    /// Override the provider base URL from the configuration
    #[arg(long)]
    pub base_url: Option<String>,

    /// Characters per chunk
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Characters shared by consecutive chunks
    #[arg(long)]
    pub overlap: Option<usize>,

    /// Run chunks in parallel
    #[arg(long)]
    pub parallel: bool,

    /// On Ctrl-C, still write the bundle built from finished chunks
    #[arg(long)]
    pub partial: bool,
}

/// Arguments for the fix-ids command.
#[derive(Debug, Parser)]
pub struct FixIdsArgs {
    /// Bundle JSON file, or '-' for stdin
    pub input: String,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the remap command.
#[derive(Debug, Parser)]
pub struct RemapArgs {
    /// Bundle JSON file, or '-' for stdin
    pub input: Option<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Remove edges whose source type is not in the table
    #[arg(long)]
    pub drop_unknown: bool,

    /// Print the allowed relationship table and exit
    #[arg(long)]
    pub show_table: bool,
}

/// Arguments for the check command.
#[derive(Debug, Parser)]
pub struct CheckArgs {
    /// Bundle JSON file, or '-' for stdin
    pub input: String,

    /// Source text to scan for indicators the bundle does not mention
    #[arg(short, long)]
    pub source: Option<PathBuf>,
}

/// Arguments for the init-config command.
#[derive(Debug, Parser)]
pub struct InitConfigArgs {
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

impl From<CliFormat> for crate::config::OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Table => crate::config::OutputFormat::Table,
            CliFormat::Json => crate::config::OutputFormat::Json,
            CliFormat::Quiet => crate::config::OutputFormat::Quiet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_command() {
        let cli = Cli::parse_from([
            "stixweave",
            "convert",
            "report.txt",
            "-o",
            "bundle.json",
            "--chunk-size",
            "3000",
            "--parallel",
        ]);
        match cli.command {
            Command::Convert(args) => {
                assert_eq!(args.input, "report.txt");
                assert_eq!(args.output, Some(PathBuf::from("bundle.json")));
                assert_eq!(args.chunk_size, Some(3000));
                assert!(args.parallel);
                assert!(!args.partial);
            }
            _ => panic!("Expected Convert command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["stixweave", "check", "bundle.json", "--format", "json", "-v"]);
        assert!(cli.verbose);
        assert!(matches!(cli.format, Some(CliFormat::Json)));
        assert!(matches!(cli.command, Command::Check(_)));
    }

    #[test]
    fn test_remap_table_without_input() {
        let cli = Cli::parse_from(["stixweave", "remap", "--show-table"]);
        match cli.command {
            Command::Remap(args) => {
                assert!(args.show_table);
                assert!(args.input.is_none());
            }
            _ => panic!("Expected Remap command"),
        }
    }

    #[test]
    fn test_missing_subcommand_is_an_error() {
        assert!(Cli::try_parse_from(["stixweave"]).is_err());
    }
}
