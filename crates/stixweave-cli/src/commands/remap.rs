//! Remap command implementation.

use crate::cli::RemapArgs;
use crate::commands::{parse_bundle, read_input, write_bundle};
use crate::error::{CliError, Result};
use crate::output::Formatter;
use stixweave_bundler::remapper::describe_table;
use stixweave_bundler::{RelationshipRemapper, UnknownTypePolicy};

/// Execute the remap command.
pub fn execute_remap(args: RemapArgs, formatter: &Formatter) -> Result<()> {
    if args.show_table {
        println!("{}", describe_table());
        return Ok(());
    }
    let input = args
        .input
        .as_deref()
        .ok_or_else(|| CliError::InvalidInput("an input bundle is required".to_string()))?;

    let mut bundle = parse_bundle(&read_input(input)?)?;
    let policy = if args.drop_unknown {
        UnknownTypePolicy::Drop
    } else {
        UnknownTypePolicy::Keep
    };
    let outcome = RelationshipRemapper::new(policy).remap(&mut bundle);

    write_bundle(&bundle, args.output.as_deref())?;
    eprintln!("{}", formatter.remap_report(&outcome)?);
    Ok(())
}
