//! Fix-ids command implementation.

use crate::cli::FixIdsArgs;
use crate::commands::{parse_bundle, read_input, write_bundle};
use crate::error::Result;
use crate::output::Formatter;
use stixweave_bundler::normalize_ids;

/// Execute the fix-ids command.
pub fn execute_fix_ids(args: FixIdsArgs, formatter: &Formatter) -> Result<()> {
    let mut bundle = parse_bundle(&read_input(&args.input)?)?;
    let outcome = normalize_ids(&mut bundle)?;

    for rename in &outcome.collisions {
        eprintln!(
            "{}",
            formatter.warning(&format!(
                "duplicate id '{}' at position {} renamed to {}",
                rename.old, rename.position, rename.new
            ))
        );
    }
    for stripped in &outcome.stripped {
        eprintln!(
            "{}",
            formatter.warning(&format!(
                "dropped unresolvable reference {}.{} = '{}'",
                stripped.object_id, stripped.field, stripped.value
            ))
        );
    }

    write_bundle(&bundle, args.output.as_deref())?;
    eprintln!(
        "{}",
        formatter.success(&format!(
            "Rewrote {} id(s), {} collision(s), {} dropped reference(s)",
            outcome.map.len(),
            outcome.collisions.len(),
            outcome.stripped.len()
        ))
    );
    Ok(())
}
