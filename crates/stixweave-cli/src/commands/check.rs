//! Check command implementation.

use crate::cli::CheckArgs;
use crate::commands::{parse_bundle, read_input};
use crate::error::Result;
use crate::output::Formatter;
use std::fs;
use stixweave_bundler::{audit_ids, find_missing_candidates};
use stixweave_domain::{Bundle, EdgeSummary, IdAudit, MissingCandidate};

/// What the check command found
#[derive(Debug, Clone, PartialEq)]
pub struct CheckFindings {
    /// Identifier health
    pub audit: IdAudit,
    /// Relationships with an endpoint missing from the bundle
    pub dangling: Vec<EdgeSummary>,
    /// Source spans no object mentions (only when a source was given)
    pub candidates: Vec<MissingCandidate>,
}

impl CheckFindings {
    /// Whether every id is valid and every relationship resolves
    pub fn is_clean(&self) -> bool {
        self.audit.is_clean() && self.dangling.is_empty()
    }
}

/// Audit a bundle, optionally against its source text.
pub fn check_bundle(bundle: &Bundle, source: Option<&str>) -> CheckFindings {
    let dangling = bundle
        .relationships()
        .filter(|edge| {
            let resolves = |r: Option<&str>| r.is_some_and(|id| bundle.contains(id));
            !resolves(edge.source_ref()) || !resolves(edge.target_ref())
        })
        .map(|edge| EdgeSummary {
            id: edge.id.clone(),
            relationship_type: edge.relationship_type().unwrap_or_default().to_string(),
            source_ref: edge.source_ref().unwrap_or_default().to_string(),
            target_ref: edge.target_ref().unwrap_or_default().to_string(),
        })
        .collect();

    CheckFindings {
        audit: audit_ids(bundle),
        dangling,
        candidates: source
            .map(|text| find_missing_candidates(text, bundle))
            .unwrap_or_default(),
    }
}

/// Execute the check command.
///
/// Returns whether the bundle is clean; the caller turns `false` into exit code 2.
pub fn execute_check(args: CheckArgs, formatter: &Formatter) -> Result<bool> {
    let bundle = parse_bundle(&read_input(&args.input)?)?;
    let source = args.source.as_deref().map(fs::read_to_string).transpose()?;

    let findings = check_bundle(&bundle, source.as_deref());
    println!(
        "{}",
        formatter.check_report(&findings.audit, &findings.dangling, &findings.candidates)?
    );
    Ok(findings.is_clean())
}
