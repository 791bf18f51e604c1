//! Output formatting for the CLI.
//!
//! Bundles always go to the output file or stdout as JSON; everything
//! rendered here is a report and goes to stderr.

use crate::config::OutputFormat;
use crate::error::Result;
use colored::*;
use serde_json::json;
use stixweave_bundler::RemapOutcome;
use stixweave_domain::{
    ChunkReport, ChunkStatus, EdgeSummary, IdAudit, MissingCandidate, RemovedRelationship,
    RunResult,
};
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

/// Output formatter.
pub struct Formatter {
    format: OutputFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: OutputFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    /// Format the outcome of a conversion run.
    pub fn run_report(&self, result: &RunResult) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&json!({
                "objects": result.bundle.objects.len(),
                "chunks": result.chunks,
                "stats": result.stats,
                "report": result.report,
            }))?),
            OutputFormat::Quiet => Ok(format!("{}", result.bundle.objects.len())),
            OutputFormat::Table => {
                let mut out = vec![self.chunk_table(&result.chunks)];
                out.push(self.info(&result.stats.summary()));
                for note in &result.report.notes {
                    out.push(self.warning(note));
                }
                out.extend(self.removed_lines(&result.report.removed_relationships));
                out.extend(self.candidate_lines(&result.report.missing_candidates));
                out.push(self.success(&format!(
                    "Bundle {} with {} objects",
                    result.bundle.id,
                    result.bundle.objects.len()
                )));
                Ok(out.join("\n"))
            }
        }
    }

    /// Format the findings of the check command.
    pub fn check_report(
        &self,
        audit: &IdAudit,
        dangling: &[EdgeSummary],
        candidates: &[MissingCandidate],
    ) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&json!({
                "id_audit": audit,
                "dangling_relationships": dangling,
                "missing_candidates": candidates,
            }))?),
            OutputFormat::Quiet => Ok(format!(
                "{} {}",
                audit.invalid_ids.len(),
                dangling.len()
            )),
            OutputFormat::Table => {
                let mut out = Vec::new();
                out.push(self.info(&format!(
                    "{}/{} ids valid",
                    audit.valid_ids, audit.total_objects
                )));
                for id in &audit.invalid_ids {
                    out.push(self.error(&format!("invalid id: {}", id)));
                }
                for edge in dangling {
                    out.push(self.error(&format!("dangling relationship {}: {}", edge.id, edge)));
                }
                out.extend(self.candidate_lines(candidates));
                if audit.is_clean() && dangling.is_empty() {
                    out.push(self.success("Bundle is consistent"));
                }
                Ok(out.join("\n"))
            }
        }
    }

    /// Format the outcome of a remap pass.
    pub fn remap_report(&self, outcome: &RemapOutcome) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&json!({
                "remapped": outcome.remapped,
                "removed": outcome.removed,
                "unknown_source_types": outcome.unknown_source_types,
            }))?),
            OutputFormat::Quiet => Ok(format!(
                "{} {}",
                outcome.remapped.len(),
                outcome.removed.len()
            )),
            OutputFormat::Table => {
                let mut out = Vec::new();
                for remap in &outcome.remapped {
                    out.push(self.info(&format!(
                        "remapped {}: {} -> {}",
                        remap.id, remap.from, remap.to
                    )));
                }
                out.extend(self.removed_lines(&outcome.removed));
                for source_type in &outcome.unknown_source_types {
                    out.push(self.warning(&format!("no rules for source type '{}'", source_type)));
                }
                out.push(self.success(&format!(
                    "Remapped {}, removed {} relationship(s)",
                    outcome.remapped.len(),
                    outcome.removed.len()
                )));
                Ok(out.join("\n"))
            }
        }
    }

    fn chunk_table(&self, chunks: &[ChunkReport]) -> String {
        let mut builder = Builder::default();
        builder.push_record(["Chunk", "Status", "Objects", "Iterations", "Error"]);

        for chunk in chunks {
            let status = match chunk.status {
                ChunkStatus::Done => self.colorize("done", "green"),
                ChunkStatus::Incomplete => self.colorize("incomplete", "yellow"),
                ChunkStatus::Failed => self.colorize("failed", "red"),
            };
            builder.push_record([
                (chunk.index + 1).to_string(),
                status,
                chunk.objects.to_string(),
                chunk.iterations.to_string(),
                chunk.error.clone().unwrap_or_default(),
            ]);
        }

        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));
        table.to_string()
    }

    fn removed_lines(&self, removed: &[RemovedRelationship]) -> Vec<String> {
        removed
            .iter()
            .map(|r| self.warning(&format!("removed {} ({})", r.edge, r.reason)))
            .collect()
    }

    fn candidate_lines(&self, candidates: &[MissingCandidate]) -> Vec<String> {
        candidates
            .iter()
            .map(|c| {
                self.warning(&format!(
                    "not extracted: {} '{}' at {}..{}",
                    c.kind, c.text, c.start, c.end
                ))
            })
            .collect()
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an error message.
    pub fn error(&self, message: &str) -> String {
        self.colorize(&format!("✗ {}", message), "red")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "red" => text.red().to_string(),
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            _ => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stixweave_domain::{Bundle, CandidateKind, PipelineStats, ValidationReport};

    fn run_result() -> RunResult {
        RunResult {
            bundle: Bundle::new(vec![]),
            report: ValidationReport {
                notes: vec!["chunk 2 failed: permanent failure: 401".to_string()],
                missing_candidates: vec![MissingCandidate {
                    text: "203.0.113.9".to_string(),
                    kind: CandidateKind::Ipv4,
                    start: 10,
                    end: 21,
                }],
                ..Default::default()
            },
            chunks: vec![
                ChunkReport {
                    index: 0,
                    status: ChunkStatus::Done,
                    objects: 3,
                    iterations: 2,
                    error: None,
                },
                ChunkReport {
                    index: 1,
                    status: ChunkStatus::Failed,
                    objects: 0,
                    iterations: 1,
                    error: Some("permanent failure: 401".to_string()),
                },
            ],
            stats: PipelineStats::default(),
        }
    }

    #[test]
    fn test_table_run_report() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        let output = formatter.run_report(&run_result()).unwrap();
        assert!(output.contains("Iterations"));
        assert!(output.contains("failed"));
        assert!(output.contains("not extracted: ipv4 '203.0.113.9'"));
        assert!(output.contains("chunk 2 failed"));
    }

    #[test]
    fn test_json_run_report() {
        let formatter = Formatter::new(OutputFormat::Json, false);
        let output = formatter.run_report(&run_result()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["chunks"][1]["status"], "failed");
        assert_eq!(value["objects"], 0);
    }

    #[test]
    fn test_quiet_check_report() {
        let formatter = Formatter::new(OutputFormat::Quiet, false);
        let audit = IdAudit {
            total_objects: 2,
            valid_ids: 1,
            invalid_ids: vec!["bad".to_string()],
        };
        assert_eq!(formatter.check_report(&audit, &[], &[]).unwrap(), "1 0");
    }

    #[test]
    fn test_clean_check_report() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        let audit = IdAudit {
            total_objects: 1,
            valid_ids: 1,
            invalid_ids: vec![],
        };
        let output = formatter.check_report(&audit, &[], &[]).unwrap();
        assert!(output.contains("1/1 ids valid"));
        assert!(output.contains("Bundle is consistent"));
    }

    #[test]
    fn test_colorize_disabled() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        let msg = formatter.success("test");
        assert_eq!(msg, "✓ test");
    }
}
