//! Bundle assembly: merge, complete, normalize, remap, audit

use crate::consistency::{audit_ids, find_missing_candidates};
use crate::identifiers::normalize_ids;
use crate::merger::{ChunkObjects, Merger};
use crate::remapper::RelationshipRemapper;
use crate::{BundlerConfig, BundlerError};
use stixweave_domain::{Bundle, PipelineStats, ValidationReport};
use stixweave_gatekeeper::FieldCompleter;
use tracing::{debug, info, warn};

/// A finished bundle with its advisory report and stage counters
#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    /// The final bundle
    pub bundle: Bundle,
    /// Advisory findings
    pub report: ValidationReport,
    /// Stage counters
    pub stats: PipelineStats,
}

/// Post-processing pipeline for extracted objects
///
/// Runs the stages in a fixed order: merge per-chunk objects, fill missing
/// required fields, normalize identifiers, remap relationships, then audit
/// identifiers and scan the source for unmentioned indicators.
///
/// # Examples
///
/// ```
/// use stixweave_bundler::{Bundler, ChunkObjects};
/// use stixweave_domain::StixObject;
///
/// # fn main() -> Result<(), stixweave_bundler::BundlerError> {
/// let bundler = Bundler::default_config();
/// let chunks = vec![
///     ChunkObjects {
///         index: 0,
///         objects: vec![StixObject::new("malware", "malware--a").with("name", "Emotet")],
///     },
///     ChunkObjects {
///         index: 1,
///         objects: vec![StixObject::new("malware", "malware--b").with("name", "emotet")],
///     },
/// ];
///
/// let assembly = bundler.assemble(chunks, None)?;
/// assert_eq!(assembly.bundle.len(), 1);
/// assert!(assembly.report.id_audit.is_clean());
/// # Ok(())
/// # }
/// ```
pub struct Bundler {
    config: BundlerConfig,
    completer: FieldCompleter,
}

impl Bundler {
    /// Create a new Bundler with the given configuration
    pub fn new(config: BundlerConfig) -> Self {
        Self {
            config,
            completer: FieldCompleter::new(),
        }
    }

    /// Create a Bundler with default configuration
    pub fn default_config() -> Self {
        Self::new(BundlerConfig::default())
    }

    /// Use a specific completer, e.g. one with a fixed timestamp
    pub fn with_completer(mut self, completer: FieldCompleter) -> Self {
        self.completer = completer;
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &BundlerConfig {
        &self.config
    }

    /// Merge per-chunk objects and finalize the result
    pub fn assemble(
        &self,
        chunks: Vec<ChunkObjects>,
        source: Option<&str>,
    ) -> Result<Assembly, BundlerError> {
        let merged = Merger::new(self.config.name_normalization).merge(chunks);

        let mut assembly = self.finalize(merged.bundle, source)?;
        assembly.stats.merged_duplicates = merged.merged_duplicates;
        assembly.stats.merged_relationships = merged.merged_relationships;
        assembly.stats.merge_conflicts = merged.conflicts.len();
        for conflict in &merged.conflicts {
            assembly.report.notes.push(format!(
                "conflicting '{}' on {} from chunk {}: kept {}, discarded {}",
                conflict.field,
                conflict.canonical_id,
                conflict.chunk + 1,
                conflict.kept,
                conflict.discarded
            ));
        }
        Ok(assembly)
    }

    /// Run every stage after merging on an existing bundle
    ///
    /// Used directly when repairing a bundle produced elsewhere. Missing
    /// candidates are only scanned for when `source` is given.
    pub fn finalize(
        &self,
        mut bundle: Bundle,
        source: Option<&str>,
    ) -> Result<Assembly, BundlerError> {
        let mut stats = PipelineStats::default();
        let mut report = ValidationReport::default();

        if self.config.fill_defaults {
            let completion = self.completer.complete_all(&mut bundle.objects);
            stats.fields_filled = completion.fields_filled;
            debug!(
                "Filled {} fields, canonicalized {} types",
                completion.fields_filled, completion.types_canonicalized
            );
        }

        let normalized = normalize_ids(&mut bundle)?;
        stats.ids_rewritten = normalized.map.len();
        stats.collision_renames = normalized.collisions.len();
        for collision in &normalized.collisions {
            report.notes.push(format!(
                "duplicate id '{}' at position {} renamed to '{}'",
                collision.old, collision.position, collision.new
            ));
        }
        if normalized.bundle_id_rewritten {
            report.notes.push("bundle id was invalid and has been regenerated".to_string());
        }
        report.stripped_references = normalized.stripped;

        let remapped = RelationshipRemapper::new(self.config.unknown_source_types).remap(&mut bundle);
        stats.verbs_remapped = remapped.remapped.len();
        stats.edges_removed = remapped.removed.len();
        for source_type in &remapped.unknown_source_types {
            report
                .notes
                .push(format!("no relationship rules for source type '{}'", source_type));
        }
        report.remapped_relationships = remapped.remapped;
        report.removed_relationships = remapped.removed;

        report.id_audit = audit_ids(&bundle);
        if !report.id_audit.is_clean() {
            warn!("{} invalid identifiers remain", report.id_audit.invalid_ids.len());
        }

        if self.config.scan_missing_candidates {
            if let Some(source) = source {
                report.missing_candidates = find_missing_candidates(source, &bundle);
            }
        }

        info!(
            "Assembled bundle with {} objects: {}",
            bundle.len(),
            stats.summary()
        );
        Ok(Assembly {
            bundle,
            report,
            stats,
        })
    }
}

impl Default for Bundler {
    fn default() -> Self {
        Self::default_config()
    }
}
