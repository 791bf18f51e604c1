//! Run results and the advisory validation report

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bundle::Bundle;

/// Kind of indicator-like span found in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    /// IPv4 address
    Ipv4,
    /// Domain name
    Domain,
    /// URL
    Url,
    /// E-mail address
    Email,
    /// MD5 hash
    Md5,
    /// SHA-1 hash
    Sha1,
    /// SHA-256 hash
    Sha256,
    /// CVE identifier
    Cve,
    /// ATT&CK technique identifier
    AttackTechnique,
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CandidateKind::Ipv4 => "ipv4",
            CandidateKind::Domain => "domain",
            CandidateKind::Url => "url",
            CandidateKind::Email => "email",
            CandidateKind::Md5 => "md5",
            CandidateKind::Sha1 => "sha1",
            CandidateKind::Sha256 => "sha256",
            CandidateKind::Cve => "cve",
            CandidateKind::AttackTechnique => "attack_technique",
        };
        f.write_str(s)
    }
}

/// A span of source text that looks like it should have produced an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingCandidate {
    /// The matched text
    pub text: String,
    /// What it looks like
    pub kind: CandidateKind,
    /// Character offset of the first character
    pub start: usize,
    /// Character offset one past the last character
    pub end: usize,
}

/// Compact description of a relationship edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSummary {
    /// Edge id
    pub id: String,
    /// Verb
    pub relationship_type: String,
    /// Source id
    pub source_ref: String,
    /// Target id
    pub target_ref: String,
}

impl fmt::Display for EdgeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -[{}]-> {}",
            self.source_ref, self.relationship_type, self.target_ref
        )
    }
}

/// An edge removed by the remapper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedRelationship {
    /// The edge as it was
    pub edge: EdgeSummary,
    /// Why it was removed
    pub reason: String,
}

/// An edge whose verb was rewritten
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemappedRelationship {
    /// Edge id
    pub id: String,
    /// Verb before
    pub from: String,
    /// Verb after
    pub to: String,
}

/// A reference value stripped because it never became a valid identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrippedReference {
    /// Owning object
    pub object_id: String,
    /// Property key
    pub field: String,
    /// The dropped value
    pub value: String,
}

/// Identifier health of a bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAudit {
    /// Objects inspected
    pub total_objects: usize,
    /// Ids matching the grammar and their type
    pub valid_ids: usize,
    /// Offending ids
    pub invalid_ids: Vec<String>,
}

impl IdAudit {
    /// Whether every id is valid
    pub fn is_clean(&self) -> bool {
        self.invalid_ids.is_empty()
    }
}

/// Advisory findings of a run; never affects the bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Source spans no object mentions
    pub missing_candidates: Vec<MissingCandidate>,
    /// Edges the remapper removed
    pub removed_relationships: Vec<RemovedRelationship>,
    /// Edges the remapper rewrote
    pub remapped_relationships: Vec<RemappedRelationship>,
    /// Reference values dropped by the identifier normalizer
    pub stripped_references: Vec<StrippedReference>,
    /// Identifier health
    pub id_audit: IdAudit,
    /// Free-form notes (incomplete chunks, failed chunks)
    pub notes: Vec<String>,
}

/// Terminal status of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    /// The loop reached a final answer
    Done,
    /// The iteration cap was hit; the latest draft was used
    Incomplete,
    /// An unrecoverable failure; the chunk contributed nothing
    Failed,
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkStatus::Done => f.write_str("done"),
            ChunkStatus::Incomplete => f.write_str("incomplete"),
            ChunkStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Per-chunk outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReport {
    /// Chunk index
    pub index: usize,
    /// Outcome
    pub status: ChunkStatus,
    /// Objects the chunk contributed
    pub objects: usize,
    /// THINK cycles used
    pub iterations: usize,
    /// Failure message, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Counters gathered across the post-processing stages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Nodes folded into an earlier canonical node
    pub merged_duplicates: usize,
    /// Edges folded into an identical earlier edge
    pub merged_relationships: usize,
    /// Scalar attribute conflicts during merge
    pub merge_conflicts: usize,
    /// Identifiers rewritten by the normalizer
    pub ids_rewritten: usize,
    /// Duplicate-occupant renames
    pub collision_renames: usize,
    /// Edges whose verb was rewritten
    pub verbs_remapped: usize,
    /// Edges removed
    pub edges_removed: usize,
    /// Missing fields filled with defaults
    pub fields_filled: usize,
}

impl PipelineStats {
    /// One-line summary for logs and CLI output
    pub fn summary(&self) -> String {
        format!(
            "merged {} nodes / {} edges ({} conflicts), rewrote {} ids ({} collisions), \
             remapped {} verbs, removed {} edges, filled {} fields",
            self.merged_duplicates,
            self.merged_relationships,
            self.merge_conflicts,
            self.ids_rewritten,
            self.collision_renames,
            self.verbs_remapped,
            self.edges_removed,
            self.fields_filled
        )
    }
}

/// Everything a run produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// The final bundle
    pub bundle: Bundle,
    /// Advisory report
    pub report: ValidationReport,
    /// Per-chunk outcomes in chunk order
    pub chunks: Vec<ChunkReport>,
    /// Stage counters
    pub stats: PipelineStats,
}

impl RunResult {
    /// Chunks with the given status
    pub fn chunks_with(&self, status: ChunkStatus) -> impl Iterator<Item = &ChunkReport> {
        self.chunks.iter().filter(move |c| c.status == status)
    }
}
