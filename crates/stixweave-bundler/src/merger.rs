//! Merging per-chunk partial graphs into one bundle
//!
//! Each chunk is processed in three passes:
//!
//! 1. decide, for every object, whether it is a duplicate of an earlier node
//!    (same canonicalization key) or a new object, and which id it ends up
//!    with; this yields the chunk's alias table `local id -> final id`
//! 2. rewrite every `*_ref` / `*_refs` value of the chunk through the alias table
//! 3. integrate: new objects are appended, duplicates are absorbed into their
//!    canonical node
//!
//! References are therefore always resolved inside their own chunk first, so a
//! local id reused by two chunks never crosses over.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use stixweave_domain::object::is_reference_key;
use stixweave_domain::{Bundle, StixObject};
use stixweave_gatekeeper::{canonical_type, canonical_verb};
use tracing::{debug, info, warn};

use crate::config::{collapse_whitespace, NameNormalization};

/// Objects extracted from one chunk, in chunk order
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkObjects {
    /// Chunk index
    pub index: usize,
    /// Extracted objects
    pub objects: Vec<StixObject>,
}

/// A scalar attribute that disagreed between duplicates; the first-seen value wins
#[derive(Debug, Clone, PartialEq)]
pub struct MergeConflict {
    /// Id of the canonical node
    pub canonical_id: String,
    /// Property name
    pub field: String,
    /// Value kept
    pub kept: Value,
    /// Value discarded
    pub discarded: Value,
    /// Chunk the discarded value came from
    pub chunk: usize,
}

/// Result of a merge
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Merged bundle; identifiers may still be invalid
    pub bundle: Bundle,
    /// Nodes folded into a canonical node
    pub merged_duplicates: usize,
    /// Edges folded into an identical edge
    pub merged_relationships: usize,
    /// Scalar conflicts
    pub conflicts: Vec<MergeConflict>,
}

type NodeKey = (String, String);
type EdgeKey = (String, String, String);

enum Plan {
    /// Absorb into the merged object with this id
    Absorb(String),
    /// Append with this id
    New(String),
}

/// Combines chunk results, deduplicating nodes by `(type, normalized name-or-pattern)`
#[derive(Debug, Clone, Default)]
pub struct Merger {
    normalization: NameNormalization,
}

impl Merger {
    /// Create a merger with the given name normalization
    pub fn new(normalization: NameNormalization) -> Self {
        Self { normalization }
    }

    /// Canonicalization key of a node; `None` for edges and for nodes with neither name nor pattern
    pub fn canonical_key(&self, object: &StixObject) -> Option<NodeKey> {
        if object.is_relationship() {
            return None;
        }
        let object_type = canonical_type(&object.object_type);
        if let Some(pattern) = object.pattern().filter(|p| !p.trim().is_empty()) {
            return Some((object_type, collapse_whitespace(pattern)));
        }
        object
            .name()
            .map(|n| self.normalization.normalize(n))
            .filter(|n| !n.is_empty())
            .map(|n| (object_type, n))
    }

    /// Merge ordered chunk results into one bundle
    pub fn merge(&self, chunks: Vec<ChunkObjects>) -> MergeOutcome {
        let mut merged: Vec<StixObject> = Vec::new();
        let mut position: HashMap<String, usize> = HashMap::new();
        let mut node_keys: HashMap<NodeKey, String> = HashMap::new();
        let mut edge_keys: HashMap<EdgeKey, String> = HashMap::new();
        let mut merged_duplicates = 0;
        let mut merged_relationships = 0;
        let mut conflicts = Vec::new();

        for chunk in chunks {
            let chunk_index = chunk.index;
            let mut alias: HashMap<String, String> = HashMap::new();
            let mut chunk_ids: HashSet<String> = HashSet::new();
            let mut chunk_keys: HashMap<NodeKey, String> = HashMap::new();
            let mut plans: Vec<Option<Plan>> = Vec::with_capacity(chunk.objects.len());

            // Pass 1a: nodes
            for object in &chunk.objects {
                if object.is_relationship() {
                    plans.push(None);
                    continue;
                }
                let key = self.canonical_key(object);
                let existing = key
                    .as_ref()
                    .and_then(|k| node_keys.get(k).or_else(|| chunk_keys.get(k)))
                    .cloned();
                let plan = match existing {
                    Some(canonical) => Plan::Absorb(canonical),
                    None => {
                        let final_id =
                            claim_id(&object.id, chunk_index, &position, &mut chunk_ids);
                        if let Some(k) = key {
                            chunk_keys.insert(k, final_id.clone());
                        }
                        Plan::New(final_id)
                    }
                };
                let target = match &plan {
                    Plan::Absorb(id) | Plan::New(id) => id.clone(),
                };
                alias.entry(object.id.clone()).or_insert(target);
                plans.push(Some(plan));
            }

            // Pass 1b: edges, keyed by their rewritten endpoints
            let mut planned_edges: HashMap<EdgeKey, String> = HashMap::new();
            for (i, object) in chunk.objects.iter().enumerate() {
                if !object.is_relationship() {
                    continue;
                }
                let resolve = |r: Option<&str>| {
                    let r = r.unwrap_or_default();
                    alias.get(r).cloned().unwrap_or_else(|| r.to_string())
                };
                let key = (
                    canonical_verb(object.relationship_type().unwrap_or_default()),
                    resolve(object.source_ref()),
                    resolve(object.target_ref()),
                );
                let existing = edge_keys
                    .get(&key)
                    .or_else(|| planned_edges.get(&key))
                    .cloned();
                let plan = match existing {
                    Some(canonical) => Plan::Absorb(canonical),
                    None => {
                        let final_id =
                            claim_id(&object.id, chunk_index, &position, &mut chunk_ids);
                        planned_edges.insert(key, final_id.clone());
                        Plan::New(final_id)
                    }
                };
                let target = match &plan {
                    Plan::Absorb(id) | Plan::New(id) => id.clone(),
                };
                alias.entry(object.id.clone()).or_insert(target);
                plans[i] = Some(plan);
            }

            // Pass 2 + 3: rewrite references, then integrate
            for (mut object, plan) in chunk.objects.into_iter().zip(plans) {
                rewrite_references(&mut object, &alias);
                match plan {
                    Some(Plan::New(final_id)) => {
                        if final_id != object.id {
                            debug!(
                                "Chunk {} id '{}' already taken, scoped as '{}'",
                                chunk_index, object.id, final_id
                            );
                        }
                        object.id = final_id.clone();
                        if object.is_relationship() {
                            edge_keys.insert(edge_key(&object), final_id.clone());
                        } else if let Some(key) = self.canonical_key(&object) {
                            node_keys.entry(key).or_insert_with(|| final_id.clone());
                        }
                        position.insert(final_id, merged.len());
                        merged.push(object);
                    }
                    Some(Plan::Absorb(canonical_id)) => {
                        if object.is_relationship() {
                            merged_relationships += 1;
                        } else {
                            merged_duplicates += 1;
                        }
                        if let Some(&pos) = position.get(&canonical_id) {
                            absorb(&mut merged[pos], object, chunk_index, &mut conflicts);
                        }
                    }
                    None => {}
                }
            }
        }

        for conflict in &conflicts {
            warn!(
                "Merge conflict on {}.{}: kept {}, discarded {} (chunk {})",
                conflict.canonical_id, conflict.field, conflict.kept, conflict.discarded, conflict.chunk
            );
        }
        info!(
            "Merged {} objects ({} duplicate nodes, {} duplicate edges, {} conflicts)",
            merged.len(),
            merged_duplicates,
            merged_relationships,
            conflicts.len()
        );

        MergeOutcome {
            bundle: Bundle::new(merged),
            merged_duplicates,
            merged_relationships,
            conflicts,
        }
    }
}

fn edge_key(object: &StixObject) -> EdgeKey {
    (
        canonical_verb(object.relationship_type().unwrap_or_default()),
        object.source_ref().unwrap_or_default().to_string(),
        object.target_ref().unwrap_or_default().to_string(),
    )
}

/// Pick the final id for a new object: its local id if free, otherwise a chunk-scoped one
fn claim_id(
    local_id: &str,
    chunk_index: usize,
    merged: &HashMap<String, usize>,
    chunk_ids: &mut HashSet<String>,
) -> String {
    let taken = |id: &str, chunk_ids: &HashSet<String>| {
        id.is_empty() || merged.contains_key(id) || chunk_ids.contains(id)
    };
    let mut candidate = local_id.to_string();
    if taken(&candidate, chunk_ids) {
        candidate = format!("{}@chunk-{}", local_id, chunk_index);
        let mut n = 1;
        while taken(&candidate, chunk_ids) {
            n += 1;
            candidate = format!("{}@chunk-{}.{}", local_id, chunk_index, n);
        }
    }
    chunk_ids.insert(candidate.clone());
    candidate
}

fn rewrite_references(object: &mut StixObject, alias: &HashMap<String, String>) {
    for (key, value) in object.properties.iter_mut() {
        if !is_reference_key(key) {
            continue;
        }
        match value {
            Value::String(s) => {
                if let Some(target) = alias.get(s.as_str()) {
                    *s = target.clone();
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    if let Value::String(s) = item {
                        if let Some(target) = alias.get(s.as_str()) {
                            *s = target.clone();
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

fn absorb(
    canonical: &mut StixObject,
    incoming: StixObject,
    chunk: usize,
    conflicts: &mut Vec<MergeConflict>,
) {
    for (field, value) in incoming.properties {
        match canonical.properties.get_mut(&field) {
            None => {
                canonical.properties.insert(field, value);
            }
            Some(existing) if *existing == value => {}
            Some(Value::Array(items)) => {
                let additions = match value {
                    Value::Array(more) => more,
                    other => vec![other],
                };
                for item in additions {
                    if !items.contains(&item) {
                        items.push(item);
                    }
                }
            }
            // The key fields only differ in normalization
            Some(_) if field == "name" || field == "pattern" => {}
            Some(existing) => conflicts.push(MergeConflict {
                canonical_id: canonical.id.clone(),
                field,
                kept: existing.clone(),
                discarded: value,
                chunk,
            }),
        }
    }
}
