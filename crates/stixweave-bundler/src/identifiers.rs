//! Identifier normalization
//!
//! Rewrites every identifier that is not `{type}--{UUIDv4}` with the right
//! prefix, and every duplicate identifier, into a fresh one. The rewrite map
//! is built completely first and then applied in a single traversal over all
//! fields of all objects, so a reference is rewritten exactly when its target
//! is.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use stixweave_domain::id::{is_valid_id, is_valid_id_for_type, sanitize_type};
use stixweave_domain::object::{is_reference_key, visit_strings_mut};
use stixweave_domain::{Bundle, StixId, StrippedReference};
use tracing::{debug, info, warn};

use crate::BundlerError;

const MAX_GENERATION_ATTEMPTS: usize = 8;

/// Injective `old id -> new id` map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierMap {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl IdentifierMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `old -> new` unless `old` is already mapped
    ///
    /// Returns false if an entry for `old` already existed.
    pub fn insert(&mut self, old: impl Into<String>, new: impl Into<String>) -> bool {
        let old = old.into();
        if self.index.contains_key(&old) {
            return false;
        }
        self.index.insert(old.clone(), self.entries.len());
        self.entries.push((old, new.into()));
        true
    }

    /// New id for `old`, if mapped
    pub fn get(&self, old: &str) -> Option<&str> {
        self.index.get(old).map(|&i| self.entries[i].1.as_str())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(o, n)| (o.as_str(), n.as_str()))
    }

    /// Whether no two old ids share a new id
    pub fn is_injective(&self) -> bool {
        let mut seen = HashSet::new();
        self.entries.iter().all(|(_, new)| seen.insert(new.as_str()))
    }
}

/// The later occupant of an id that was already taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionRename {
    /// Position of the renamed object in the bundle
    pub position: usize,
    /// Shared id
    pub old: String,
    /// Fresh id given to the later occupant
    pub new: String,
}

/// Result of normalizing a bundle's identifiers
#[derive(Debug, Clone, Default)]
pub struct NormalizeOutcome {
    /// Rewrites applied to ids and references
    pub map: IdentifierMap,
    /// Later occupants of duplicate ids
    pub collisions: Vec<CollisionRename>,
    /// Reference values removed because they never became valid
    pub stripped: Vec<StrippedReference>,
    /// Whether the bundle's own id was replaced
    pub bundle_id_rewritten: bool,
}

struct IdGenerator {
    used: HashSet<String>,
}

impl IdGenerator {
    fn fresh(&mut self, object_type: &str) -> Result<String, BundlerError> {
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let candidate = StixId::generate(object_type).into_string();
            if self.used.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }
        Err(BundlerError::IdGeneration(format!(
            "no unique id for type '{}' after {} attempts",
            object_type, MAX_GENERATION_ATTEMPTS
        )))
    }
}

/// Normalize every identifier and reference in the bundle
///
/// # Errors
///
/// Returns `BundlerError::IdGeneration` if a fresh id cannot be made unique.
pub fn normalize_ids(bundle: &mut Bundle) -> Result<NormalizeOutcome, BundlerError> {
    let mut outcome = NormalizeOutcome::default();
    let mut generator = IdGenerator {
        used: bundle.objects.iter().map(|o| o.id.clone()).collect(),
    };
    generator.used.insert(bundle.id.clone());

    // Build the map
    let mut seen: HashSet<String> = HashSet::new();
    for (position, object) in bundle.objects.iter_mut().enumerate() {
        let prefix = sanitize_type(&object.object_type);
        if prefix != object.object_type {
            debug!("Type '{}' respelled as '{}' to match its id prefix", object.object_type, prefix);
            object.object_type = prefix;
        }
        if !seen.insert(object.id.clone()) {
            let new = generator.fresh(&object.object_type)?;
            debug!("Id '{}' reused at position {}, renamed to '{}'", object.id, position, new);
            outcome.collisions.push(CollisionRename {
                position,
                old: std::mem::replace(&mut object.id, new.clone()),
                new,
            });
            continue;
        }
        if !is_valid_id_for_type(&object.id, &object.object_type) {
            let new = generator.fresh(&object.object_type)?;
            outcome.map.insert(object.id.clone(), new);
        }
    }

    // Apply it in one traversal
    let map = &outcome.map;
    for (position, object) in bundle.objects.iter_mut().enumerate() {
        let renamed = outcome.collisions.iter().any(|c| c.position == position);
        if !renamed {
            if let Some(new) = map.get(&object.id) {
                object.id = new.to_string();
            }
        }
        for value in object.properties.values_mut() {
            visit_strings_mut(value, &mut |s| {
                if let Some(new) = map.get(s.as_str()) {
                    *s = new.to_string();
                }
            });
        }
    }

    // Strip references that are still not identifiers
    for object in bundle.objects.iter_mut() {
        let mut emptied = Vec::new();
        for (key, value) in object.properties.iter_mut() {
            if !is_reference_key(key) {
                continue;
            }
            match value {
                Value::String(s) if !is_valid_id(s) => {
                    outcome.stripped.push(StrippedReference {
                        object_id: object.id.clone(),
                        field: key.clone(),
                        value: s.clone(),
                    });
                    emptied.push(key.clone());
                }
                Value::Array(items) => items.retain(|item| match item.as_str() {
                    Some(s) if !is_valid_id(s) => {
                        outcome.stripped.push(StrippedReference {
                            object_id: object.id.clone(),
                            field: key.clone(),
                            value: s.to_string(),
                        });
                        false
                    }
                    _ => true,
                }),
                _ => {}
            }
        }
        for key in emptied {
            object.properties.remove(&key);
        }
    }

    if !is_valid_id_for_type(&bundle.id, "bundle") {
        bundle.id = generator.fresh("bundle")?;
        outcome.bundle_id_rewritten = true;
    }

    for stripped in &outcome.stripped {
        warn!(
            "Stripped unresolvable reference {}.{} = '{}'",
            stripped.object_id, stripped.field, stripped.value
        );
    }
    info!(
        "Normalized identifiers: {} rewritten, {} collisions, {} references stripped",
        outcome.map.len(),
        outcome.collisions.len(),
        outcome.stripped.len()
    );

    Ok(outcome)
}
