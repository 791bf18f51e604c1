//! Relationship vocabulary remapping
//!
//! Keeps relationship edges inside the set of `(source type, verb, target type)`
//! combinations OpenCTI accepts. Disallowed edges are remapped to a close verb
//! when one is known and removed otherwise; every change is reported.

use std::collections::{BTreeSet, HashMap};
use stixweave_domain::{Bundle, EdgeSummary, RemappedRelationship, RemovedRelationship, StixObject};
use stixweave_gatekeeper::canonical_verb;
use tracing::{info, warn};

use crate::config::UnknownTypePolicy;

/// Allowed verbs per source type, each with its allowed target types
const ALLOWED_RELATIONSHIPS: &[(&str, &[(&str, &[&str])])] = &[
    (
        "attack-pattern",
        &[
            ("targets", &["identity", "location", "vulnerability"]),
            ("uses", &["malware", "tool"]),
            ("mitigates", &["vulnerability"]),
            ("subtechnique-of", &["attack-pattern"]),
        ],
    ),
    (
        "campaign",
        &[
            ("attributed-to", &["threat-actor", "intrusion-set"]),
            ("compromises", &["infrastructure"]),
            ("originates-from", &["location"]),
            ("targets", &["identity", "location", "vulnerability"]),
            ("uses", &["attack-pattern", "infrastructure", "malware", "tool"]),
        ],
    ),
    (
        "course-of-action",
        &[(
            "mitigates",
            &["attack-pattern", "indicator", "malware", "tool", "vulnerability"],
        )],
    ),
    ("identity", &[("located-at", &["location"])]),
    (
        "indicator",
        &[
            ("based-on", &["observed-data"]),
            (
                "indicates",
                &[
                    "attack-pattern",
                    "campaign",
                    "infrastructure",
                    "intrusion-set",
                    "malware",
                    "threat-actor",
                    "tool",
                ],
            ),
        ],
    ),
    (
        "infrastructure",
        &[
            (
                "communicates-with",
                &["infrastructure", "ipv4-addr", "ipv6-addr", "domain-name", "url"],
            ),
            ("consists-of", &["infrastructure", "observed-data"]),
            ("controls", &["infrastructure", "malware"]),
            ("has", &["vulnerability"]),
            ("hosts", &["malware", "tool"]),
            ("located-at", &["location"]),
            ("uses", &["infrastructure"]),
        ],
    ),
    (
        "intrusion-set",
        &[
            ("attributed-to", &["threat-actor"]),
            ("compromises", &["infrastructure"]),
            ("hosts", &["infrastructure"]),
            ("originates-from", &["location"]),
            ("targets", &["identity", "location", "vulnerability"]),
            ("uses", &["attack-pattern", "infrastructure", "malware", "tool"]),
        ],
    ),
    (
        "malware",
        &[
            ("authored-by", &["threat-actor", "intrusion-set"]),
            ("beacons-to", &["infrastructure"]),
            ("communicates-with", &["ipv4-addr", "ipv6-addr", "domain-name", "url"]),
            ("controls", &["malware"]),
            ("downloads", &["malware", "tool", "file"]),
            ("drops", &["malware", "tool", "file"]),
            ("exploits", &["vulnerability"]),
            ("originates-from", &["location"]),
            ("targets", &["identity", "location", "vulnerability"]),
            ("uses", &["attack-pattern", "infrastructure", "tool"]),
            ("variant-of", &["malware"]),
        ],
    ),
    (
        "threat-actor",
        &[
            ("attributed-to", &["identity"]),
            ("compromises", &["infrastructure"]),
            ("hosts", &["infrastructure"]),
            ("impersonates", &["identity"]),
            ("located-at", &["location"]),
            ("targets", &["identity", "location", "vulnerability"]),
            ("uses", &["attack-pattern", "infrastructure", "malware", "tool"]),
        ],
    ),
    (
        "tool",
        &[
            ("delivers", &["malware"]),
            ("drops", &["malware"]),
            ("has", &["vulnerability"]),
            ("targets", &["identity", "location", "vulnerability"]),
            ("uses", &["infrastructure"]),
        ],
    ),
];

/// Close-verb replacements: `(source, verb, target) -> verb`
const RELATIONSHIP_SUGGESTIONS: &[((&str, &str, &str), &str)] = &[
    (("attack-pattern", "exploits", "vulnerability"), "targets"),
    (("infrastructure", "consists-of", "malware"), "hosts"),
    (("malware", "delivers", "infrastructure"), "uses"),
    (("malware", "delivers", "malware"), "downloads"),
    (("malware", "controls", "infrastructure"), "uses"),
    (("malware", "uses", "malware"), "downloads"),
    (("malware", "based-on", "tool"), "uses"),
    (("malware", "communicates-with", "infrastructure"), "uses"),
    (("malware", "consists-of", "infrastructure"), "uses"),
    (("malware", "attributed-to", "threat-actor"), "authored-by"),
];

/// Whether the table has rules for this source type
pub fn is_known_source(source_type: &str) -> bool {
    ALLOWED_RELATIONSHIPS.iter().any(|(s, _)| *s == source_type)
}

/// Whether `source -[verb]-> target` is allowed
///
/// # Examples
///
/// ```
/// use stixweave_bundler::remapper::is_allowed;
///
/// assert!(is_allowed("indicator", "indicates", "malware"));
/// assert!(!is_allowed("malware", "attributed-to", "threat-actor"));
/// ```
pub fn is_allowed(source_type: &str, verb: &str, target_type: &str) -> bool {
    ALLOWED_RELATIONSHIPS
        .iter()
        .find(|(s, _)| *s == source_type)
        .and_then(|(_, verbs)| verbs.iter().find(|(v, _)| *v == verb))
        .is_some_and(|(_, targets)| targets.contains(&target_type))
}

/// Allowed verbs from `source` to `target`
pub fn allowed_verbs(source_type: &str, target_type: &str) -> Vec<&'static str> {
    ALLOWED_RELATIONSHIPS
        .iter()
        .find(|(s, _)| *s == source_type)
        .map(|(_, verbs)| {
            verbs
                .iter()
                .filter(|(_, targets)| targets.contains(&target_type))
                .map(|(v, _)| *v)
                .collect()
        })
        .unwrap_or_default()
}

/// Close-verb replacement for a disallowed triple
pub fn suggestion(source_type: &str, verb: &str, target_type: &str) -> Option<&'static str> {
    RELATIONSHIP_SUGGESTIONS
        .iter()
        .find(|((s, v, t), _)| *s == source_type && *v == verb && *t == target_type)
        .map(|(_, to)| *to)
}

/// Human-readable rendering of the allowed table, for prompts and reference lookup
pub fn describe_table() -> String {
    let mut lines = Vec::new();
    for (source, verbs) in ALLOWED_RELATIONSHIPS {
        for (verb, targets) in verbs.iter() {
            lines.push(format!("{} -[{}]-> {}", source, verb, targets.join(" | ")));
        }
    }
    lines.join("\n")
}

/// Result of a remapping pass
#[derive(Debug, Clone, Default)]
pub struct RemapOutcome {
    /// Edges whose verb was rewritten
    pub remapped: Vec<RemappedRelationship>,
    /// Edges removed, with reasons
    pub removed: Vec<RemovedRelationship>,
    /// Source types without rules that were encountered
    pub unknown_source_types: BTreeSet<String>,
}

enum Verdict {
    Keep,
    Rewrite(String),
    Remove(String),
}

/// Applies the compatibility table to a bundle's relationships
#[derive(Debug, Clone, Default)]
pub struct RelationshipRemapper {
    unknown_source_types: UnknownTypePolicy,
}

impl RelationshipRemapper {
    /// Create a remapper with the given unknown-source-type policy
    pub fn new(unknown_source_types: UnknownTypePolicy) -> Self {
        Self {
            unknown_source_types,
        }
    }

    /// Remap the bundle's relationships in place
    pub fn remap(&self, bundle: &mut Bundle) -> RemapOutcome {
        let mut outcome = RemapOutcome::default();

        let types: HashMap<String, String> = bundle
            .objects
            .iter()
            .filter(|o| !o.is_relationship())
            .map(|o| (o.id.clone(), o.object_type.clone()))
            .collect();

        let objects = std::mem::take(&mut bundle.objects);
        for mut object in objects {
            if !object.is_relationship() {
                bundle.objects.push(object);
                continue;
            }
            match self.judge(&object, &types, &mut outcome) {
                Verdict::Keep => bundle.objects.push(object),
                Verdict::Rewrite(verb) => {
                    outcome.remapped.push(RemappedRelationship {
                        id: object.id.clone(),
                        from: object.relationship_type().unwrap_or_default().to_string(),
                        to: verb.clone(),
                    });
                    object.set_str("relationship_type", verb);
                    bundle.objects.push(object);
                }
                Verdict::Remove(reason) => {
                    warn!("Removed relationship {}: {}", object.id, reason);
                    outcome.removed.push(RemovedRelationship {
                        edge: summarize(&object),
                        reason,
                    });
                }
            }
        }

        for source in &outcome.unknown_source_types {
            warn!("No relationship rules for source type '{}'", source);
        }
        info!(
            "Remapped {} relationships, removed {}",
            outcome.remapped.len(),
            outcome.removed.len()
        );
        outcome
    }

    fn judge(
        &self,
        edge: &StixObject,
        types: &HashMap<String, String>,
        outcome: &mut RemapOutcome,
    ) -> Verdict {
        let (Some(verb), Some(source), Some(target)) =
            (edge.relationship_type(), edge.source_ref(), edge.target_ref())
        else {
            return Verdict::Remove("missing relationship_type, source_ref or target_ref".into());
        };
        let (Some(source_type), Some(target_type)) = (types.get(source), types.get(target)) else {
            return Verdict::Remove("dangling endpoint".into());
        };

        let canonical = canonical_verb(verb);
        let changed = canonical != verb;

        if !is_known_source(source_type) {
            outcome.unknown_source_types.insert(source_type.clone());
            return match self.unknown_source_types {
                UnknownTypePolicy::Keep if changed => Verdict::Rewrite(canonical),
                UnknownTypePolicy::Keep => Verdict::Keep,
                UnknownTypePolicy::Drop => {
                    Verdict::Remove(format!("unknown source type '{}'", source_type))
                }
            };
        }

        if is_allowed(source_type, &canonical, target_type) {
            return if changed {
                Verdict::Rewrite(canonical)
            } else {
                Verdict::Keep
            };
        }

        match suggestion(source_type, &canonical, target_type) {
            Some(to) => Verdict::Rewrite(to.to_string()),
            None => Verdict::Remove(format!(
                "incompatible: {} -[{}]-> {}",
                source_type, canonical, target_type
            )),
        }
    }
}

fn summarize(edge: &StixObject) -> EdgeSummary {
    EdgeSummary {
        id: edge.id.clone(),
        relationship_type: edge.relationship_type().unwrap_or_default().to_string(),
        source_ref: edge.source_ref().unwrap_or_default().to_string(),
        target_ref: edge.target_ref().unwrap_or_default().to_string(),
    }
}
