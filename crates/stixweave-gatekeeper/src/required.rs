//! STIX 2.1 required-field table

use chrono::{DateTime, Utc};
use stixweave_domain::id::sanitize_type;

/// Required properties per object type (excluding `type` and `id`)
const REQUIRED_FIELDS: &[(&str, &[&str])] = &[
    // SDOs
    ("attack-pattern", &["spec_version", "created", "modified", "name"]),
    ("campaign", &["spec_version", "created", "modified", "name"]),
    ("course-of-action", &["spec_version", "created", "modified", "name"]),
    ("identity", &["spec_version", "created", "modified", "name", "identity_class"]),
    (
        "indicator",
        &["spec_version", "created", "modified", "pattern", "pattern_type", "valid_from"],
    ),
    (
        "infrastructure",
        &["spec_version", "created", "modified", "name", "infrastructure_types"],
    ),
    ("intrusion-set", &["spec_version", "created", "modified", "name"]),
    ("location", &["spec_version", "created", "modified"]),
    ("malware", &["spec_version", "created", "modified", "name", "is_family"]),
    ("malware-analysis", &["spec_version", "created", "modified", "product"]),
    ("note", &["spec_version", "created", "modified", "content"]),
    (
        "observed-data",
        &[
            "spec_version",
            "created",
            "modified",
            "first_observed",
            "last_observed",
            "number_observed",
        ],
    ),
    ("opinion", &["spec_version", "created", "modified", "opinion"]),
    (
        "report",
        &["spec_version", "created", "modified", "name", "published", "object_refs"],
    ),
    (
        "threat-actor",
        &["spec_version", "created", "modified", "name", "threat_actor_types"],
    ),
    ("tool", &["spec_version", "created", "modified", "name", "tool_types"]),
    ("vulnerability", &["spec_version", "created", "modified", "name"]),
    // SROs
    (
        "relationship",
        &[
            "spec_version",
            "created",
            "modified",
            "relationship_type",
            "source_ref",
            "target_ref",
        ],
    ),
    ("sighting", &["spec_version", "created", "modified", "sighting_of_ref"]),
];

/// Fields the completer can always supply on its own
const DEFAULTABLE_FIELDS: &[&str] = &[
    "spec_version",
    "created",
    "modified",
    "is_family",
    "malware_types",
    "threat_actor_types",
    "tool_types",
    "infrastructure_types",
    "identity_class",
    "pattern_type",
    "valid_from",
    "first_observed",
    "last_observed",
    "number_observed",
    "published",
];

/// Required fields for a type, `None` for types outside the table
pub fn required_fields(object_type: &str) -> Option<&'static [&'static str]> {
    REQUIRED_FIELDS
        .iter()
        .find(|(t, _)| *t == object_type)
        .map(|(_, fields)| *fields)
}

/// Whether the type is in the required-field table
pub fn is_known_type(object_type: &str) -> bool {
    required_fields(object_type).is_some()
}

/// Whether the completer fills this field when it is missing
pub fn is_defaultable(field: &str) -> bool {
    DEFAULTABLE_FIELDS.contains(&field)
}

/// Canonical spelling of a type name, identical to the prefix its identifiers get
///
/// # Examples
///
/// ```
/// use stixweave_gatekeeper::canonical_type;
///
/// assert_eq!(canonical_type("Attack_Pattern"), "attack-pattern");
/// assert_eq!(canonical_type(" threat actor "), "threat-actor");
/// assert_eq!(canonical_type("x_acme.widget"), "x-acme-widget");
/// ```
pub fn canonical_type(object_type: &str) -> String {
    sanitize_type(object_type)
}

/// Canonical spelling of a relationship verb
///
/// Lowercases and maps `_` and whitespace to `-`. An empty verb stays empty.
pub fn canonical_verb(verb: &str) -> String {
    verb.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '_' || c.is_whitespace() { '-' } else { c })
        .collect()
}

/// STIX timestamp: RFC 3339, millisecond precision, `Z` suffix
pub fn stix_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_required_fields_lookup() {
        let fields = required_fields("indicator").unwrap();
        assert!(fields.contains(&"pattern"));
        assert!(fields.contains(&"valid_from"));
        assert!(required_fields("x-custom").is_none());
        assert!(is_known_type("relationship"));
    }

    #[test]
    fn test_defaultable() {
        assert!(is_defaultable("created"));
        assert!(is_defaultable("is_family"));
        assert!(!is_defaultable("name"));
        assert!(!is_defaultable("pattern"));
    }

    #[test]
    fn test_canonical_type_is_a_valid_prefix() {
        for raw in ["x_acme.widget", "Threat Actor", "0day", "malware"] {
            let canonical = canonical_type(raw);
            assert_eq!(canonical, sanitize_type(raw));
            assert_eq!(canonical_type(&canonical), canonical);
        }
        assert_eq!(canonical_type("x_acme.widget"), "x-acme-widget");
    }

    #[test]
    fn test_canonical_verb() {
        assert_eq!(canonical_verb("Attributed_To"), "attributed-to");
        assert_eq!(canonical_verb(""), "");
    }

    #[test]
    fn test_stix_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(stix_timestamp(at), "2024-03-05T07:08:09.000Z");
    }
}
