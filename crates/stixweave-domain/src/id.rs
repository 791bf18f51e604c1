//! STIX identifiers - `{type}--{UUIDv4}`

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// The bit-exact identifier grammar every object id in a final bundle must match
pub const ID_GRAMMAR: &str =
    r"^[a-z][a-z0-9-]*--[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$";

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ID_GRAMMAR).expect("identifier grammar is a valid regex"));

/// Separator between the type prefix and the UUID
pub const ID_SEPARATOR: &str = "--";

/// Errors raised when parsing an identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The value does not match the identifier grammar
    #[error("identifier does not match the STIX grammar: {0}")]
    Grammar(String),
}

/// Check a value against the identifier grammar
///
/// # Examples
///
/// ```
/// use stixweave_domain::id::is_valid_id;
///
/// assert!(is_valid_id("malware--2f1a6c3e-9b7d-4c1e-8a2b-3d4e5f607182"));
/// assert!(!is_valid_id("malware--1"));
/// assert!(!is_valid_id("Malware--2f1a6c3e-9b7d-4c1e-8a2b-3d4e5f607182"));
/// ```
pub fn is_valid_id(value: &str) -> bool {
    ID_PATTERN.is_match(value)
}

/// Check that `value` is grammar-valid and carries `object_type` as its prefix
pub fn is_valid_id_for_type(value: &str, object_type: &str) -> bool {
    is_valid_id(value) && id_prefix(value) == Some(object_type)
}

/// The type prefix of an identifier (the text before the first `--`)
pub fn id_prefix(value: &str) -> Option<&str> {
    value
        .split_once(ID_SEPARATOR)
        .map(|(prefix, _)| prefix)
        .filter(|prefix| !prefix.is_empty())
}

/// Turn an arbitrary type name into something the grammar accepts as a prefix
///
/// Lowercases, maps anything outside `[a-z0-9-]` to `-`, collapses repeated
/// dashes and makes sure the result starts with a letter.
pub fn sanitize_type(object_type: &str) -> String {
    let mut out = String::with_capacity(object_type.len());
    for c in object_type.trim().chars().flat_map(char::to_lowercase) {
        let mapped = if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' };
        if mapped == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(mapped);
    }
    while out.ends_with('-') {
        out.pop();
    }
    match out.chars().next() {
        Some(first) if first.is_ascii_lowercase() => out,
        Some(_) => format!("x-{}", out),
        None => "x-unknown".to_string(),
    }
}

/// A grammar-valid STIX identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StixId(String);

impl StixId {
    /// Generate a fresh identifier for an object of the given type
    ///
    /// # Examples
    ///
    /// ```
    /// use stixweave_domain::StixId;
    ///
    /// let id = StixId::generate("attack-pattern");
    /// assert_eq!(id.object_type(), "attack-pattern");
    /// assert!(stixweave_domain::id::is_valid_id(id.as_str()));
    /// ```
    pub fn generate(object_type: &str) -> Self {
        Self(format!(
            "{}{}{}",
            sanitize_type(object_type),
            ID_SEPARATOR,
            uuid::Uuid::new_v4()
        ))
    }

    /// Parse an existing identifier, rejecting anything outside the grammar
    pub fn parse(value: &str) -> Result<Self, IdError> {
        if is_valid_id(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(IdError::Grammar(value.to_string()))
        }
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The type prefix
    pub fn object_type(&self) -> &str {
        id_prefix(&self.0).unwrap_or_default()
    }

    /// Consume into the inner string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StixId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StixId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generated_ids_match_grammar() {
        for t in ["malware", "indicator", "attack-pattern", "relationship", "bundle"] {
            let id = StixId::generate(t);
            assert!(is_valid_id(id.as_str()), "{} should be valid", id);
            assert!(is_valid_id_for_type(id.as_str(), t));
        }
    }

    #[test]
    fn test_rejects_non_v4_uuid() {
        // version nibble 1, not 4
        assert!(!is_valid_id("malware--2f1a6c3e-9b7d-1c1e-8a2b-3d4e5f607182"));
        // variant nibble c is outside [89ab]
        assert!(!is_valid_id("malware--2f1a6c3e-9b7d-4c1e-ca2b-3d4e5f607182"));
        // uppercase hex
        assert!(!is_valid_id("malware--2F1A6C3E-9B7D-4C1E-8A2B-3D4E5F607182"));
    }

    #[test]
    fn test_rejects_bad_prefix() {
        assert!(!is_valid_id("--2f1a6c3e-9b7d-4c1e-8a2b-3d4e5f607182"));
        assert!(!is_valid_id("1malware--2f1a6c3e-9b7d-4c1e-8a2b-3d4e5f607182"));
        assert!(!is_valid_id("attack_pattern--2f1a6c3e-9b7d-4c1e-8a2b-3d4e5f607182"));
    }

    #[test]
    fn test_prefix_must_match_type() {
        let id = "indicator--2f1a6c3e-9b7d-4c1e-8a2b-3d4e5f607182";
        assert!(is_valid_id_for_type(id, "indicator"));
        assert!(!is_valid_id_for_type(id, "malware"));
    }

    #[test]
    fn test_id_prefix() {
        assert_eq!(id_prefix("malware--local-1"), Some("malware"));
        assert_eq!(id_prefix("no-separator"), None);
        assert_eq!(id_prefix("--abc"), None);
    }

    #[test]
    fn test_sanitize_type() {
        assert_eq!(sanitize_type("Attack Pattern"), "attack-pattern");
        assert_eq!(sanitize_type("threat_actor"), "threat-actor");
        assert_eq!(sanitize_type("  Malware  "), "malware");
        assert_eq!(sanitize_type("0day"), "x-0day");
        assert_eq!(sanitize_type("!!!"), "x-unknown");
    }

    #[test]
    fn test_parse() {
        assert!(StixId::parse("malware--1").is_err());
        let id = StixId::generate("tool");
        assert_eq!(StixId::parse(id.as_str()).unwrap(), id);
    }

    proptest! {
        #[test]
        fn prop_generate_is_always_valid(t in "\\PC{0,24}") {
            let id = StixId::generate(&t);
            prop_assert!(is_valid_id(id.as_str()));
        }
    }
}
