//! Draft validation logic

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use stixweave_domain::{CapabilityError, DraftValidator, DraftVerdict};

use crate::required::{canonical_type, is_defaultable, required_fields};
use crate::{GatekeeperError, ValidationConfig};

/// A problem found in a draft
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftIssue {
    /// Entry is not a JSON object
    NotAnObject {
        /// Position in the draft
        index: usize,
    },

    /// Entry has no usable `type`
    MissingType {
        /// Position in the draft
        index: usize,
    },

    /// `type` is not spelled canonically
    NonCanonicalType {
        /// Position in the draft
        index: usize,
        /// Type as given
        given: String,
        /// Expected spelling
        expected: String,
    },

    /// `type` is outside the known table
    UnknownType {
        /// Position in the draft
        index: usize,
        /// Type as given
        object_type: String,
    },

    /// Required field missing
    MissingField {
        /// Position in the draft
        index: usize,
        /// Object type
        object_type: String,
        /// Field name
        field: String,
    },

    /// Relationship endpoint does not name an object in the draft
    DanglingReference {
        /// Position in the draft
        index: usize,
        /// `source_ref` or `target_ref`
        field: String,
        /// Referenced id
        value: String,
    },

    /// Two objects in the draft share an id
    DuplicateId {
        /// Position of the later object
        index: usize,
        /// The id
        id: String,
    },
}

impl fmt::Display for DraftIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DraftIssue::NotAnObject { index } => {
                write!(f, "objects[{}]: not a JSON object", index)
            }
            DraftIssue::MissingType { index } => {
                write!(f, "objects[{}]: missing 'type'", index)
            }
            DraftIssue::NonCanonicalType {
                index,
                given,
                expected,
            } => write!(
                f,
                "objects[{}]: type '{}' should be written '{}'",
                index, given, expected
            ),
            DraftIssue::UnknownType { index, object_type } => write!(
                f,
                "objects[{}]: '{}' is not a STIX 2.1 object type",
                index, object_type
            ),
            DraftIssue::MissingField {
                index,
                object_type,
                field,
            } => write!(
                f,
                "objects[{}]: {} is missing required field '{}'",
                index, object_type, field
            ),
            DraftIssue::DanglingReference {
                index,
                field,
                value,
            } => write!(
                f,
                "objects[{}]: {} '{}' does not match any object id in the draft",
                index, field, value
            ),
            DraftIssue::DuplicateId { index, id } => {
                write!(f, "objects[{}]: id '{}' is used more than once", index, id)
            }
        }
    }
}

/// The DraftGatekeeper checks candidate objects before the model commits to them
pub struct DraftGatekeeper {
    config: ValidationConfig,
}

impl DraftGatekeeper {
    /// Create a new DraftGatekeeper with the given configuration
    ///
    /// # Errors
    ///
    /// Returns `GatekeeperError::Config` if the configuration is invalid.
    pub fn new(config: ValidationConfig) -> Result<Self, GatekeeperError> {
        config.validate().map_err(GatekeeperError::Config)?;
        Ok(Self { config })
    }

    /// Create a DraftGatekeeper with default configuration
    pub fn default_config() -> Self {
        Self {
            config: ValidationConfig::default(),
        }
    }

    /// Collect every issue in a draft
    pub fn check(&self, objects: &[Value]) -> Vec<DraftIssue> {
        let mut issues = Vec::new();

        let ids: HashSet<&str> = objects
            .iter()
            .filter_map(|o| o.get("id").and_then(Value::as_str))
            .collect();
        let mut seen_ids = HashSet::new();

        for (index, value) in objects.iter().enumerate() {
            let Some(map) = value.as_object() else {
                issues.push(DraftIssue::NotAnObject { index });
                continue;
            };

            let Some(given) = map
                .get("type")
                .and_then(Value::as_str)
                .filter(|t| !t.trim().is_empty())
            else {
                issues.push(DraftIssue::MissingType { index });
                continue;
            };

            if let Some(id) = map.get("id").and_then(Value::as_str) {
                if !seen_ids.insert(id) {
                    issues.push(DraftIssue::DuplicateId {
                        index,
                        id: id.to_string(),
                    });
                }
            }

            let object_type = canonical_type(given);
            if object_type != given {
                issues.push(DraftIssue::NonCanonicalType {
                    index,
                    given: given.to_string(),
                    expected: object_type.clone(),
                });
            }

            match required_fields(&object_type) {
                Some(fields) => {
                    for field in fields.iter().copied() {
                        if map.contains_key(field) {
                            continue;
                        }
                        if is_defaultable(field) && !self.config.require_defaultable_fields {
                            continue;
                        }
                        issues.push(DraftIssue::MissingField {
                            index,
                            object_type: object_type.clone(),
                            field: field.to_string(),
                        });
                    }
                }
                None if self.config.reject_unknown_types => {
                    issues.push(DraftIssue::UnknownType { index, object_type: object_type.clone() });
                }
                None => {}
            }

            if object_type == "relationship" && self.config.require_reference_closure {
                for field in ["source_ref", "target_ref"] {
                    if let Some(target) = map.get(field).and_then(Value::as_str) {
                        if !ids.contains(target) {
                            issues.push(DraftIssue::DanglingReference {
                                index,
                                field: field.to_string(),
                                value: target.to_string(),
                            });
                        }
                    }
                }
            }
        }

        issues
    }

    /// Validate a draft and render the verdict
    pub fn validate_objects(&self, objects: &[Value]) -> DraftVerdict {
        let issues = self.check(objects);
        let total = issues.len();
        let mut errors: Vec<String> = issues
            .iter()
            .take(self.config.max_errors)
            .map(ToString::to_string)
            .collect();
        if total > self.config.max_errors {
            errors.push(format!("... and {} more", total - self.config.max_errors));
        }
        DraftVerdict::from_errors(errors)
    }
}

#[async_trait]
impl DraftValidator for DraftGatekeeper {
    async fn validate(&self, objects: &[Value]) -> Result<DraftVerdict, CapabilityError> {
        Ok(self.validate_objects(objects))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_draft() -> Vec<Value> {
        vec![
            json!({"type": "malware", "id": "malware--1", "name": "Emotet"}),
            json!({"type": "attack-pattern", "id": "attack-pattern--1", "name": "Phishing"}),
            json!({
                "type": "relationship", "id": "relationship--1",
                "relationship_type": "uses",
                "source_ref": "malware--1", "target_ref": "attack-pattern--1"
            }),
        ]
    }

    #[test]
    fn test_valid_draft() {
        let gatekeeper = DraftGatekeeper::default_config();
        let verdict = gatekeeper.validate_objects(&valid_draft());
        assert!(verdict.ok, "unexpected errors: {:?}", verdict.errors);
        assert!(verdict.errors.is_empty());
    }

    #[test]
    fn test_missing_required_fields() {
        let gatekeeper = DraftGatekeeper::default_config();
        let issues = gatekeeper.check(&[json!({"type": "indicator", "id": "indicator--1"})]);
        // pattern_type and valid_from are filled later; pattern is not
        assert_eq!(
            issues,
            vec![DraftIssue::MissingField {
                index: 0,
                object_type: "indicator".into(),
                field: "pattern".into()
            }]
        );
    }

    #[test]
    fn test_strict_reports_defaultable_fields() {
        let gatekeeper = DraftGatekeeper::new(ValidationConfig::strict()).unwrap();
        let issues = gatekeeper.check(&[json!({"type": "indicator", "id": "indicator--1", "pattern": "[x]"})]);
        let fields: Vec<_> = issues
            .iter()
            .filter_map(|i| match i {
                DraftIssue::MissingField { field, .. } => Some(field.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            fields,
            vec!["spec_version", "created", "modified", "pattern_type", "valid_from"]
        );
    }

    #[test]
    fn test_structural_issues() {
        let gatekeeper = DraftGatekeeper::default_config();
        let issues = gatekeeper.check(&[
            json!("just a string"),
            json!({"name": "no type"}),
            json!({"type": "Threat_Actor", "id": "t--1", "name": "APT1"}),
        ]);
        assert_eq!(issues[0], DraftIssue::NotAnObject { index: 0 });
        assert_eq!(issues[1], DraftIssue::MissingType { index: 1 });
        assert!(matches!(
            &issues[2],
            DraftIssue::NonCanonicalType { expected, .. } if expected == "threat-actor"
        ));
    }

    #[test]
    fn test_dangling_reference_and_duplicate_id() {
        let gatekeeper = DraftGatekeeper::default_config();
        let mut draft = valid_draft();
        draft.push(json!({
            "type": "relationship", "id": "relationship--1",
            "relationship_type": "uses",
            "source_ref": "malware--1", "target_ref": "tool--404"
        }));
        let issues = gatekeeper.check(&draft);
        assert!(issues.contains(&DraftIssue::DuplicateId {
            index: 3,
            id: "relationship--1".into()
        }));
        assert!(issues.contains(&DraftIssue::DanglingReference {
            index: 3,
            field: "target_ref".into(),
            value: "tool--404".into()
        }));

        let permissive = DraftGatekeeper::new(ValidationConfig::permissive()).unwrap();
        assert!(!permissive
            .check(&draft)
            .iter()
            .any(|i| matches!(i, DraftIssue::DanglingReference { .. })));
    }

    #[test]
    fn test_unknown_types() {
        let draft = [json!({"type": "x-custom-thing", "id": "x--1"})];
        assert!(DraftGatekeeper::default_config().check(&draft).is_empty());

        let strict = DraftGatekeeper::new(ValidationConfig::strict()).unwrap();
        assert!(matches!(
            strict.check(&draft)[0],
            DraftIssue::UnknownType { .. }
        ));
    }

    #[test]
    fn test_error_cap() {
        let config = ValidationConfig {
            max_errors: 2,
            ..Default::default()
        };
        let gatekeeper = DraftGatekeeper::new(config).unwrap();
        let draft: Vec<Value> = (0..5).map(|_| json!({"no": "type"})).collect();
        let verdict = gatekeeper.validate_objects(&draft);
        assert!(!verdict.ok);
        assert_eq!(verdict.errors.len(), 3);
        assert_eq!(verdict.errors[2], "... and 3 more");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ValidationConfig {
            max_errors: 0,
            ..Default::default()
        };
        assert!(matches!(
            DraftGatekeeper::new(config),
            Err(GatekeeperError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_draft_validator_trait() {
        let gatekeeper = DraftGatekeeper::default_config();
        let verdict = gatekeeper.validate(&valid_draft()).await.unwrap();
        assert!(verdict.ok);
    }
}
