//! Required-field completion
//!
//! Fills the STIX 2.1 fields a model routinely forgets with safe defaults and
//! canonicalizes type names. Identifiers are left alone; rewriting them is the
//! identifier normalizer's job.

use chrono::Utc;
use serde_json::{json, Value};
use stixweave_domain::{StixObject, SPEC_VERSION};
use tracing::debug;

use crate::required::{canonical_type, required_fields, stix_timestamp};
use crate::GatekeeperError;

/// Counters from a completion pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionReport {
    /// Fields added
    pub fields_filled: usize,
    /// Objects whose `type` was respelled
    pub types_canonicalized: usize,
}

/// Fills missing required fields with defaults
#[derive(Debug, Clone)]
pub struct FieldCompleter {
    timestamp: String,
}

impl FieldCompleter {
    /// Completer stamping the current time
    pub fn new() -> Self {
        Self {
            timestamp: stix_timestamp(Utc::now()),
        }
    }

    /// Completer stamping a fixed timestamp
    pub fn with_timestamp(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
        }
    }

    /// The timestamp used for `created`, `modified` and friends
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Complete one object, returning the number of fields added
    pub fn complete(&self, object: &mut StixObject) -> usize {
        let mut filled = 0;
        let ts = Value::String(self.timestamp.clone());

        let mut fill = |object: &mut StixObject, key: &str, value: Value| {
            if !object.properties.contains_key(key) {
                object.properties.insert(key.to_string(), value);
                filled += 1;
            }
        };

        fill(object, "spec_version", json!(SPEC_VERSION));

        if required_fields(&object.object_type).is_some() {
            fill(object, "created", ts.clone());
            fill(object, "modified", ts.clone());
        }

        match object.object_type.as_str() {
            "malware" => {
                fill(object, "is_family", json!(true));
                fill(object, "malware_types", json!(["unknown"]));
            }
            "threat-actor" => fill(object, "threat_actor_types", json!(["unknown"])),
            "tool" => fill(object, "tool_types", json!(["unknown"])),
            "infrastructure" => fill(object, "infrastructure_types", json!(["unknown"])),
            "identity" => fill(object, "identity_class", json!("organization")),
            "indicator" => {
                fill(object, "pattern_type", json!("stix"));
                fill(object, "valid_from", ts.clone());
            }
            "observed-data" => {
                fill(object, "first_observed", ts.clone());
                fill(object, "last_observed", ts.clone());
                fill(object, "number_observed", json!(1));
            }
            "report" => fill(object, "published", ts.clone()),
            _ => {}
        }

        filled
    }

    /// Canonicalize types and complete every object
    pub fn complete_all(&self, objects: &mut [StixObject]) -> CompletionReport {
        let mut report = CompletionReport::default();
        for object in objects.iter_mut() {
            let canonical = canonical_type(&object.object_type);
            if canonical != object.object_type {
                debug!("Respelled type '{}' as '{}'", object.object_type, canonical);
                object.object_type = canonical;
                report.types_canonicalized += 1;
            }
            report.fields_filled += self.complete(object);
        }
        report
    }

    /// Convert and complete a raw JSON object
    ///
    /// # Errors
    ///
    /// Returns `GatekeeperError::InvalidObject` if the value is not an object
    /// or has no `type`.
    pub fn complete_value(&self, value: Value) -> Result<StixObject, GatekeeperError> {
        let mut object = StixObject::from_value(value)
            .map_err(|e| GatekeeperError::InvalidObject(e.to_string()))?;
        object.object_type = canonical_type(&object.object_type);
        self.complete(&mut object);
        Ok(object)
    }
}

impl Default for FieldCompleter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: &str = "2024-01-01T00:00:00.000Z";

    #[test]
    fn test_malware_defaults() {
        let completer = FieldCompleter::with_timestamp(TS);
        let mut obj = StixObject::new("malware", "malware--1").with("name", "Emotet");
        let filled = completer.complete(&mut obj);

        assert_eq!(filled, 5);
        assert_eq!(obj.properties["spec_version"], "2.1");
        assert_eq!(obj.properties["created"], TS);
        assert_eq!(obj.properties["modified"], TS);
        assert_eq!(obj.properties["is_family"], true);
        assert_eq!(obj.properties["malware_types"], json!(["unknown"]));
    }

    #[test]
    fn test_existing_values_are_kept() {
        let completer = FieldCompleter::with_timestamp(TS);
        let mut obj = StixObject::new("malware", "malware--1")
            .with("is_family", false)
            .with("created", "2020-01-01T00:00:00.000Z");
        completer.complete(&mut obj);

        assert_eq!(obj.properties["is_family"], false);
        assert_eq!(obj.properties["created"], "2020-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_indicator_and_observed_data_defaults() {
        let completer = FieldCompleter::with_timestamp(TS);
        let mut indicator = StixObject::new("indicator", "indicator--1");
        completer.complete(&mut indicator);
        assert_eq!(indicator.properties["pattern_type"], "stix");
        assert_eq!(indicator.properties["valid_from"], TS);

        let mut observed = StixObject::new("observed-data", "observed-data--1");
        completer.complete(&mut observed);
        assert_eq!(observed.properties["number_observed"], 1);
        assert_eq!(observed.properties["first_observed"], TS);
    }

    #[test]
    fn test_observables_get_no_timestamps() {
        let completer = FieldCompleter::with_timestamp(TS);
        let mut obj = StixObject::new("ipv4-addr", "ipv4-addr--1").with("value", "10.0.0.1");
        assert_eq!(completer.complete(&mut obj), 1);
        assert!(!obj.properties.contains_key("created"));
    }

    #[test]
    fn test_complete_all_canonicalizes_types() {
        let completer = FieldCompleter::with_timestamp(TS);
        let mut objects = vec![
            StixObject::new("Attack_Pattern", "x--1"),
            StixObject::new("tool", "tool--1"),
        ];
        let report = completer.complete_all(&mut objects);
        assert_eq!(report.types_canonicalized, 1);
        assert_eq!(objects[0].object_type, "attack-pattern");
        assert_eq!(objects[1].properties["tool_types"], json!(["unknown"]));
        assert!(report.fields_filled >= 7);
    }

    #[test]
    fn test_complete_value_rejects_untyped() {
        let completer = FieldCompleter::with_timestamp(TS);
        assert!(matches!(
            completer.complete_value(json!({"name": "x"})),
            Err(GatekeeperError::InvalidObject(_))
        ));
        let obj = completer
            .complete_value(json!({"type": "Identity", "name": "ACME"}))
            .unwrap();
        assert_eq!(obj.object_type, "identity");
        assert_eq!(obj.properties["identity_class"], "organization");
    }
}
