//! STIX objects - typed nodes and relationship edges

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// `type` value carried by relationship edges
pub const RELATIONSHIP_TYPE: &str = "relationship";

/// Errors raised when turning raw JSON into a [`StixObject`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectError {
    /// The value is not a JSON object
    #[error("object is not a JSON map")]
    NotAnObject,

    /// The `type` property is missing or not a string
    #[error("object missing 'type'")]
    MissingType,
}

/// A STIX object: either a node (`malware`, `indicator`, ...) or a relationship edge
///
/// Everything other than `type` and `id` lives in `properties` untouched, so
/// nothing the model produced is lost on the way through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StixObject {
    /// Object type (`malware`, `relationship`, ...)
    #[serde(rename = "type")]
    pub object_type: String,

    /// Identifier; only unique within its originating chunk until normalization
    #[serde(default)]
    pub id: String,

    /// All remaining properties
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl StixObject {
    /// Create an object with no properties
    pub fn new(object_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            id: id.into(),
            properties: Map::new(),
        }
    }

    /// Create a relationship edge
    ///
    /// # Examples
    ///
    /// ```
    /// use stixweave_domain::StixObject;
    ///
    /// let edge = StixObject::relationship("relationship--1", "uses", "malware--1", "tool--1");
    /// assert!(edge.is_relationship());
    /// assert_eq!(edge.relationship_type(), Some("uses"));
    /// assert_eq!(edge.source_ref(), Some("malware--1"));
    /// assert_eq!(edge.target_ref(), Some("tool--1"));
    /// ```
    pub fn relationship(
        id: impl Into<String>,
        relationship_type: &str,
        source_ref: &str,
        target_ref: &str,
    ) -> Self {
        Self::new(RELATIONSHIP_TYPE, id)
            .with("relationship_type", relationship_type)
            .with("source_ref", source_ref)
            .with("target_ref", target_ref)
    }

    /// Builder-style property setter
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Convert a raw JSON value produced by the model
    ///
    /// A missing `id` is left empty; the caller decides what placeholder to use.
    pub fn from_value(value: Value) -> Result<Self, ObjectError> {
        let Value::Object(mut map) = value else {
            return Err(ObjectError::NotAnObject);
        };
        let object_type = match map.remove("type") {
            Some(Value::String(t)) if !t.trim().is_empty() => t,
            _ => return Err(ObjectError::MissingType),
        };
        let id = match map.remove("id") {
            Some(Value::String(id)) => id,
            _ => String::new(),
        };
        Ok(Self {
            object_type,
            id,
            properties: map,
        })
    }

    /// Convert back to a JSON value with `type` and `id` inlined
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.properties.len() + 2);
        map.insert("type".to_string(), Value::String(self.object_type.clone()));
        map.insert("id".to_string(), Value::String(self.id.clone()));
        for (k, v) in &self.properties {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }

    /// Whether this object is a relationship edge
    pub fn is_relationship(&self) -> bool {
        self.object_type == RELATIONSHIP_TYPE
    }

    /// Get a string property
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Set a string property
    pub fn set_str(&mut self, key: &str, value: impl Into<String>) {
        self.properties
            .insert(key.to_string(), Value::String(value.into()));
    }

    /// `name` property, if any
    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    /// `pattern` property, if any (indicators)
    pub fn pattern(&self) -> Option<&str> {
        self.get_str("pattern")
    }

    /// Relationship verb
    pub fn relationship_type(&self) -> Option<&str> {
        self.get_str("relationship_type")
    }

    /// Relationship source endpoint
    pub fn source_ref(&self) -> Option<&str> {
        self.get_str("source_ref")
    }

    /// Relationship target endpoint
    pub fn target_ref(&self) -> Option<&str> {
        self.get_str("target_ref")
    }
}

/// Whether a property key holds identifier references (`*_ref` / `*_refs`)
pub fn is_reference_key(key: &str) -> bool {
    key.ends_with("_ref") || key.ends_with("_refs")
}

/// Apply `f` to every string reachable from `value`, recursing into arrays and maps
pub fn visit_strings_mut(value: &mut Value, f: &mut impl FnMut(&mut String)) {
    match value {
        Value::String(s) => f(s),
        Value::Array(items) => {
            for item in items {
                visit_strings_mut(item, f);
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                visit_strings_mut(v, f);
            }
        }
        _ => {}
    }
}
