//! The bundle container

use serde::{Deserialize, Serialize};

use crate::id::StixId;
use crate::object::StixObject;

/// STIX specification version emitted on bundles and objects
pub const SPEC_VERSION: &str = "2.1";

/// A STIX bundle: one container holding every node and edge of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    /// Always `"bundle"`
    #[serde(rename = "type")]
    pub bundle_type: String,

    /// Bundle identifier
    pub id: String,

    /// Specification version
    #[serde(default = "default_spec_version")]
    pub spec_version: String,

    /// Contained objects
    #[serde(default)]
    pub objects: Vec<StixObject>,
}

fn default_spec_version() -> String {
    SPEC_VERSION.to_string()
}

impl Bundle {
    /// Create a bundle with a freshly generated id
    pub fn new(objects: Vec<StixObject>) -> Self {
        Self {
            bundle_type: "bundle".to_string(),
            id: StixId::generate("bundle").into_string(),
            spec_version: SPEC_VERSION.to_string(),
            objects,
        }
    }

    /// Look up an object by id
    pub fn get(&self, id: &str) -> Option<&StixObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    /// Whether an object with this id exists
    pub fn contains(&self, id: &str) -> bool {
        self.objects.iter().any(|o| o.id == id)
    }

    /// Iterate over relationship edges
    pub fn relationships(&self) -> impl Iterator<Item = &StixObject> {
        self.objects.iter().filter(|o| o.is_relationship())
    }

    /// Iterate over nodes (everything that is not a relationship)
    pub fn nodes(&self) -> impl Iterator<Item = &StixObject> {
        self.objects.iter().filter(|o| !o.is_relationship())
    }

    /// Number of contained objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the bundle has no objects
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
