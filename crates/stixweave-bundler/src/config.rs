//! Configuration for bundle assembly
//!
//! Controls how duplicate nodes are recognized during merge and what the
//! relationship remapper does with source types it has no rules for.

use serde::{Deserialize, Serialize};

/// How node names are normalized before comparing canonicalization keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameNormalization {
    /// Byte-for-byte comparison
    Exact,
    /// Trim, lowercase, collapse whitespace
    #[default]
    CaseFold,
    /// `CaseFold` plus punctuation stripping
    Loose,
}

impl NameNormalization {
    /// Normalize a name for key comparison
    ///
    /// # Examples
    ///
    /// ```
    /// use stixweave_bundler::NameNormalization;
    ///
    /// assert_eq!(NameNormalization::CaseFold.normalize("  Cobalt   Strike "), "cobalt strike");
    /// assert_eq!(NameNormalization::Loose.normalize("Cobalt-Strike!"), "cobaltstrike");
    /// assert_eq!(NameNormalization::Exact.normalize("Cobalt Strike "), "Cobalt Strike ");
    /// ```
    pub fn normalize(&self, name: &str) -> String {
        match self {
            NameNormalization::Exact => name.to_string(),
            NameNormalization::CaseFold => collapse_whitespace(&name.to_lowercase()),
            NameNormalization::Loose => {
                let stripped: String = name
                    .to_lowercase()
                    .chars()
                    .filter(|c| c.is_alphanumeric() || c.is_whitespace())
                    .collect();
                collapse_whitespace(&stripped)
            }
        }
    }
}

/// Trim and collapse runs of whitespace to a single space
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// What the remapper does with relationships whose source type has no rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownTypePolicy {
    /// Keep the edge unchanged and warn
    #[default]
    Keep,
    /// Remove the edge and report it
    Drop,
}

/// Configuration for the Bundler
///
/// # Examples
///
/// ```
/// use stixweave_bundler::{BundlerConfig, NameNormalization, UnknownTypePolicy};
///
/// let config = BundlerConfig::default();
/// assert_eq!(config.name_normalization, NameNormalization::CaseFold);
/// assert_eq!(config.unknown_source_types, UnknownTypePolicy::Keep);
///
/// let config = BundlerConfig::strict();
/// assert_eq!(config.unknown_source_types, UnknownTypePolicy::Drop);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundlerConfig {
    /// Name normalization used by the merge key
    pub name_normalization: NameNormalization,

    /// Handling of relationship source types outside the compatibility table
    pub unknown_source_types: UnknownTypePolicy,

    /// Fill missing STIX 2.1 required fields before identifier normalization
    pub fill_defaults: bool,

    /// Scan the source text for indicator-like spans no object mentions
    pub scan_missing_candidates: bool,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            name_normalization: NameNormalization::CaseFold,
            unknown_source_types: UnknownTypePolicy::Keep,
            fill_defaults: true,
            scan_missing_candidates: true,
        }
    }
}

impl BundlerConfig {
    /// Strict preset: exact names, edges from unknown source types dropped
    pub fn strict() -> Self {
        Self {
            name_normalization: NameNormalization::Exact,
            unknown_source_types: UnknownTypePolicy::Drop,
            ..Self::default()
        }
    }

    /// Lenient preset: loose name matching, unknown source types kept
    pub fn lenient() -> Self {
        Self {
            name_normalization: NameNormalization::Loose,
            unknown_source_types: UnknownTypePolicy::Keep,
            ..Self::default()
        }
    }
}
