//! In-memory reference material for the `search_reference` tool

use async_trait::async_trait;
use std::collections::HashSet;
use stixweave_domain::{CapabilityError, ReferenceLookup};
use tracing::debug;

/// Default number of snippets returned per query
pub const DEFAULT_TOP_K: usize = 5;

/// One titled snippet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEntry {
    /// Short heading
    pub title: String,
    /// Body text
    pub text: String,
}

impl ReferenceEntry {
    /// Create an entry
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
        }
    }

    fn render(&self) -> String {
        format!("{}\n{}", self.title, self.text)
    }
}

/// Keyword-ranked reference corpus
///
/// Entries are scored by how often the query's terms occur in them, title
/// hits counting five times. Ties keep insertion order.
///
/// # Examples
///
/// ```
/// use stixweave_extractor::ReferenceCorpus;
///
/// let corpus = ReferenceCorpus::builtin();
/// let hits = corpus.search_ranked("indicator pattern");
/// assert!(hits[0].title.starts_with("indicator"));
/// ```
#[derive(Debug, Clone)]
pub struct ReferenceCorpus {
    entries: Vec<ReferenceEntry>,
    top_k: usize,
}

impl ReferenceCorpus {
    /// Create a corpus from entries
    pub fn new(entries: Vec<ReferenceEntry>) -> Self {
        Self {
            entries,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Corpus of built-in STIX 2.1 notes
    pub fn builtin() -> Self {
        Self::new(
            BUILTIN
                .iter()
                .map(|(title, text)| ReferenceEntry::new(*title, *text))
                .collect(),
        )
    }

    /// Parse markdown into entries, one per heading
    ///
    /// Text before the first heading is ignored.
    pub fn from_markdown(markdown: &str) -> Self {
        let mut entries = Vec::new();
        let mut current: Option<(String, String)> = None;
        for line in markdown.lines() {
            if line.starts_with('#') {
                if let Some((title, text)) = current.take() {
                    entries.push(ReferenceEntry::new(title, text.trim()));
                }
                current = Some((line.trim_start_matches('#').trim().to_string(), String::new()));
            } else if let Some((_, text)) = current.as_mut() {
                text.push_str(line);
                text.push('\n');
            }
        }
        if let Some((title, text)) = current {
            entries.push(ReferenceEntry::new(title, text.trim()));
        }
        Self::new(entries)
    }

    /// Limit the number of snippets per query
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Add entries
    pub fn extend(&mut self, entries: impl IntoIterator<Item = ReferenceEntry>) {
        self.entries.extend(entries);
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the corpus has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Best matching entries, best first
    pub fn search_ranked(&self, query: &str) -> Vec<&ReferenceEntry> {
        let terms: HashSet<String> = tokenize(query).collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, usize)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(position, entry)| {
                let title_hits = tokenize(&entry.title).filter(|t| terms.contains(t)).count();
                let text_hits = tokenize(&entry.text).filter(|t| terms.contains(t)).count();
                let score = title_hits * 5 + text_hits;
                (score > 0).then_some((position, score))
            })
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        scored
            .into_iter()
            .take(self.top_k)
            .map(|(position, _)| &self.entries[position])
            .collect()
    }
}

impl Default for ReferenceCorpus {
    fn default() -> Self {
        Self::builtin()
    }
}

#[async_trait]
impl ReferenceLookup for ReferenceCorpus {
    async fn search(&self, query: &str) -> Result<Vec<String>, CapabilityError> {
        let hits: Vec<String> = self
            .search_ranked(query)
            .into_iter()
            .map(ReferenceEntry::render)
            .collect();
        debug!("Reference search '{}' returned {} snippets", query, hits.len());
        Ok(hits)
    }
}

/// Lowercased terms, splitting on anything but alphanumerics and `-`/`_`
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
        .filter(|t| t.len() > 1)
        .map(str::to_lowercase)
}

const BUILTIN: &[(&str, &str)] = &[
    (
        "bundle",
        "A bundle has type \"bundle\", an id \"bundle--<uuid4>\" and an objects array. \
         It carries no spec_version, created or modified of its own.",
    ),
    (
        "common properties",
        "Every STIX domain and relationship object has type, id (\"<type>--<uuid4>\"), \
         spec_version \"2.1\", created and modified timestamps in RFC 3339 UTC with \
         millisecond precision, e.g. 2024-01-01T00:00:00.000Z.",
    ),
    (
        "indicator",
        "Required: pattern, pattern_type (\"stix\"), valid_from. Pattern examples: \
         [ipv4-addr:value = '198.51.100.1'], [domain-name:value = 'evil.example'], \
         [url:value = 'http://evil.example/a'], [file:hashes.'SHA-256' = '<hex>']. \
         Optional: name, description, indicator_types.",
    ),
    (
        "attack-pattern",
        "Required: name. Use external_references with source_name \"mitre-attack\" and \
         external_id such as T1566.001 for ATT&CK techniques.",
    ),
    (
        "malware",
        "Required: name, is_family (boolean). Optional: malware_types (e.g. ransomware, \
         trojan, backdoor), description, aliases.",
    ),
    (
        "tool",
        "Required: name. Legitimate software used by attackers, e.g. Cobalt Strike, \
         Mimikatz, PsExec. Optional: tool_types.",
    ),
    (
        "vulnerability",
        "Required: name, conventionally the CVE id. Put the CVE in external_references \
         with source_name \"cve\" and external_id CVE-YYYY-NNNN.",
    ),
    (
        "threat-actor",
        "Required: name. Optional: threat_actor_types, aliases, roles, goals, \
         sophistication, resource_level, primary_motivation.",
    ),
    (
        "intrusion-set",
        "Required: name. A grouping of adversarial behavior believed to be orchestrated \
         by a single organization. Optional: aliases, goals.",
    ),
    (
        "campaign",
        "Required: name. A set of malicious activities against a specific set of targets \
         over time. Optional: first_seen, last_seen, objective.",
    ),
    (
        "infrastructure",
        "Required: name. C2 servers, botnets, staging hosts. Optional: infrastructure_types \
         such as command-and-control.",
    ),
    (
        "identity",
        "Required: name, identity_class (individual, group, organization, class, unknown). \
         Optional: sectors.",
    ),
    (
        "location",
        "Requires at least one of region, country or latitude/longitude. Optional: name.",
    ),
    (
        "relationship",
        "Required: relationship_type, source_ref, target_ref. Common verbs: uses, targets, \
         indicates, exploits, attributed-to, delivers, drops, communicates-with, \
         located-at, variant-of, related-to. Both refs must be ids of objects in the bundle.",
    ),
    (
        "sighting",
        "Required: sighting_of_ref. Optional: observed_data_refs, where_sighted_refs, count, \
         first_seen, last_seen.",
    ),
    (
        "relationship compatibility",
        "Allowed examples: malware uses attack-pattern; threat-actor uses malware; \
         indicator indicates malware; attack-pattern targets vulnerability; malware \
         communicates-with ipv4-addr; intrusion-set attributed-to threat-actor. \
         Malware does not use malware: use downloads or drops instead.",
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ranking() {
        let corpus = ReferenceCorpus::builtin();
        let hits = corpus.search_ranked("malware is_family boolean");
        assert_eq!(hits[0].title, "malware");
        assert!(hits.len() <= DEFAULT_TOP_K);
    }

    #[test]
    fn test_no_match_returns_nothing() {
        let corpus = ReferenceCorpus::builtin();
        assert!(corpus.search_ranked("zzzz qqqq").is_empty());
        assert!(corpus.search_ranked("").is_empty());
    }

    #[test]
    fn test_top_k() {
        let corpus = ReferenceCorpus::builtin().with_top_k(2);
        assert_eq!(corpus.search_ranked("required name").len(), 2);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let corpus = ReferenceCorpus::new(vec![
            ReferenceEntry::new("a", "shared term"),
            ReferenceEntry::new("b", "shared term"),
        ]);
        let titles: Vec<_> = corpus.search_ranked("shared").iter().map(|e| e.title.clone()).collect();
        assert_eq!(titles, vec!["a", "b"]);
    }

    #[test]
    fn test_from_markdown() {
        let corpus = ReferenceCorpus::from_markdown(
            "preamble\n# Indicator\nneeds a pattern\n\n## Tool\nneeds a name\n",
        );
        assert_eq!(corpus.len(), 2);
        let hits = corpus.search_ranked("pattern");
        assert_eq!(hits[0].title, "Indicator");
        assert_eq!(hits[0].text, "needs a pattern");
    }

    #[tokio::test]
    async fn test_lookup_trait() {
        let corpus = ReferenceCorpus::builtin();
        let snippets = corpus.search("vulnerability cve").await.unwrap();
        assert!(snippets[0].starts_with("vulnerability\n"));
    }
}
