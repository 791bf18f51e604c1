//! Advisory consistency checks
//!
//! Compares the final bundle against the source text: indicator-like spans
//! (addresses, hashes, CVE and technique ids, ...) that no object mentions are
//! reported as missing candidates. Also audits identifier health. Nothing here
//! ever changes the bundle.

use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;
use stixweave_domain::id::is_valid_id_for_type;
use stixweave_domain::{Bundle, CandidateKind, IdAudit, MissingCandidate};

struct Detector {
    kind: CandidateKind,
    pattern: Regex,
}

fn detector(kind: CandidateKind, pattern: &str) -> Option<Detector> {
    Regex::new(pattern).ok().map(|pattern| Detector { kind, pattern })
}

/// Detectors in priority order: earlier kinds claim overlapping spans first
static DETECTORS: LazyLock<Vec<Detector>> = LazyLock::new(|| {
    [
        (CandidateKind::Url, r#"\b(?:https?|ftp)://[^\s"'<>()\[\]{}]+"#),
        (
            CandidateKind::Email,
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
        ),
        (CandidateKind::Sha256, r"\b[A-Fa-f0-9]{64}\b"),
        (CandidateKind::Sha1, r"\b[A-Fa-f0-9]{40}\b"),
        (CandidateKind::Md5, r"\b[A-Fa-f0-9]{32}\b"),
        (CandidateKind::Cve, r"(?i)\bCVE-\d{4}-\d{4,7}\b"),
        (CandidateKind::AttackTechnique, r"\bT\d{4}(?:\.\d{3})?\b"),
        (
            CandidateKind::Ipv4,
            r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b",
        ),
        (
            CandidateKind::Domain,
            r"(?i)\b(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+(?:com|net|org|info|biz|io|ru|cn|xyz|top|online|site|club|co|uk|de|fr|jp|kr|in|br|gov|edu|mil|me|cc|tk|su|pw|onion|ws|to|eu|us)\b",
        ),
    ]
    .into_iter()
    .filter_map(|(kind, pattern)| detector(kind, pattern))
    .collect()
});

fn trim_url(s: &str) -> &str {
    s.trim_end_matches(['.', ',', ';', ':', '!', '?', '\''])
}

/// Find indicator-like spans in `source` that no bundle object mentions
///
/// Offsets are character offsets. Each distinct value is reported once, at its
/// first occurrence.
pub fn find_missing_candidates(source: &str, bundle: &Bundle) -> Vec<MissingCandidate> {
    let haystack = mentioned_text(bundle);
    let mut claimed: Vec<(usize, usize)> = Vec::new();
    let mut reported: HashSet<(CandidateKind, String)> = HashSet::new();
    let mut found: Vec<(usize, usize, CandidateKind, String)> = Vec::new();

    for detector in DETECTORS.iter() {
        for m in detector.pattern.find_iter(source) {
            let mut text = m.as_str();
            if detector.kind == CandidateKind::Url {
                text = trim_url(text);
            }
            let (start, end) = (m.start(), m.start() + text.len());
            if claimed.iter().any(|&(s, e)| start < e && s < end) {
                continue;
            }
            claimed.push((start, end));
            let normalized = text.to_lowercase();
            if haystack.contains(&normalized) {
                continue;
            }
            if reported.insert((detector.kind, normalized)) {
                found.push((start, end, detector.kind, text.to_string()));
            }
        }
    }

    found.sort_by_key(|&(start, ..)| start);
    found
        .into_iter()
        .map(|(start, end, kind, text)| MissingCandidate {
            start: source[..start].chars().count(),
            end: source[..end].chars().count(),
            kind,
            text,
        })
        .collect()
}

/// Every string value in the bundle, lowercased and joined
fn mentioned_text(bundle: &Bundle) -> String {
    fn collect(value: &Value, out: &mut String) {
        match value {
            Value::String(s) => {
                out.push_str(&s.to_lowercase());
                out.push('\n');
            }
            Value::Array(items) => items.iter().for_each(|v| collect(v, out)),
            Value::Object(map) => map.values().for_each(|v| collect(v, out)),
            _ => {}
        }
    }
    let mut out = String::new();
    for object in &bundle.objects {
        for value in object.properties.values() {
            collect(value, &mut out);
        }
    }
    out
}

/// Count valid and invalid identifiers
pub fn audit_ids(bundle: &Bundle) -> IdAudit {
    let mut audit = IdAudit {
        total_objects: bundle.objects.len(),
        ..Default::default()
    };
    for object in &bundle.objects {
        if is_valid_id_for_type(&object.id, &object.object_type) {
            audit.valid_ids += 1;
        } else {
            audit.invalid_ids.push(object.id.clone());
        }
    }
    audit
}
