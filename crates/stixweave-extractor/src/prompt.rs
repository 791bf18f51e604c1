//! Prompts for per-chunk object extraction

use stixweave_domain::{Chunk, SEARCH_REFERENCE_TOOL, VALIDATE_DRAFT_TOOL};

/// Builds the system and chunk prompts of an extraction conversation
pub struct PromptBuilder {
    source_name: Option<String>,
}

impl PromptBuilder {
    /// Create a new prompt builder
    pub fn new() -> Self {
        Self { source_name: None }
    }

    /// Name the source document in the chunk prompt
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// The system turn
    pub fn system_prompt(&self) -> String {
        let mut prompt = String::new();
        prompt.push_str(EXTRACTION_INSTRUCTIONS);
        prompt.push_str("\n\n");
        prompt.push_str(&format!(
            "Tools:\n\
             - {}: look up STIX 2.1 format requirements, argument {{\"query\": string}}\n\
             - {}: check a draft before answering, argument {{\"objects\": [STIX objects]}}\n\n",
            SEARCH_REFERENCE_TOOL, VALIDATE_DRAFT_TOOL
        ));
        prompt.push_str(OUTPUT_FORMAT_REMINDER);
        prompt
    }

    /// The user turn for one chunk
    pub fn chunk_prompt(&self, chunk: &Chunk) -> String {
        let mut prompt = String::new();
        prompt.push_str(&format!(
            "Extract STIX 2.1 objects from {} (characters {}..{}",
            chunk.label(),
            chunk.start_offset,
            chunk.end_offset
        ));
        if let Some(name) = &self.source_name {
            prompt.push_str(&format!(" of '{}'", name));
        }
        prompt.push_str(").\n");
        if chunk.total > 1 {
            prompt.push_str(
                "The document was split into overlapping chunks; extract only what this chunk states.\n",
            );
        }
        prompt.push_str("\nText to analyze:\n---\n");
        prompt.push_str(&chunk.text);
        prompt.push_str("\n---\n");
        prompt
    }

    /// Feedback appended after an answer that could not be used
    pub fn correction(&self, problem: &str) -> String {
        format!(
            "Your answer could not be used: {}.\n\
             Reply with ONLY a JSON array of STIX 2.1 objects (or a bundle), no other text.",
            problem
        )
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

const EXTRACTION_INSTRUCTIONS: &str = r#"You are a threat-intelligence analyst converting report text into STIX 2.1 objects.

Extract every relevant object, not only indicators:
- indicator: observables such as IP addresses, domains, URLs and file hashes, with a STIX pattern
  (e.g. "[ipv4-addr:value = '203.0.113.7']", pattern_type "stix")
- attack-pattern: techniques, with the MITRE ATT&CK id in external_references when known (e.g. T1566.001)
- malware, tool: named malicious or dual-use software
- vulnerability: CVE entries, named by their CVE id
- threat-actor, intrusion-set, campaign: who did it and as part of what
- infrastructure: C2 servers, staging hosts
- identity, location: victims and places
- relationship: typed edges between the objects above (uses, targets, indicates, exploits, ...)

Rules:
- Every object has "type" and "id"; ids look like "<type>--<uuid4>" and must be unique in your answer
- Relationships reference objects of the same answer through source_ref and target_ref
- Keep names exactly as written in the text
- Do not invent facts the text does not state"#;

const OUTPUT_FORMAT_REMINDER: &str = r#"Output format (JSON only, no additional text):
[
  {"type": "malware", "id": "malware--<uuid4>", "name": "...", "is_family": true},
  {"type": "relationship", "id": "relationship--<uuid4>", "relationship_type": "uses",
   "source_ref": "malware--<uuid4>", "target_ref": "attack-pattern--<uuid4>"}
]

Remember: validate your draft with the validation tool, then return ONLY valid JSON."#;

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize, total: usize) -> Chunk {
        Chunk {
            index,
            total,
            text: "APT29 used WellMess against 203.0.113.7".to_string(),
            start_offset: 1800,
            end_offset: 1839,
        }
    }

    #[test]
    fn test_system_prompt_names_tools() {
        let prompt = PromptBuilder::new().system_prompt();
        assert!(prompt.contains(SEARCH_REFERENCE_TOOL));
        assert!(prompt.contains(VALIDATE_DRAFT_TOOL));
        assert!(prompt.contains("relationship"));
    }

    #[test]
    fn test_chunk_prompt_includes_text_and_position() {
        let prompt = PromptBuilder::new()
            .with_source_name("report.txt")
            .chunk_prompt(&chunk(1, 3));
        assert!(prompt.contains("APT29 used WellMess"));
        assert!(prompt.contains("chunk 2/3"));
        assert!(prompt.contains("1800..1839"));
        assert!(prompt.contains("'report.txt'"));
        assert!(prompt.contains("overlapping"));
    }

    #[test]
    fn test_single_chunk_has_no_overlap_note() {
        let prompt = PromptBuilder::new().chunk_prompt(&chunk(0, 1));
        assert!(!prompt.contains("overlapping"));
    }

    #[test]
    fn test_correction_mentions_problem() {
        let feedback = PromptBuilder::new().correction("no JSON found");
        assert!(feedback.contains("no JSON found"));
        assert!(feedback.contains("JSON array"));
    }
}
