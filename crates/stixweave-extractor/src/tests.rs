//! End-to-end tests for the Extractor

use crate::{ExecutionMode, Extractor, ExtractorConfig, ExtractorError};
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use stixweave_domain::id::is_valid_id;
use stixweave_domain::{
    Bundle, CapabilityError, ChunkStatus, ConversationState, ReasoningReply, ReasoningService,
    Turn, SEARCH_REFERENCE_TOOL, VALIDATE_DRAFT_TOOL,
};
use stixweave_llm::{MockReasoner, MockStep};
use tokio_util::sync::CancellationToken;

const FILLER: &str = "The analysts reviewed the telemetry and summarized their findings. ";

fn filler(len: usize) -> String {
    FILLER.chars().cycle().take(len).collect()
}

/// A document whose chunks (2000/200) each carry exactly one marker
///
/// Marker `k` sits 500 characters into the `k`-th 1800-character stride, out
/// of reach of both neighbors' overlap.
fn document(markers: &[&str]) -> String {
    let mut text = String::new();
    for marker in markers {
        text.push_str(&filler(500));
        text.push_str(marker);
        text.push_str(&filler(1800 - 500 - marker.len()));
    }
    text.push_str(&filler(200));
    text
}

fn test_config() -> ExtractorConfig {
    let mut config = ExtractorConfig::default();
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 4;
    config
}

fn malware_answer(name: &str) -> String {
    json!([
        {"type": "malware", "id": "malware--1", "name": name, "is_family": true},
        {"type": "tool", "id": "tool--1", "name": format!("{} loader", name)},
        {"type": "relationship", "id": "relationship--1", "relationship_type": "uses",
         "source_ref": "malware--1", "target_ref": "tool--1"}
    ])
    .to_string()
}

fn assert_closure(bundle: &Bundle) {
    for edge in bundle.relationships() {
        let source = edge.source_ref().unwrap_or_default();
        let target = edge.target_ref().unwrap_or_default();
        assert!(bundle.contains(source), "dangling source {}", source);
        assert!(bundle.contains(target), "dangling target {}", target);
    }
}

fn names(bundle: &Bundle, object_type: &str) -> Vec<String> {
    bundle
        .nodes()
        .filter(|o| o.object_type == object_type)
        .filter_map(|o| o.name().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_short_report_end_to_end() {
    let mut text = String::from(
        "Emotet campaign update. The Emotet malware was delivered through spearphishing \
         attachments and beaconed to 198.51.100.7 for instructions. ",
    );
    text.push_str(&filler(1014 - text.len()));
    assert_eq!(text.chars().count(), 1014);

    let answer = json!([
        {"type": "malware", "id": "malware-emotet", "name": "Emotet", "is_family": true},
        {"type": "indicator", "id": "indicator-1", "name": "Emotet C2",
         "pattern": "[ipv4-addr:value = '198.51.100.7']", "pattern_type": "stix"},
        {"type": "attack-pattern", "id": "attack-pattern--spearphishing",
         "name": "Spearphishing Attachment"},
        {"type": "relationship", "id": "rel-1", "relationship_type": "uses",
         "source_ref": "malware-emotet", "target_ref": "attack-pattern--spearphishing"},
        {"type": "relationship", "id": "rel-2", "relationship_type": "indicates",
         "source_ref": "indicator-1", "target_ref": "malware-emotet"}
    ]);
    let reasoner = MockReasoner::new(answer.to_string());
    let extractor = Extractor::new(Arc::new(reasoner), test_config()).unwrap();

    let result = extractor.run(&text).await.unwrap();

    assert_eq!(result.chunks.len(), 1);
    assert_eq!(result.chunks[0].status, ChunkStatus::Done);

    let node_types: BTreeSet<_> = result
        .bundle
        .nodes()
        .map(|o| o.object_type.as_str())
        .collect();
    assert_eq!(
        node_types,
        BTreeSet::from(["attack-pattern", "indicator", "malware"])
    );
    assert_eq!(result.bundle.relationships().count(), 2);
    assert!(result.report.removed_relationships.is_empty());
    assert!(result.report.id_audit.is_clean());
    for object in &result.bundle.objects {
        assert!(is_valid_id(&object.id), "invalid id {}", object.id);
    }
    assert_closure(&result.bundle);
    assert!(result.report.missing_candidates.is_empty());
}

#[tokio::test]
async fn test_long_document_chunk_count() {
    let text = filler(7000);
    let reasoner = MockReasoner::default();
    let extractor = Extractor::new(Arc::new(reasoner.clone()), test_config()).unwrap();

    let result = extractor.run(&text).await.unwrap();

    assert_eq!(result.chunks.len(), 4);
    assert!(result.chunks.iter().all(|c| c.status == ChunkStatus::Done));
    assert_eq!(reasoner.call_count(), 4);
    assert!(result.bundle.is_empty());
}

#[tokio::test]
async fn test_auth_failure_isolated_to_one_chunk() {
    let markers = ["PART-ONE", "PART-TWO", "PART-THREE", "PART-FOUR", "PART-FIVE"];
    let text = document(&markers);

    let mut reasoner = MockReasoner::default();
    for (marker, family) in markers.iter().zip(["Alpha", "Bravo", "Charlie", "Delta", "Echo"]) {
        let step = if *marker == "PART-THREE" {
            MockStep::permanent("401 Unauthorized: invalid api key")
        } else {
            MockStep::answer(malware_answer(family))
        };
        reasoner.add_script(*marker, vec![step]);
    }

    let extractor = Extractor::new(Arc::new(reasoner.clone()), test_config()).unwrap();
    let result = extractor.run(&text).await.unwrap();

    let statuses: Vec<_> = result.chunks.iter().map(|c| c.status).collect();
    assert_eq!(
        statuses,
        vec![
            ChunkStatus::Done,
            ChunkStatus::Done,
            ChunkStatus::Failed,
            ChunkStatus::Done,
            ChunkStatus::Done,
        ]
    );
    assert_eq!(reasoner.calls_for("PART-THREE"), 1);
    assert!(result.chunks[2].error.as_deref().unwrap_or_default().contains("401"));

    assert_eq!(names(&result.bundle, "malware"), vec!["Alpha", "Bravo", "Delta", "Echo"]);
    assert_eq!(result.bundle.relationships().count(), 4);
    assert_closure(&result.bundle);
    assert!(result.report.id_audit.is_clean());
    assert!(result.report.notes.iter().any(|n| n.starts_with("chunk 3 failed")));
}

#[tokio::test]
async fn test_parallel_matches_sequential() {
    let markers = ["PART-ONE", "PART-TWO", "PART-THREE", "PART-FOUR", "PART-FIVE"];
    let text = document(&markers);
    let families = ["Alpha", "Bravo", "Charlie", "Delta", "Echo"];

    let mut reasoner = MockReasoner::default();
    for (marker, family) in markers.iter().zip(families) {
        reasoner.add_script(*marker, vec![MockStep::answer(malware_answer(family))]);
    }

    let mut config = test_config();
    config.execution = ExecutionMode::Parallel;
    config.concurrency = 3;
    let extractor = Extractor::new(Arc::new(reasoner), config).unwrap();
    let result = extractor.run(&text).await.unwrap();

    let indices: Vec<_> = result.chunks.iter().map(|c| c.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    assert_eq!(names(&result.bundle, "malware"), families.to_vec());
    assert_closure(&result.bundle);
}

#[tokio::test]
async fn test_duplicates_merge_across_chunks() {
    let text = document(&["PART-ONE", "PART-TWO"]);
    let reasoner = MockReasoner::default()
        .with_script(
            "PART-ONE",
            vec![MockStep::answer(
                json!([{"type": "malware", "id": "malware--a", "name": "Emotet",
                        "is_family": true, "aliases": ["Geodo"]}])
                .to_string(),
            )],
        )
        .with_script(
            "PART-TWO",
            vec![MockStep::answer(
                json!([{"type": "malware", "id": "malware--b", "name": "emotet",
                        "aliases": ["Heodo"], "description": "banking trojan"}])
                .to_string(),
            )],
        );

    let extractor = Extractor::new(Arc::new(reasoner), test_config()).unwrap();
    let result = extractor.run(&text).await.unwrap();

    assert_eq!(result.chunks.len(), 2);
    let malware: Vec<_> = result
        .bundle
        .nodes()
        .filter(|o| o.object_type == "malware")
        .collect();
    assert_eq!(malware.len(), 1);
    assert_eq!(malware[0].name(), Some("Emotet"));
    assert_eq!(malware[0].get_str("description"), Some("banking trojan"));
    assert_eq!(
        malware[0].properties.get("aliases"),
        Some(&json!(["Geodo", "Heodo"]))
    );
    assert_eq!(result.stats.merged_duplicates, 1);
}

#[tokio::test]
async fn test_tool_loop_through_extractor() {
    let reasoner = MockReasoner::default().with_script(
        "WellMess",
        vec![
            MockStep::call("c1", SEARCH_REFERENCE_TOOL, json!({"query": "malware is_family"})),
            MockStep::call(
                "c2",
                VALIDATE_DRAFT_TOOL,
                json!({"objects": [{"type": "malware", "name": "WellMess"}]}),
            ),
            MockStep::answer(malware_answer("WellMess")),
        ],
    );

    let extractor = Extractor::new(Arc::new(reasoner.clone()), test_config())
        .unwrap()
        .with_source_name("apt29.txt");
    let result = extractor.run("APT29 deployed WellMess.").await.unwrap();

    assert_eq!(result.chunks[0].status, ChunkStatus::Done);
    assert_eq!(result.chunks[0].iterations, 3);
    assert_eq!(reasoner.calls_for("WellMess"), 3);
    assert_eq!(names(&result.bundle, "malware"), vec!["WellMess"]);
}

#[tokio::test]
async fn test_iteration_cap_uses_last_draft() {
    let reasoner = MockReasoner::default().with_script(
        "WellMess",
        vec![MockStep::call(
            "c1",
            VALIDATE_DRAFT_TOOL,
            json!({"objects": [{"type": "malware", "name": "WellMess"}]}),
        )],
    );
    let mut config = test_config();
    config.max_iterations = 2;

    let extractor = Extractor::new(Arc::new(reasoner), config).unwrap();
    let result = extractor.run("APT29 deployed WellMess.").await.unwrap();

    assert_eq!(result.chunks[0].status, ChunkStatus::Incomplete);
    assert_eq!(result.chunks[0].iterations, 2);
    assert_eq!(names(&result.bundle, "malware"), vec!["WellMess"]);
    assert!(result.report.id_audit.is_clean());
    assert!(result.report.notes.iter().any(|n| n.starts_with("chunk 1 incomplete")));
}

#[tokio::test]
async fn test_transient_failures_recover() {
    let reasoner = MockReasoner::default().with_script(
        "WellMess",
        vec![
            MockStep::transient("503 Service Unavailable"),
            MockStep::transient("429 Too Many Requests"),
            MockStep::answer(malware_answer("WellMess")),
        ],
    );

    let extractor = Extractor::new(Arc::new(reasoner.clone()), test_config()).unwrap();
    let result = extractor.run("APT29 deployed WellMess.").await.unwrap();

    assert_eq!(result.chunks[0].status, ChunkStatus::Done);
    assert_eq!(reasoner.call_count(), 3);
    assert_eq!(result.bundle.nodes().count(), 2);
}

#[tokio::test]
async fn test_invalid_chunk_settings_rejected() {
    let mut config = ExtractorConfig::default();
    config.overlap = config.chunk_size;
    let result = Extractor::new(Arc::new(MockReasoner::default()), config);
    assert!(matches!(result, Err(ExtractorError::Segmentation(_))));

    let mut config = ExtractorConfig::default();
    config.chunk_size = 0;
    config.overlap = 0;
    let result = Extractor::new(Arc::new(MockReasoner::default()), config);
    assert!(matches!(result, Err(ExtractorError::Segmentation(_))));
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let mut config = ExtractorConfig::default();
    config.max_iterations = 0;
    let result = Extractor::new(Arc::new(MockReasoner::default()), config);
    assert!(matches!(result, Err(ExtractorError::Config(_))));
}

/// Cancels the run the first time it sees a prompt containing `marker`
struct CancelOn {
    inner: MockReasoner,
    marker: &'static str,
    token: CancellationToken,
}

#[async_trait]
impl ReasoningService for CancelOn {
    async fn invoke(
        &self,
        conversation: &ConversationState,
    ) -> Result<ReasoningReply, CapabilityError> {
        let hit = conversation
            .turns()
            .iter()
            .any(|t| matches!(t, Turn::User { content } if content.contains(self.marker)));
        if hit {
            self.token.cancel();
            return Err(CapabilityError::Transient("connection reset".to_string()));
        }
        self.inner.invoke(conversation).await
    }

    fn model_id(&self) -> &str {
        "cancel-on"
    }
}

/// Never answers within any reasonable time
struct Hanging;

#[async_trait]
impl ReasoningService for Hanging {
    async fn invoke(
        &self,
        _conversation: &ConversationState,
    ) -> Result<ReasoningReply, CapabilityError> {
        tokio::time::sleep(std::time::Duration::from_secs(100)).await;
        Ok(ReasoningReply::Final("[]".to_string()))
    }

    fn model_id(&self) -> &str {
        "hanging"
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_pending_call() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let mut config = test_config();
    config.call_timeout_secs = 120;
    let extractor = Extractor::new(Arc::new(Hanging), config).unwrap();
    let started = tokio::time::Instant::now();
    let result = extractor
        .run_with_cancel("APT29 deployed WellMess.", token)
        .await;

    assert!(matches!(result, Err(ExtractorError::Cancelled)));
    assert!(started.elapsed() < std::time::Duration::from_secs(1));
}

#[tokio::test]
async fn test_cancellation_aborts_run() {
    let text = document(&["PART-ONE", "PART-TWO", "PART-THREE"]);
    let token = CancellationToken::new();
    let reasoner = CancelOn {
        inner: MockReasoner::new(malware_answer("Alpha")),
        marker: "PART-TWO",
        token: token.clone(),
    };

    let extractor = Extractor::new(Arc::new(reasoner), test_config()).unwrap();
    let result = extractor.run_with_cancel(&text, token).await;

    assert!(matches!(result, Err(ExtractorError::Cancelled)));
}

#[tokio::test]
async fn test_cancellation_with_partial_output() {
    let text = document(&["PART-ONE", "PART-TWO", "PART-THREE"]);
    let token = CancellationToken::new();
    let inner = MockReasoner::default()
        .with_script("PART-ONE", vec![MockStep::answer(malware_answer("Alpha"))])
        .with_script("PART-THREE", vec![MockStep::answer(malware_answer("Charlie"))]);
    let reasoner = CancelOn {
        inner: inner.clone(),
        marker: "PART-TWO",
        token: token.clone(),
    };

    let mut config = test_config();
    config.emit_partial_on_cancel = true;
    let extractor = Extractor::new(Arc::new(reasoner), config).unwrap();
    let result = extractor.run_with_cancel(&text, token).await.unwrap();

    let statuses: Vec<_> = result.chunks.iter().map(|c| c.status).collect();
    assert_eq!(
        statuses,
        vec![ChunkStatus::Done, ChunkStatus::Failed, ChunkStatus::Failed]
    );
    assert_eq!(inner.calls_for("PART-THREE"), 0);
    assert_eq!(names(&result.bundle, "malware"), vec!["Alpha"]);
    assert_closure(&result.bundle);
}
