//! File-level tests for the bundle commands.

use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use stixweave_cli::cli::{CheckArgs, FixIdsArgs, InitConfigArgs, RemapArgs};
use stixweave_cli::commands::{
    check_bundle, convert_text, execute_check, execute_fix_ids, execute_init_config,
    execute_remap, parse_bundle,
};
use stixweave_cli::config::OutputFormat;
use stixweave_cli::{CliError, Config, Formatter};
use stixweave_domain::id::is_valid_id;
use stixweave_extractor::ExtractorConfig;
use stixweave_llm::MockReasoner;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

const MALWARE_A: &str = "malware--11111111-1111-4111-8111-111111111111";
const MALWARE_B: &str = "malware--22222222-2222-4222-8222-222222222222";
const TOOL: &str = "tool--33333333-3333-4333-8333-333333333333";
const EDGE_1: &str = "relationship--44444444-4444-4444-8444-444444444444";
const EDGE_2: &str = "relationship--55555555-5555-4555-8555-555555555555";

fn formatter() -> Formatter {
    Formatter::new(OutputFormat::Quiet, false)
}

fn write_json(path: &Path, value: serde_json::Value) {
    fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
}

fn read_bundle(path: &Path) -> stixweave_domain::Bundle {
    parse_bundle(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_init_config_refuses_to_overwrite() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(".stixweave").join("config.toml");

    execute_init_config(&InitConfigArgs { force: false }, &path, &formatter()).unwrap();
    assert_eq!(Config::load(Some(&path)).unwrap(), Config::default());

    let again = execute_init_config(&InitConfigArgs { force: false }, &path, &formatter());
    assert!(matches!(again, Err(CliError::Config(_))));

    execute_init_config(&InitConfigArgs { force: true }, &path, &formatter()).unwrap();
}

#[test]
fn test_fix_ids_repairs_bundle() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.json");
    let output = dir.path().join("out").join("fixed.json");
    write_json(
        &input,
        json!({"type": "bundle", "id": "bundle-1", "objects": [
            {"type": "malware", "id": "malware-emotet", "name": "Emotet"},
            {"type": "tool", "id": "tool-1", "name": "Mimikatz"},
            {"type": "tool", "id": "tool-1", "name": "PsExec"},
            {"type": "relationship", "id": "rel-1", "relationship_type": "uses",
             "source_ref": "malware-emotet", "target_ref": "tool-1"}
        ]}),
    );

    execute_fix_ids(
        FixIdsArgs {
            input: input.to_string_lossy().into_owned(),
            output: Some(output.clone()),
        },
        &formatter(),
    )
    .unwrap();

    let fixed = read_bundle(&output);
    assert!(is_valid_id(&fixed.id));
    let ids: Vec<_> = fixed.objects.iter().map(|o| o.id.clone()).collect();
    assert!(ids.iter().all(|id| is_valid_id(id)));
    assert_ne!(ids[1], ids[2]);

    let edge = &fixed.objects[3];
    assert_eq!(edge.source_ref(), Some(ids[0].as_str()));
    assert_eq!(edge.target_ref(), Some(ids[1].as_str()));
    assert!(check_bundle(&fixed, None).is_clean());
}

#[test]
fn test_remap_rewrites_and_removes() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.json");
    let output = dir.path().join("remapped.json");
    write_json(
        &input,
        json!([
            {"type": "malware", "id": MALWARE_A, "name": "Emotet"},
            {"type": "malware", "id": MALWARE_B, "name": "TrickBot"},
            {"type": "tool", "id": TOOL, "name": "Cobalt Strike"},
            {"type": "relationship", "id": EDGE_1, "relationship_type": "uses",
             "source_ref": MALWARE_A, "target_ref": MALWARE_B},
            {"type": "relationship", "id": EDGE_2, "relationship_type": "targets",
             "source_ref": TOOL, "target_ref": MALWARE_A}
        ]),
    );

    execute_remap(
        RemapArgs {
            input: Some(input.to_string_lossy().into_owned()),
            output: Some(output.clone()),
            drop_unknown: false,
            show_table: false,
        },
        &formatter(),
    )
    .unwrap();

    let remapped = read_bundle(&output);
    let edges: Vec<_> = remapped.relationships().collect();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].id, EDGE_1);
    assert_eq!(edges[0].relationship_type(), Some("downloads"));
}

#[test]
fn test_remap_requires_input() {
    let result = execute_remap(
        RemapArgs {
            input: None,
            output: None,
            drop_unknown: false,
            show_table: false,
        },
        &formatter(),
    );
    assert!(matches!(result, Err(CliError::InvalidInput(_))));
}

#[test]
fn test_check_reports_invalid_ids() {
    let dir = tempdir().unwrap();
    let clean = dir.path().join("clean.json");
    let broken = dir.path().join("broken.json");
    write_json(
        &clean,
        json!([{"type": "malware", "id": MALWARE_A, "name": "Emotet"}]),
    );
    write_json(
        &broken,
        json!([
            {"type": "malware", "id": "malware-emotet", "name": "Emotet"},
            {"type": "relationship", "id": EDGE_1, "relationship_type": "uses",
             "source_ref": "malware-emotet", "target_ref": TOOL}
        ]),
    );

    let check = |path: &Path| {
        execute_check(
            CheckArgs {
                input: path.to_string_lossy().into_owned(),
                source: None,
            },
            &formatter(),
        )
        .unwrap()
    };
    assert!(check(&clean));
    assert!(!check(&broken));
}

#[tokio::test]
async fn test_convert_text_with_mock_reasoner() {
    let reasoner = MockReasoner::new(
        json!([
            {"type": "threat-actor", "id": "ta-1", "name": "APT29"},
            {"type": "malware", "id": "m-1", "name": "WellMess"},
            {"type": "relationship", "id": "r-1", "relationship_type": "uses",
             "source_ref": "ta-1", "target_ref": "m-1"}
        ])
        .to_string(),
    );

    let result = convert_text(
        "APT29 deployed WellMess against research institutions.",
        Some("apt29.txt".to_string()),
        Arc::new(reasoner),
        ExtractorConfig::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(result.bundle.objects.len(), 3);
    assert!(check_bundle(&result.bundle, None).is_clean());
}
