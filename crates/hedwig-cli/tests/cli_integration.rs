// SPDX-License-Identifier: MIT OR Apache-2.0
//! Integration tests for the `hedwig` CLI binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn hedwig() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("hedwig").expect("binary `hedwig` should be built")
}

// ── Help & version ──────────────────────────────────────────────────

#[test]
fn help_exits_zero_and_contains_expected_text() {
    hedwig()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("requeue-dead-letter"))
        .stdout(predicate::str::contains("schema"));
}

#[test]
fn version_shows_version_string() {
    hedwig()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

// ── config-check ──────────────────────────────────────────────────

#[test]
fn config_check_with_no_file_reports_missing_schema_root() {
    // The built-in default validator format is JsonSchema, which requires a
    // schema_root; the default config leaves it unset.
    hedwig()
        .arg("config-check")
        .assert()
        .failure()
        .stdout(predicate::str::contains("schema_root"));
}

#[test]
fn config_check_accepts_a_complete_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hedwig.toml");
    std::fs::write(
        &path,
        r#"
            backend = "mock"
            queue = "trips"
            publisher = "trip-service"

            [validator]
            format = "json_schema"
            schema_root = "https://hedwig.example/schema.json"
        "#,
    )
    .unwrap();

    hedwig()
        .args(["--config", path.to_str().unwrap(), "config-check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config: ok"));
}

#[test]
fn config_check_rejects_malformed_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hedwig.toml");
    std::fs::write(&path, "not valid [toml =").unwrap();

    hedwig()
        .args(["--config", path.to_str().unwrap(), "config-check"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("error:"));
}

// ── schema ──────────────────────────────────────────────────────────

#[test]
fn schema_config_prints_valid_json() {
    let output = hedwig().args(["schema", "config"]).output().expect("run hedwig schema config");
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON schema");
    assert!(parsed.get("properties").is_some());
}

#[test]
fn schema_message_prints_valid_json() {
    let output = hedwig().args(["schema", "message"]).output().expect("run hedwig schema message");
    assert!(output.status.success());
    let _: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON schema");
}

// ── validate / inspect ───────────────────────────────────────────────

fn sample_message_file(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("message.json");
    std::fs::write(
        &path,
        r#"{
            "id": "11111111-1111-1111-1111-111111111111",
            "message_type": "trip_created",
            "version": {"major": 1, "minor": 0},
            "timestamp": 1700000000000,
            "publisher": "trip-service",
            "headers": {},
            "data": {"trip_id": "abc"}
        }"#,
    )
    .unwrap();
    path
}

#[test]
fn validate_accepts_well_formed_message() {
    let dir = tempfile::tempdir().unwrap();
    let path = sample_message_file(dir.path());
    hedwig()
        .args(["validate", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("trip_created"));
}

#[test]
fn validate_rejects_message_with_zero_major_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(
        &path,
        r#"{"id":"1","message_type":"t","version":{"major":0,"minor":0},"timestamp":1,"publisher":"p","headers":{},"data":{}}"#,
    )
    .unwrap();

    hedwig().args(["validate", path.to_str().unwrap()]).assert().failure();
}

#[test]
fn inspect_prints_text_summary() {
    let dir = tempfile::tempdir().unwrap();
    let path = sample_message_file(dir.path());
    hedwig()
        .args(["inspect", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("trip_created"))
        .stdout(predicate::str::contains("trip-service"));
}

#[test]
fn inspect_supports_json_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = sample_message_file(dir.path());
    let output = hedwig()
        .args(["inspect", path.to_str().unwrap(), "--format", "json"])
        .output()
        .expect("run hedwig inspect");
    assert!(output.status.success());
    let _: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
}

// ── requeue-dead-letter ──────────────────────────────────────────────

#[test]
fn requeue_dead_letter_rejects_mock_backend() {
    hedwig()
        .args(["requeue-dead-letter"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mock backend"));
}

// ── Unknown subcommand ──────────────────────────────────────────────

#[test]
fn unknown_subcommand_fails_with_helpful_error() {
    hedwig().arg("nonexistent").assert().failure();
}
