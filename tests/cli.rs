use std::fs;
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

const COUNTER_MODEL: &str = r#"{
  "classes": [
    {
      "name": "p/Test",
      "source_file": "p/Test.java",
      "fields": [
        {"name": "lock", "is_final": true},
        {"name": "counter", "is_static": true}
      ]
    }
  ],
  "procedures": [
    {
      "class": "p/Test",
      "name": "increment",
      "descriptor": "()V",
      "line": 7,
      "instructions": [
        {"line": 8, "kind": {"op": "field_read", "field": {"class": "p/Test", "name": "lock"}, "receiver": 1}},
        {"line": 8, "kind": {"op": "monitor_enter", "lock": 2}},
        {"line": 9, "kind": {"op": "field_write", "field": {"class": "p/Test", "name": "counter"}}},
        {"line": 10, "kind": {"op": "monitor_exit", "lock": 2}}
      ]
    }
  ],
  "points_to": {
    "locals": [
      {"procedure": 0, "value": 1, "instances": [1]},
      {"procedure": 0, "value": 2, "instances": [2]}
    ]
  }
}"#;

fn lockscope() -> String {
    std::env::var("CARGO_BIN_EXE_lockscope").unwrap_or_else(|_| {
        let mut path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("target");
        path.push("debug");
        path.push("lockscope");
        if cfg!(windows) {
            path.set_extension("exe");
        }
        path.to_string_lossy().to_string()
    })
}

fn run_on(model: &str) -> (std::process::Output, Option<Value>) {
    let temp_dir = TempDir::new().expect("temp dir");
    let input = temp_dir.path().join("model.json");
    let output_path = temp_dir.path().join("report.sarif");
    fs::write(&input, model).expect("write model");

    let output = Command::new(lockscope())
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&output_path)
        .arg("--quiet")
        .env_remove("OTEL_EXPORTER_OTLP_ENDPOINT")
        .output()
        .expect("run lockscope");
    let sarif = fs::read_to_string(&output_path)
        .ok()
        .map(|text| serde_json::from_str(&text).expect("parse SARIF"));
    (output, sarif)
}

#[test]
fn reports_instance_lock_guarding_static_counter() {
    let (output, sarif) = run_on(COUNTER_MODEL);

    assert!(output.status.success(), "{:?}", output);
    let sarif = sarif.expect("SARIF written");
    let results = sarif["runs"][0]["results"]
        .as_array()
        .expect("results array");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["ruleId"], "LCK06J");
    assert_eq!(
        results[0]["properties"]["lockscope.staticFields"],
        serde_json::json!(["p.Test.counter"])
    );
    assert_eq!(
        results[0]["locations"][0]["physicalLocation"]["artifactLocation"]["uri"],
        "p/Test.java"
    );
    assert_eq!(
        results[0]["locations"][0]["physicalLocation"]["region"]["startLine"],
        8
    );
    assert_eq!(
        sarif["runs"][0]["invocations"][0]["properties"]["lockscope.finding_count"],
        1
    );
}

#[test]
fn empty_model_produces_empty_report() {
    let (output, sarif) = run_on("{}");

    assert!(output.status.success(), "{:?}", output);
    let sarif = sarif.expect("SARIF written");
    assert_eq!(sarif["version"], "2.1.0");
    assert!(
        sarif["runs"][0]["results"]
            .as_array()
            .expect("results array")
            .is_empty()
    );
}

#[test]
fn invalid_model_fails_with_schema_error() {
    let (output, _) = run_on(r#"{"classes": [{"fields": []}]}"#);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("schema"), "{stderr}");
}

#[test]
fn exhausted_solver_budget_fails_the_run() {
    let temp_dir = TempDir::new().expect("temp dir");
    let input = temp_dir.path().join("model.json");
    fs::write(&input, COUNTER_MODEL).expect("write model");

    let output = Command::new(lockscope())
        .arg("--input")
        .arg(&input)
        .arg("--solver-step-limit")
        .arg("0")
        .arg("--quiet")
        .env_remove("OTEL_EXPORTER_OTLP_ENDPOINT")
        .output()
        .expect("run lockscope");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("stopped after"), "{stderr}");
}
