#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SPEC: &str = r#"
metadata:
  name: payments
  version: "1"
model:
  account:
    id: string
instructions: Build the ledger before the API.
sections:
  - id: intro
    title: Intro
    content: The system must refuse overdrafts.
architecture:
  modules:
    - name: ledger
    - name: api
      depends_on: [ledger]
"#;

fn specc(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("specc").unwrap();
    cmd.current_dir(dir.path())
        .env("SPECC_CONFIG", dir.path().join("specc.yaml"));
    cmd
}

fn write_spec(dir: &TempDir, name: &str, body: &str) {
    std::fs::write(dir.path().join(name), body).unwrap();
}

fn compile(dir: &TempDir) -> assert_cmd::assert::Assert {
    specc(dir).args(["compile", "spec.yaml"]).assert()
}

// ---------------------------------------------------------------------------
// specc compile
// ---------------------------------------------------------------------------

#[test]
fn compile_writes_manifest_and_reports() {
    let dir = TempDir::new().unwrap();
    write_spec(&dir, "spec.yaml", SPEC);
    compile(&dir).success().stdout(predicate::str::contains("state:"));

    let out = dir.path().join("specc-out");
    for file in [
        "manifest.json",
        "completeness.json",
        "sufficiency.json",
        "equivalence.json",
        "conversion.json",
        "governance.json",
        "evidence.json",
    ] {
        assert!(out.join(file).exists(), "{file} missing");
    }
    assert!(!out.join("refusal.json").exists());

    let manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("manifest.json")).unwrap()).unwrap();
    assert_eq!(manifest["namespace"], "payments");
    assert!(!manifest["items"].as_array().unwrap().is_empty());
}

#[test]
fn compile_is_byte_identical_across_runs() {
    let dir = TempDir::new().unwrap();
    write_spec(&dir, "spec.yaml", SPEC);
    compile(&dir).success();
    let first = std::fs::read(dir.path().join("specc-out/manifest.json")).unwrap();
    compile(&dir).success();
    let second = std::fs::read(dir.path().join("specc-out/manifest.json")).unwrap();
    assert_eq!(first, second);

    let drift = std::fs::read_to_string(dir.path().join("specc-out/drift.json")).unwrap();
    let drift: serde_json::Value = serde_json::from_str(&drift).unwrap();
    assert_eq!(drift["added"], serde_json::json!([]));
    assert_eq!(drift["evidence_changed"], false);
}

#[test]
fn yaml_and_json_specs_produce_the_same_manifest() {
    let dir = TempDir::new().unwrap();
    write_spec(&dir, "spec.yaml", SPEC);
    let value: serde_yaml::Value = serde_yaml::from_str(SPEC).unwrap();
    write_spec(&dir, "spec.json", &serde_json::to_string(&value).unwrap());

    specc(&dir)
        .args(["compile", "spec.yaml", "--out", "a"])
        .assert()
        .success();
    specc(&dir)
        .args(["compile", "spec.json", "--out", "b"])
        .assert()
        .success();
    let a = std::fs::read(dir.path().join("a/manifest.json")).unwrap();
    let b = std::fs::read(dir.path().join("b/manifest.json")).unwrap();
    assert_eq!(a, b);
}

#[test]
fn structural_violation_writes_refusal_and_fails() {
    let dir = TempDir::new().unwrap();
    write_spec(&dir, "spec.yaml", "sections: not-a-list\n");
    compile(&dir)
        .failure()
        .stderr(predicate::str::contains("refused"));

    let out = dir.path().join("specc-out");
    assert!(out.join("refusal.json").exists());
    assert!(!out.join("manifest.json").exists());
}

#[test]
fn unreadable_spec_writes_error_json() {
    let dir = TempDir::new().unwrap();
    write_spec(&dir, "spec.yaml", "a: [1, 2\n");
    compile(&dir)
        .failure()
        .stderr(predicate::str::contains("failed to read spec"));

    let err = std::fs::read_to_string(dir.path().join("specc-out/error.json")).unwrap();
    let err: serde_json::Value = serde_json::from_str(&err).unwrap();
    assert!(err["error"].as_str().unwrap().contains("spec.yaml"));
}

#[test]
fn missing_instructions_is_not_ready() {
    let dir = TempDir::new().unwrap();
    write_spec(
        &dir,
        "spec.yaml",
        "metadata:\n  name: pay\n  version: '1'\nmodel:\n  a: 1\nsections:\n  - id: s\n    title: S\n    content: text\n",
    );
    specc(&dir)
        .args(["--json", "compile", "spec.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("missing_instructions"))
        .stdout(predicate::str::contains("\"state\": \"READY\"").not());
}

#[test]
fn emit_writes_one_file_per_item() {
    let dir = TempDir::new().unwrap();
    write_spec(&dir, "spec.yaml", SPEC);
    specc(&dir)
        .args(["compile", "spec.yaml", "--emit"])
        .assert()
        .success();

    let manifest: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("specc-out/manifest.json")).unwrap(),
    )
    .unwrap();
    let emitted = std::fs::read_dir(dir.path().join("specc-out/checklist"))
        .unwrap()
        .count();
    assert_eq!(emitted, manifest["items"].as_array().unwrap().len());
}

#[test]
fn veto_without_capability_is_rejected_not_fatal() {
    let dir = TempDir::new().unwrap();
    write_spec(&dir, "spec.yaml", SPEC);
    compile(&dir).success();
    let manifest: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("specc-out/manifest.json")).unwrap(),
    )
    .unwrap();
    let item = manifest["items"][0]["id"].as_str().unwrap().to_string();

    let reviews = format!(
        "personas:\n  - name: reader\n    role: observer\n    allowed_actions: [observe, veto]\nrequests:\n  - persona: reader\n    phase: review\n    item: {item}\n    action: veto\n    code: NOPE\n    explanation: no\n"
    );
    write_spec(&dir, "reviews.yaml", &reviews);
    specc(&dir)
        .args(["compile", "spec.yaml", "--reviews", "reviews.yaml"])
        .assert()
        .success();

    let ledger: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("specc-out/governance.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(ledger["vetoes"], serde_json::json!([]));
    assert_eq!(ledger["rejected"].as_array().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// specc state / items / drift
// ---------------------------------------------------------------------------

#[test]
fn state_reads_last_run() {
    let dir = TempDir::new().unwrap();
    write_spec(&dir, "spec.yaml", SPEC);
    compile(&dir).success();
    specc(&dir)
        .arg("state")
        .assert()
        .success()
        .stdout(predicate::str::contains("state:"));
}

#[test]
fn state_without_output_fails() {
    let dir = TempDir::new().unwrap();
    specc(&dir)
        .arg("state")
        .assert()
        .failure()
        .stderr(predicate::str::contains("run `specc compile` first"));
}

#[test]
fn state_after_refusal_reads_refusal() {
    let dir = TempDir::new().unwrap();
    write_spec(&dir, "spec.yaml", "sections: 3\n");
    compile(&dir).failure();
    specc(&dir)
        .args(["state", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("schema_violation:/sections"));
}

#[test]
fn items_lists_in_execution_order() {
    let dir = TempDir::new().unwrap();
    write_spec(&dir, "spec.yaml", SPEC);
    compile(&dir).success();

    let output = specc(&dir).args(["items", "--json"]).output().unwrap();
    assert!(output.status.success());
    let items: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    let orders: Vec<u64> = items
        .iter()
        .filter_map(|i| i["execution_order"].as_u64())
        .collect();
    let mut sorted = orders.clone();
    sorted.sort();
    assert_eq!(orders, sorted);

    specc(&dir)
        .args(["items"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SEVERITY"));
}

#[test]
fn items_rejects_unknown_status() {
    let dir = TempDir::new().unwrap();
    write_spec(&dir, "spec.yaml", SPEC);
    compile(&dir).success();
    specc(&dir)
        .args(["items", "--status", "sleeping"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid --status"));
}

#[test]
fn drift_reports_added_items() {
    let dir = TempDir::new().unwrap();
    write_spec(&dir, "spec.yaml", SPEC);
    specc(&dir)
        .args(["compile", "spec.yaml", "--out", "before"])
        .assert()
        .success();
    let grown = SPEC.replace("    - name: ledger\n", "    - name: ledger\n    - name: audit\n");
    write_spec(&dir, "spec.yaml", &grown);
    specc(&dir)
        .args(["compile", "spec.yaml", "--out", "after"])
        .assert()
        .success();

    specc(&dir)
        .args(["drift", "before", "after"])
        .assert()
        .success()
        .stdout(predicate::str::contains("+ "));
    specc(&dir)
        .args(["drift", "before", "before/manifest.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No drift"));
}

// ---------------------------------------------------------------------------
// specc config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_defaults_is_clean() {
    let dir = TempDir::new().unwrap();
    specc(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("specc.yaml"), "sufficiency_threshold: 1.5\n").unwrap();
    specc(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"));
}

#[test]
fn config_init_then_show() {
    let dir = TempDir::new().unwrap();
    specc(&dir).args(["config", "init"]).assert().success();
    assert!(dir.path().join("specc.yaml").exists());
    specc(&dir)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    specc(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sufficiency_threshold"));
}

#[test]
fn unusable_config_fails_compile() {
    let dir = TempDir::new().unwrap();
    write_spec(&dir, "spec.yaml", SPEC);
    std::fs::write(dir.path().join("specc.yaml"), "sufficiency_threshold: -1\n").unwrap();
    compile(&dir).failure();
    assert!(dir.path().join("specc-out/error.json").exists());
}
