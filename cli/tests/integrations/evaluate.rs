use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value as JsonValue};
use std::fs;
use tempfile::TempDir;

fn model() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("revenu.yaml"),
        r#"
revenu:
  question: Quel est votre revenu ?
  unité: €/an
taux: 10 %
impôt: revenu * taux
"#,
    )
    .unwrap();
    dir
}

#[test]
fn test_evaluate_with_situation() {
    let dir = model();

    let mut cmd = Command::cargo_bin("publicodes").unwrap();
    cmd.arg("evaluate")
        .arg(dir.path())
        .arg("impôt")
        .arg("revenu=30000 €/an");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("3000"))
        .stdout(predicate::str::contains("€/an"));
}

#[test]
fn test_evaluate_lists_missing_variables() {
    let dir = model();

    let mut cmd = Command::cargo_bin("publicodes").unwrap();
    cmd.arg("evaluate").arg(dir.path()).arg("impôt");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Missing"))
        .stdout(predicate::str::contains("revenu"));
}

#[test]
fn test_evaluate_json_output() {
    let dir = model();

    let output = Command::cargo_bin("publicodes")
        .unwrap()
        .arg("evaluate")
        .arg(dir.path())
        .arg("revenu / 12")
        .arg("revenu=24000")
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let node: JsonValue = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(node["nodeValue"], json!(2000.0));
    assert_eq!(node["unit"], json!("€/an"));
    assert_eq!(node["missingVariables"], json!({}));
}

#[test]
fn test_evaluate_raw_output() {
    let dir = model();

    let mut cmd = Command::cargo_bin("publicodes").unwrap();
    cmd.arg("evaluate")
        .arg(dir.path())
        .arg("taux * 2")
        .arg("--raw");
    cmd.assert().success().stdout("20 %\n");
}

#[test]
fn test_evaluate_unknown_rule() {
    let dir = model();

    let mut cmd = Command::cargo_bin("publicodes").unwrap();
    cmd.arg("evaluate").arg(dir.path()).arg("inconnue");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("inconnue"));
}

#[test]
fn test_evaluate_invalid_answer() {
    let dir = model();

    let mut cmd = Command::cargo_bin("publicodes").unwrap();
    cmd.arg("evaluate")
        .arg(dir.path())
        .arg("impôt")
        .arg("revenu");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("expected rule=value"));
}
