use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value as JsonValue;
use std::fs;
use tempfile::TempDir;

fn write_model(dir: &TempDir) {
    fs::write(
        dir.path().join("prix.yaml"),
        r#"
prix:
  avec:
    carottes: 2 €/kg
    champignons: 5 €/kg
"#,
    )
    .unwrap();
    fs::create_dir(dir.path().join("achats")).unwrap();
    fs::write(
        dir.path().join("achats").join("panier.yml"),
        r#"
carottes:
  question: Combien de carottes ?
  unité: kg
dépenses: prix . carottes * carottes + prix . champignons * 1 kg
"#,
    )
    .unwrap();
}

#[test]
fn test_compile_writes_folded_rules() {
    let model = TempDir::new().unwrap();
    write_model(&model);
    let output = TempDir::new().unwrap();
    let output_json = output.path().join("model.json");

    let mut cmd = Command::cargo_bin("publicodes").unwrap();
    cmd.arg("compile").arg(model.path()).arg(&output_json);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Compiled 2 files"));

    let folded: JsonValue =
        serde_json::from_str(&fs::read_to_string(&output_json).unwrap()).unwrap();
    let rules = folded.as_object().unwrap();
    assert!(rules.contains_key("dépenses"));
    assert!(rules.contains_key("carottes"));
    assert!(!rules.contains_key("prix . champignons"));
}

#[test]
fn test_compile_keeps_requested_rules() {
    let model = TempDir::new().unwrap();
    write_model(&model);
    let output = TempDir::new().unwrap();
    let output_json = output.path().join("model.json");

    let mut cmd = Command::cargo_bin("publicodes").unwrap();
    cmd.arg("compile")
        .arg(model.path())
        .arg(&output_json)
        .arg("--keep")
        .arg("prix . champignons");
    cmd.assert().success();

    let folded: JsonValue =
        serde_json::from_str(&fs::read_to_string(&output_json).unwrap()).unwrap();
    assert!(folded.as_object().unwrap().contains_key("prix . champignons"));
}

#[test]
fn test_compile_reports_every_error() {
    let model = TempDir::new().unwrap();
    fs::write(
        model.path().join("erreurs.yaml"),
        r#"
a: 1 +
b: inconnue * 2
c: 3
"#,
    )
    .unwrap();
    let output = TempDir::new().unwrap();
    let output_json = output.path().join("model.json");

    let mut cmd = Command::cargo_bin("publicodes").unwrap();
    cmd.arg("compile").arg(model.path()).arg(&output_json);
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Syntax error in rule 'a'"));
    assert!(!output_json.exists());
}

#[test]
fn test_compile_rejects_duplicate_rules() {
    let model = TempDir::new().unwrap();
    fs::write(model.path().join("a.yaml"), "taux: 10 %\n").unwrap();
    fs::write(model.path().join("b.yaml"), "taux: 20 %\n").unwrap();
    let output = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("publicodes").unwrap();
    cmd.arg("compile")
        .arg(model.path())
        .arg(output.path().join("model.json"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("rule 'taux' is defined in both"));
}

#[test]
fn test_compile_missing_directory() {
    let output = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("publicodes").unwrap();
    cmd.arg("compile")
        .arg(output.path().join("nowhere"))
        .arg(output.path().join("model.json"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
