use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_list_rules_with_titles() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("modèle.publicodes"),
        r#"
salaire:
  titre: Salaire brut
  question: Quel est votre salaire ?
  unité: €/mois
net: salaire * 78 %
"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("publicodes").unwrap();
    cmd.arg("list").arg(dir.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("salaire ?"))
        .stdout(predicate::str::contains("Salaire brut"))
        .stdout(predicate::str::contains("€/mois"))
        .stdout(predicate::str::contains("net"));
}

#[test]
fn test_list_ignores_other_files() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("règles.yaml"), "a: 1\n").unwrap();
    fs::write(dir.path().join("README.md"), "# not rules\n").unwrap();

    let mut cmd = Command::cargo_bin("publicodes").unwrap();
    cmd.arg("list").arg(dir.path());
    cmd.assert().success().stdout(predicate::str::contains("a"));
}
