use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn init_writes_a_loadable_sample_config() {
    let dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("botiga")
        .unwrap()
        .current_dir(dir.path())
        .args(["init"])
        .assert()
        .success()
        .stderr(predicate::str::contains("created botiga.yaml"));

    let cfg = botiga_core::config::load_config(&dir.path().join("botiga.yaml")).unwrap();
    assert_eq!(cfg.language, "Catalan");

    // Second run leaves the existing file alone.
    Command::cargo_bin("botiga")
        .unwrap()
        .current_dir(dir.path())
        .args(["init"])
        .assert()
        .success()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn version_prints_the_package_version() {
    Command::cargo_bin("botiga")
        .unwrap()
        .args(["version"])
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn analyze_without_judgements_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("botiga")
        .unwrap()
        .current_dir(dir.path())
        .args(["init"])
        .assert()
        .success();

    Command::cargo_bin("botiga")
        .unwrap()
        .current_dir(dir.path())
        .args(["analyze"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("no judgements found"));
}
