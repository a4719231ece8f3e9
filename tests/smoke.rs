//! Smoke tests -- verify the binary runs and offline commands work.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn speedwatch() -> Command {
    let mut cmd = Command::cargo_bin("speedwatch").unwrap();
    cmd.env_remove("SPEEDWATCH_CONFIG").env("RUST_LOG", "warn");
    cmd
}

/// Config pointing the history database into `dir`.
fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("speedwatch.toml");
    let db = dir.join("history.db");
    std::fs::write(
        &path,
        format!("[storage]\ndb_path = {:?}\n", db.to_string_lossy()),
    )
    .unwrap();
    path
}

#[test]
fn test_cli_help() {
    speedwatch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Continuous network throughput"));
}

#[test]
fn test_cli_version() {
    speedwatch()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("speedwatch"));
}

#[test]
fn test_subcommands_exist() {
    for args in [
        vec!["serve", "--help"],
        vec!["speed-test", "--help"],
        vec!["watch", "--help"],
        vec!["history", "list", "--help"],
        vec!["history", "clear", "--help"],
        vec!["stats", "--help"],
    ] {
        speedwatch().args(&args).assert().success();
    }
}

#[test]
fn test_history_rejects_unknown_range() {
    speedwatch()
        .args(["history", "list", "--range", "fortnight"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("fortnight"));
}

#[test]
fn test_missing_explicit_config_fails() {
    speedwatch()
        .args(["--config", "/nonexistent/speedwatch.toml", "stats"])
        .assert()
        .failure();
}

#[test]
fn test_stats_on_empty_history() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    speedwatch()
        .arg("--config")
        .arg(&config)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("No readings recorded."));

    speedwatch()
        .arg("--config")
        .arg(&config)
        .args(["stats", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"totalTests\": 0"));
}

#[test]
fn test_history_list_and_clear_on_empty_history() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    speedwatch()
        .arg("--config")
        .arg(&config)
        .args(["history", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No readings found."));

    speedwatch()
        .arg("--config")
        .arg(&config)
        .args(["history", "list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::diff("[]\n"));

    speedwatch()
        .arg("--config")
        .arg(&config)
        .args(["history", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("History cleared."));

    assert!(dir.path().join("history.db").exists());
}
