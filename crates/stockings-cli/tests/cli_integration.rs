//! CLI Integration Tests
//!
//! These tests verify the CLI commands work correctly end-to-end.
//! They test the "wiring" between the CLI and the core library.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

/// Create a CLI command with a temporary data directory
fn cli_cmd(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("stockings").expect("Failed to find stockings binary");
    cmd.arg("--data-dir").arg(data_dir.path());
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Create a directory `name` with one file in it
fn source_dir(root: &TempDir, name: &str, body: &str) -> PathBuf {
    let dir = root.path().join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("content.txt"), body).unwrap();
    dir
}

fn init(data_dir: &TempDir) {
    cli_cmd(data_dir).arg("init").assert().success();
}

// ============================================================================
// Init Command Tests
// ============================================================================

#[test]
fn test_init_creates_identity_files() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created identity 'id'"))
        .stdout(predicate::str::contains("Fingerprint:"));

    let ids = data_dir.path().join("ids");
    assert!(ids.join("id.pub").exists());
    assert!(ids.join("id.key").exists());
    assert!(ids.join("id.pass").exists());
}

#[test]
fn test_init_is_idempotent() {
    let data_dir = TempDir::new().unwrap();
    init(&data_dir);
    let public_key = std::fs::read(data_dir.path().join("ids/id.pub")).unwrap();

    cli_cmd(&data_dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
    assert_eq!(
        std::fs::read(data_dir.path().join("ids/id.pub")).unwrap(),
        public_key
    );
}

#[test]
fn test_init_named_identity() {
    let data_dir = TempDir::new().unwrap();
    cli_cmd(&data_dir)
        .args(["init", "--id", "work"])
        .assert()
        .success();
    assert!(data_dir.path().join("ids/work.pub").exists());
}

// ============================================================================
// Archive Command Tests
// ============================================================================

#[test]
fn test_add_list_get_version() {
    let data_dir = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    init(&data_dir);
    let dir = source_dir(&src, "photos", "cat");

    cli_cmd(&data_dir)
        .arg("add")
        .arg(&dir)
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("Added archive 'photos' at version 1"));

    cli_cmd(&data_dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("photos"));

    cli_cmd(&data_dir)
        .args(["get-version", "photos"])
        .assert()
        .success()
        .stdout("1\n");

    let extracted = data_dir.path().join("archives/photos/content.txt");
    assert_eq!(std::fs::read_to_string(extracted).unwrap(), "cat");
}

#[test]
fn test_add_with_trailing_slash_uses_basename() {
    let data_dir = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    init(&data_dir);
    let dir = source_dir(&src, "docs", "text");

    cli_cmd(&data_dir)
        .arg("add")
        .arg(format!("{}/", dir.display()))
        .arg("2.1")
        .assert()
        .success();

    cli_cmd(&data_dir)
        .args(["get-version", "docs"])
        .assert()
        .success()
        .stdout("2.1\n");
}

#[test]
fn test_add_without_identity_fails() {
    let data_dir = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let dir = source_dir(&src, "photos", "cat");

    cli_cmd(&data_dir)
        .arg("add")
        .arg(&dir)
        .arg("1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("stockings init"));
}

#[test]
fn test_add_under_other_identity_is_refused() {
    let data_dir = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    init(&data_dir);
    cli_cmd(&data_dir)
        .args(["init", "--id", "other"])
        .assert()
        .success();
    let dir = source_dir(&src, "photos", "cat");

    cli_cmd(&data_dir).arg("add").arg(&dir).arg("1").assert().success();
    cli_cmd(&data_dir)
        .arg("add")
        .arg(&dir)
        .arg("2")
        .args(["--id", "other"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pinned to another publisher"));
}

#[test]
fn test_remove_then_get_version_fails() {
    let data_dir = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    init(&data_dir);
    let dir = source_dir(&src, "photos", "cat");
    cli_cmd(&data_dir).arg("add").arg(&dir).arg("1").assert().success();

    cli_cmd(&data_dir)
        .args(["remove", "photos"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed archive 'photos'"));

    cli_cmd(&data_dir)
        .args(["get-version", "photos"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Archive not found"));

    cli_cmd(&data_dir)
        .arg("list")
        .assert()
        .success()
        .stdout("")
        .stderr(predicate::str::contains("No archives."));
    assert!(!data_dir.path().join("archives/photos").exists());
}

#[test]
fn test_remove_unknown_archive_fails() {
    let data_dir = TempDir::new().unwrap();
    cli_cmd(&data_dir)
        .args(["remove", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Archive not found: ghost"));
}

#[test]
fn test_list_empty_prints_no_names() {
    let data_dir = TempDir::new().unwrap();
    cli_cmd(&data_dir)
        .arg("list")
        .assert()
        .success()
        .stdout("")
        .stderr(predicate::str::contains("No archives."));
}

#[test]
fn test_invalid_version_rejected() {
    let data_dir = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    init(&data_dir);
    let dir = source_dir(&src, "photos", "cat");

    cli_cmd(&data_dir)
        .arg("add")
        .arg(&dir)
        .arg("1 beta")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid version"));
}

#[test]
fn test_run_requires_identity() {
    let data_dir = TempDir::new().unwrap();
    cli_cmd(&data_dir)
        .args(["run", "--broker", "ws://127.0.0.1:9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Identity not found"));
}

#[test]
fn test_help_lists_commands() {
    let data_dir = TempDir::new().unwrap();
    cli_cmd(&data_dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("get-version"))
        .stdout(predicate::str::contains("remove"));
}
