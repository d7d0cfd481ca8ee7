//! Integration tests for the `config` command family.
//!
//! Each test points `WIMFORGE_CONFIG` at its own temp file, so tests run
//! in parallel without touching `~/.wimforge/config.yaml`.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

fn wimforge(config_path: &std::path::Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("wimforge"));
    cmd.env("NO_COLOR", "1");
    cmd.env("WIMFORGE_CONFIG", config_path);
    cmd.env("WIMFORGE_YES", "1");
    cmd
}

fn sandbox() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().expect("create sandbox");
    let path = dir.path().join("config.yaml");
    (dir, path)
}

// --- show / path ---

#[test]
fn test_config_show_renders_defaults_without_a_file() {
    let (_dir, config) = sandbox();
    wimforge(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("powershell.default_version"))
        .stdout(predicate::str::contains("7.5.1"))
        .stdout(predicate::str::contains("(none pinned)"));
}

#[test]
fn test_config_path_prints_the_override() {
    let (_dir, config) = sandbox();
    wimforge(&config)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.yaml"));
}

#[test]
fn test_config_show_json_round_trips() {
    let (_dir, config) = sandbox();
    let output = wimforge(&config)
        .args(["config", "show", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let body: serde_json::Value =
        serde_json::from_slice(&output).expect("config show --json emits valid JSON");
    assert_eq!(body["config"]["powershell"]["default_version"], "7.5.1");
}

// --- set ---

#[test]
fn test_config_set_then_show_round_trips() {
    let (_dir, config) = sandbox();
    wimforge(&config)
        .args(["config", "set", "powershell.default_version", "7.4.6"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Set powershell.default_version = 7.4.6",
        ));

    wimforge(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("7.4.6"));
}

#[test]
fn test_config_set_hash_is_lowercased_and_previewed() {
    let (_dir, config) = sandbox();
    let hash = "AB".repeat(32);
    wimforge(&config)
        .args(["config", "set", "powershell.hash.7.5.1", &hash])
        .assert()
        .success();

    // The show view previews the first 12 hex chars, lowercased.
    wimforge(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("powershell.hash.7.5.1"))
        .stdout(predicate::str::contains("abababababab"));
}

#[test]
fn test_config_set_iso_label() {
    let (_dir, config) = sandbox();
    wimforge(&config)
        .args(["config", "set", "iso.label", "RESCUE_PE"])
        .assert()
        .success();

    wimforge(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("RESCUE_PE"));
}

// --- validation ---

#[test]
fn test_config_set_unknown_key_rejected() {
    let (_dir, config) = sandbox();
    wimforge(&config)
        .args(["config", "set", "unknown.key", "value"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown setting"));
}

#[test]
fn test_config_set_invalid_version_rejected() {
    let (_dir, config) = sandbox();
    wimforge(&config)
        .args(["config", "set", "powershell.default_version", "latest"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid value"));
}

#[test]
fn test_config_set_short_hash_rejected() {
    let (_dir, config) = sandbox();
    wimforge(&config)
        .args(["config", "set", "powershell.hash.7.5.1", "abc123"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SHA-256"));
}

#[test]
fn test_config_set_hash_for_unparseable_version_rejected() {
    let (_dir, config) = sandbox();
    wimforge(&config)
        .args(["config", "set", "powershell.hash.banana", &"ab".repeat(32)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown setting"));
}

#[test]
fn test_config_set_bad_label_rejected() {
    let (_dir, config) = sandbox();
    wimforge(&config)
        .args(["config", "set", "iso.label", "has spaces"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid value"));
}

// --- corrupt file handling ---

#[test]
fn test_malformed_config_file_is_a_startup_error() {
    let (_dir, config) = sandbox();
    std::fs::write(&config, "timeouts: [this is not a mapping").expect("write corrupt config");
    wimforge(&config)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading configuration"));
}
