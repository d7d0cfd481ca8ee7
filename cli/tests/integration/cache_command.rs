//! Integration tests for the `cache` command family.
//!
//! Each test gets its own config file and cache directory, populated with
//! fake archives, so no test downloads anything.

#![allow(clippy::expect_used)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use sha2::{Digest, Sha256};

struct CacheSandbox {
    _dir: tempfile::TempDir,
    config: PathBuf,
    cache_dir: PathBuf,
}

fn sandbox() -> CacheSandbox {
    let dir = tempfile::tempdir().expect("create sandbox");
    let cache_dir = dir.path().join("cache");
    std::fs::create_dir_all(&cache_dir).expect("create cache dir");
    let config = dir.path().join("config.yaml");
    write_config(&config, &cache_dir, &[]);
    CacheSandbox {
        _dir: dir,
        config,
        cache_dir,
    }
}

fn write_config(config: &Path, cache_dir: &Path, pinned: &[(&str, &str)]) {
    let mut content = format!("cache_dir: {}\n", cache_dir.display());
    if !pinned.is_empty() {
        content.push_str("powershell:\n  hashes:\n");
        for (version, hash) in pinned {
            content.push_str(&format!("    \"{version}\": \"{hash}\"\n"));
        }
    }
    std::fs::write(config, content).expect("write sandbox config");
}

/// Drop a fake archive into the cache and return its real hash.
fn seed_archive(cache_dir: &Path, version: &str, contents: &[u8]) -> String {
    let path = cache_dir.join(format!("PowerShell-{version}-win-x64.zip"));
    std::fs::write(&path, contents).expect("seed cache archive");
    let mut hasher = Sha256::new();
    hasher.update(contents);
    format!("{:x}", hasher.finalize())
}

fn wimforge(sandbox: &CacheSandbox) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("wimforge"));
    cmd.env("NO_COLOR", "1");
    cmd.env("WIMFORGE_CONFIG", &sandbox.config);
    cmd.env("WIMFORGE_YES", "1");
    cmd
}

// --- status ---

#[test]
fn test_status_on_empty_cache() {
    let sb = sandbox();
    wimforge(&sb)
        .args(["cache", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cache is empty"));
}

#[test]
fn test_status_lists_seeded_archive() {
    let sb = sandbox();
    let hash = seed_archive(&sb.cache_dir, "7.5.1", b"fake archive bytes");
    write_config(&sb.config, &sb.cache_dir, &[("7.5.1", &hash)]);

    wimforge(&sb)
        .args(["cache", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PowerShell 7.5.1"))
        .stdout(predicate::str::contains(&hash[..12]));
}

#[test]
fn test_status_json_reports_entry_state() {
    let sb = sandbox();
    let hash = seed_archive(&sb.cache_dir, "7.5.1", b"fake archive bytes");
    write_config(&sb.config, &sb.cache_dir, &[("7.5.1", &hash)]);

    let output = wimforge(&sb)
        .args(["cache", "status", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let body: serde_json::Value =
        serde_json::from_slice(&output).expect("cache status --json emits valid JSON");
    let entries = body["entries"].as_array().expect("entries array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["version"], "7.5.1");
    assert_eq!(entries[0]["state"], "verified");
    assert_eq!(entries[0]["sha256"], hash);
}

#[test]
fn test_status_marks_unpinned_versions() {
    let sb = sandbox();
    seed_archive(&sb.cache_dir, "7.4.0", b"no hash pinned for this one");

    let output = wimforge(&sb)
        .args(["cache", "status", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let body: serde_json::Value =
        serde_json::from_slice(&output).expect("valid JSON");
    assert_eq!(body["entries"][0]["state"], "unpinned");
}

// --- verify ---

#[test]
fn test_verify_keeps_matching_archive() {
    let sb = sandbox();
    let hash = seed_archive(&sb.cache_dir, "7.5.1", b"good bytes");
    write_config(&sb.config, &sb.cache_dir, &[("7.5.1", &hash)]);

    wimforge(&sb)
        .args(["cache", "verify"])
        .assert()
        .success()
        .stdout(predicate::str::contains("verified"));
    assert!(
        sb.cache_dir
            .join("PowerShell-7.5.1-win-x64.zip")
            .exists()
    );
}

#[test]
fn test_verify_evicts_corrupt_archive() {
    let sb = sandbox();
    seed_archive(&sb.cache_dir, "7.5.1", b"tampered bytes");
    // Pin a hash that cannot match the seeded contents.
    write_config(&sb.config, &sb.cache_dir, &[("7.5.1", &"00".repeat(32))]);

    let output = wimforge(&sb)
        .args(["cache", "verify", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let body: serde_json::Value =
        serde_json::from_slice(&output).expect("valid JSON");
    assert_eq!(body["evicted"][0], "7.5.1");
    assert!(
        !sb.cache_dir
            .join("PowerShell-7.5.1-win-x64.zip")
            .exists(),
        "corrupt archive must be removed"
    );
}

// --- clear ---

#[test]
fn test_clear_on_empty_cache() {
    let sb = sandbox();
    wimforge(&sb)
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cache is already empty"));
}

#[test]
fn test_clear_defaults_to_cancel_without_a_tty() {
    // Non-interactive mode answers the prompt with its default (No), so an
    // unattended `cache clear` never deletes anything.
    let sb = sandbox();
    seed_archive(&sb.cache_dir, "7.5.1", b"precious bytes");

    wimforge(&sb)
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("clear cancelled"));
    assert!(
        sb.cache_dir
            .join("PowerShell-7.5.1-win-x64.zip")
            .exists()
    );
}
