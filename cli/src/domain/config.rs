//! Domain types and validators for wimforge configuration.
//!
//! Pure functions only — no I/O, no async, no filesystem access.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::error::{ConfigError, PipelineError};

// ── Constants ────────────────────────────────────────────────────────────────

pub const VALID_CONFIG_KEYS: &[&str] = &[
    "powershell.default_version",
    "powershell.hash.<version>",
    "iso.label",
];

/// Upstream release layout for the win-x64 PowerShell package.
pub const DEFAULT_DOWNLOAD_URL: &str = "https://github.com/PowerShell/PowerShell/releases/download/v{version}/PowerShell-{version}-win-x64.zip";

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.wimforge/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WimforgeConfig {
    /// Package cache directory. Defaults to `~/.wimforge/cache` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Parent directory for per-run workspaces. Defaults to the system
    /// temp directory under `wimforge/` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_root: Option<PathBuf>,
    /// Operation timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Retry policy for transient external-tool failures.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// PowerShell package settings.
    #[serde(default)]
    pub powershell: PwshConfig,
    /// ISO assembly settings.
    #[serde(default)]
    pub iso: IsoConfig,
}

/// Operation timeouts, in the unit named by each field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Timeout for a single image mount invocation.
    #[serde(default = "default_mount_secs")]
    pub mount_secs: u64,
    /// Timeout for a single image dismount invocation.
    #[serde(default = "default_dismount_secs")]
    pub dismount_secs: u64,
    /// Shared wall-clock budget for the parallel customization jobs.
    #[serde(default = "default_job_secs")]
    pub job_secs: u64,
    /// Timeout for downloading one runtime package.
    #[serde(default = "default_download_secs")]
    pub download_secs: u64,
    /// Maximum wait for a cache or critical-section lock.
    #[serde(default = "default_lock_secs")]
    pub lock_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            mount_secs: default_mount_secs(),
            dismount_secs: default_dismount_secs(),
            job_secs: default_job_secs(),
            download_secs: default_download_secs(),
            lock_secs: default_lock_secs(),
        }
    }
}

fn default_mount_secs() -> u64 {
    300
}
fn default_dismount_secs() -> u64 {
    300
}
fn default_job_secs() -> u64 {
    1800
}
fn default_download_secs() -> u64 {
    600
}
fn default_lock_secs() -> u64 {
    30
}

/// Exponential backoff policy for retryable operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the initial try.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay before the first retry, doubled on each subsequent one.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    2000
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`,
    /// saturating instead of overflowing for absurd attempt counts.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// PowerShell package settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PwshConfig {
    /// Version injected when `--pwsh-version` is not given.
    #[serde(default = "default_pwsh_version")]
    pub default_version: String,
    /// Download URL template; must be HTTPS and contain `{version}`.
    #[serde(default = "default_download_url")]
    pub download_url: String,
    /// Pinned SHA-256 hashes keyed by version string. A version without a
    /// pinned hash cannot be injected.
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
}

impl Default for PwshConfig {
    fn default() -> Self {
        Self {
            default_version: default_pwsh_version(),
            download_url: default_download_url(),
            hashes: BTreeMap::new(),
        }
    }
}

fn default_pwsh_version() -> String {
    "7.5.1".to_string()
}

fn default_download_url() -> String {
    DEFAULT_DOWNLOAD_URL.to_string()
}

impl PwshConfig {
    /// Pinned hash for `version`, if one is configured.
    #[must_use]
    pub fn pinned_hash(&self, version: &semver::Version) -> Option<&str> {
        self.hashes.get(&version.to_string()).map(String::as_str)
    }
}

/// ISO assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsoConfig {
    /// Volume label stamped into the ISO.
    #[serde(default = "default_iso_label")]
    pub label: String,
    /// Explicit path to the ISO build tool; autodetected when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oscdimg_path: Option<PathBuf>,
}

impl Default for IsoConfig {
    fn default() -> Self {
        Self {
            label: default_iso_label(),
            oscdimg_path: None,
        }
    }
}

fn default_iso_label() -> String {
    "WIMFORGE_PE".to_string()
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates a whole configuration at load time.
///
/// # Errors
///
/// Returns a `Configuration` error naming the offending field when the
/// download URL is not HTTPS or lacks the `{version}` placeholder, a
/// pinned hash is malformed, a hash key is not a valid version, the
/// volume label is unusable, or any timeout is zero.
pub fn validate_config(config: &WimforgeConfig) -> Result<()> {
    validate_url_template(&config.powershell.download_url)?;

    semver::Version::parse(&config.powershell.default_version).map_err(|e| {
        PipelineError::Configuration(format!(
            "powershell.default_version '{}' is not a valid version: {e}",
            config.powershell.default_version
        ))
    })?;

    for (version, hash) in &config.powershell.hashes {
        semver::Version::parse(version).map_err(|e| {
            PipelineError::Configuration(format!(
                "powershell.hashes key '{version}' is not a valid version: {e}"
            ))
        })?;
        if !is_sha256_hex(hash) {
            return Err(PipelineError::Configuration(format!(
                "pinned hash for {version} must be 64 hex characters"
            ))
            .into());
        }
    }

    validate_volume_label(&config.iso.label)?;

    let t = &config.timeouts;
    for (name, value) in [
        ("timeouts.mount_secs", t.mount_secs),
        ("timeouts.dismount_secs", t.dismount_secs),
        ("timeouts.job_secs", t.job_secs),
        ("timeouts.download_secs", t.download_secs),
        ("timeouts.lock_secs", t.lock_secs),
    ] {
        if value == 0 {
            return Err(
                PipelineError::Configuration(format!("{name} must be greater than zero")).into(),
            );
        }
    }

    Ok(())
}

/// Validates the download URL template: HTTPS only, `{version}` required.
///
/// # Errors
///
/// Returns a `Configuration` error when either constraint is violated.
pub fn validate_url_template(template: &str) -> Result<()> {
    if !template.starts_with("https://") {
        return Err(PipelineError::Configuration(format!(
            "powershell.download_url must use https:// (got '{template}')"
        ))
        .into());
    }
    if !template.contains("{version}") {
        return Err(PipelineError::Configuration(
            "powershell.download_url must contain a {version} placeholder".into(),
        )
        .into());
    }
    Ok(())
}

fn validate_volume_label(label: &str) -> Result<()> {
    let ok = !label.is_empty()
        && label.len() <= 32
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(PipelineError::Configuration(format!(
            "iso.label '{label}' must be 1-32 ASCII letters, digits, '_' or '-'"
        ))
        .into())
    }
}

#[must_use]
pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Validates a configuration key against the whitelist.
///
/// `powershell.hash.<version>` is a key family: the suffix must parse as
/// a version.
///
/// # Errors
///
/// Returns an error if the key is not in the allowed list.
pub fn validate_config_key(key: &str) -> Result<()> {
    if key == "powershell.default_version" || key == "iso.label" {
        return Ok(());
    }
    if let Some(version) = key.strip_prefix("powershell.hash.") {
        if semver::Version::parse(version).is_ok() {
            return Ok(());
        }
    }
    Err(ConfigError::UnknownKey {
        key: key.to_string(),
        valid: VALID_CONFIG_KEYS.join(", "),
    }
    .into())
}

/// Validates a configuration value for the given key.
///
/// # Errors
///
/// Returns an error if the value is not valid for the key.
pub fn validate_config_value(key: &str, value: &str) -> Result<()> {
    if key == "powershell.default_version" {
        if semver::Version::parse(value).is_err() {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
                reason: "Expected a version like 7.5.1".to_string(),
            }
            .into());
        }
    } else if key == "iso.label" {
        if validate_volume_label(value).is_err() {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
                reason: "Expected 1-32 ASCII letters, digits, '_' or '-'".to_string(),
            }
            .into());
        }
    } else if key.starts_with("powershell.hash.") && !is_sha256_hex(value) {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "Expected a 64-character hex SHA-256 digest".to_string(),
        }
        .into());
    }
    Ok(())
}

// ── Unit tests ───────────────────────────────────────────────────────────────
