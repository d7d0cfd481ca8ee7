//! PowerShell runtime naming, image layout, and boot-script rendering.
//!
//! Pure path and string derivation shared by the injector, cache, and
//! download modules.

use std::path::{Path, PathBuf};

use anyhow::Result;
use semver::Version;

use crate::domain::error::PipelineError;

/// Temporary key name the offline `SOFTWARE` hive is loaded under (HKLM).
pub const HIVE_MOUNT_KEY: &str = "WimforgeOfflineSoftware";

/// App Paths subkey for the injected executable, relative to the loaded hive.
pub const APP_PATHS_SUBKEY: &str = r"Microsoft\Windows\CurrentVersion\App Paths\pwsh.exe";

/// Runtime directory as seen from inside the booted environment, where the
/// image is always the X: ramdisk drive.
pub const BOOT_RUNTIME_DIR: &str = r"X:\Windows\System32\PowerShell7";

/// Runtime executable as seen from inside the booted environment.
pub const BOOT_RUNTIME_EXE: &str = r"X:\Windows\System32\PowerShell7\pwsh.exe";

/// Parses a PowerShell version string, accepting an optional `v` prefix.
///
/// # Errors
///
/// Returns a `Validation` error for anything that is not a full semantic
/// version (e.g. `7.5`, `latest`).
pub fn parse_version(input: &str) -> Result<Version> {
    let trimmed = input.trim();
    let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(bare).map_err(|e| {
        PipelineError::Validation(format!(
            "'{input}' is not a valid PowerShell version (expected e.g. 7.5.1): {e}"
        ))
        .into()
    })
}

/// Archive file name for a given version, matching the upstream release
/// naming scheme.
#[must_use]
pub fn artifact_name(version: &Version) -> String {
    format!("PowerShell-{version}-win-x64.zip")
}

/// Expands the configured URL template for `version`.
///
/// # Errors
///
/// Returns a `Configuration` error when the template is not HTTPS or lacks
/// the `{version}` placeholder.
pub fn download_url(template: &str, version: &Version) -> Result<String> {
    crate::domain::config::validate_url_template(template)?;
    Ok(template.replace("{version}", &version.to_string()))
}

/// Runtime install directory inside a mounted image.
#[must_use]
pub fn runtime_install_dir(mount_dir: &Path) -> PathBuf {
    mount_dir
        .join("Windows")
        .join("System32")
        .join("PowerShell7")
}

/// Offline `SOFTWARE` hive file inside a mounted image.
#[must_use]
pub fn software_hive_path(mount_dir: &Path) -> PathBuf {
    mount_dir
        .join("Windows")
        .join("System32")
        .join("config")
        .join("SOFTWARE")
}

/// Boot startup script inside a mounted image.
#[must_use]
pub fn startnet_path(mount_dir: &Path) -> PathBuf {
    mount_dir
        .join("Windows")
        .join("System32")
        .join("startnet.cmd")
}

/// Backup copy of the startup script, written before the rewrite.
#[must_use]
pub fn startnet_backup_path(mount_dir: &Path) -> PathBuf {
    startnet_path(mount_dir).with_extension("cmd.bak")
}

/// Renders the replacement `startnet.cmd`.
///
/// Keeps `wpeinit` first (network and device init), then extends `PATH`
/// and hands the console to the injected shell. CRLF line endings, since
/// the script runs under cmd.exe inside the booted image.
#[must_use]
pub fn startnet_script() -> String {
    [
        "wpeinit".to_string(),
        format!("set PATH=%PATH%;{BOOT_RUNTIME_DIR}"),
        format!("{BOOT_RUNTIME_EXE} -NoLogo"),
        String::new(),
    ]
    .join("\r\n")
}
