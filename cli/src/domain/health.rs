//! Health check domain types and pure diagnostic functions.
//!
//! This module is intentionally free of I/O, async, and external layer imports.
//! All functions take data in and return data out.

use std::path::PathBuf;

/// Standard Windows ADK install locations for `oscdimg.exe`, probed before
/// falling back to a PATH lookup.
pub const OSCDIMG_ADK_PATHS: [&str; 2] = [
    r"C:\Program Files (x86)\Windows Kits\10\Assessment and Deployment Kit\Deployment Tools\amd64\Oscdimg\oscdimg.exe",
    r"C:\Program Files\Windows Kits\10\Assessment and Deployment Kit\Deployment Tools\amd64\Oscdimg\oscdimg.exe",
];

// ── Types ─────────────────────────────────────────────────────────────────────

/// Outcome of a single check, in increasing order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

/// Probe result for one external tool.
#[derive(Debug, Clone)]
pub struct ToolCheck {
    /// Tool name as invoked (e.g. `dism`, `oscdimg`, `reg`).
    pub name: String,
    /// Whether the tool was found.
    pub found: bool,
    /// Reported version, when the tool prints one.
    pub version: Option<String>,
    /// Resolved location, for tools found by directory probing.
    pub path: Option<PathBuf>,
}

impl ToolCheck {
    #[must_use]
    pub fn status(&self) -> CheckStatus {
        if self.found {
            CheckStatus::Ok
        } else {
            CheckStatus::Fail
        }
    }
}

/// Everything the doctor command learned about the host.
#[derive(Debug, Clone)]
pub struct EnvironmentReport {
    /// External tool probes (dism, oscdimg, reg).
    pub tools: Vec<ToolCheck>,
    /// Whether the process has administrator rights.
    pub elevated: bool,
    /// Whether the workspace temp root accepts writes.
    pub temp_root_writable: bool,
    /// Whether the package cache directory accepts writes.
    pub cache_dir_writable: bool,
    /// Available disk space under the temp root, in GB.
    pub disk_space_gb: u64,
    /// Whether disk space meets the 10 GB minimum.
    pub disk_space_ok: bool,
    /// Leftover `Mount_*` / `PS7_*` directories from earlier runs.
    pub stale_workspaces: usize,
    /// Configured default runtime version.
    pub default_version: String,
    /// Whether that version has a pinned hash.
    pub hash_pinned: bool,
    /// Whether the configured download URL template is HTTPS.
    pub download_url_https: bool,
}

// ── Pure functions ────────────────────────────────────────────────────────────

/// Collect blocking issues from an environment report.
///
/// Returns a list of human-readable issue strings for any failing checks.
/// Stale workspace directories are a **warning only** and are NOT included
/// here; see [`collect_warnings`].
#[must_use]
pub fn collect_issues(report: &EnvironmentReport) -> Vec<String> {
    let mut issues = Vec::new();
    for tool in &report.tools {
        if !tool.found {
            issues.push(format!("{} not found on PATH", tool.name));
        }
    }
    if !report.elevated {
        issues
            .push("Not running elevated (image mounting requires administrator rights)".to_string());
    }
    if !report.temp_root_writable {
        issues.push("Workspace temp root is not writable".to_string());
    }
    if !report.cache_dir_writable {
        issues.push("Package cache directory is not writable".to_string());
    }
    if !report.disk_space_ok {
        issues.push(format!(
            "Low disk space ({} GB available, need 10 GB)",
            report.disk_space_gb,
        ));
    }
    if !report.hash_pinned {
        issues.push(format!(
            "No pinned hash for PowerShell {} (set powershell.hash.{})",
            report.default_version, report.default_version,
        ));
    }
    if !report.download_url_https {
        issues.push("Download URL template is not HTTPS".to_string());
    }
    issues
}

/// Collect non-blocking warnings from an environment report.
#[must_use]
pub fn collect_warnings(report: &EnvironmentReport) -> Vec<String> {
    let mut warnings = Vec::new();
    if report.stale_workspaces > 0 {
        warnings.push(format!(
            "{} stale workspace director{} under the temp root (run 'wimforge cleanup')",
            report.stale_workspaces,
            if report.stale_workspaces == 1 {
                "y"
            } else {
                "ies"
            },
        ));
    }
    warnings
}

/// Overall severity for exit-code purposes.
#[must_use]
pub fn overall_status(report: &EnvironmentReport) -> CheckStatus {
    if !collect_issues(report).is_empty() {
        CheckStatus::Fail
    } else if !collect_warnings(report).is_empty() {
        CheckStatus::Warn
    } else {
        CheckStatus::Ok
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
