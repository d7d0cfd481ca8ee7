//! Application service — environment doctor use-case.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! All I/O is routed through injected port traits.

use std::path::Path;

use anyhow::Result;

use crate::application::ports::{
    CommandRunner, HostProbe, ProgressReporter, WorkspaceAllocator,
};
use crate::domain::config::WimforgeConfig;
use crate::domain::health::{EnvironmentReport, OSCDIMG_ADK_PATHS, ToolCheck};
use crate::domain::pwsh::parse_version;

/// Minimum free space under the temp root for a comfortable build, in GB.
const MIN_DISK_GB: u64 = 10;

/// Probe the host for everything a build needs: servicing tools, privileges,
/// directory writability, disk space, leftover workspaces, and the runtime
/// download configuration.
///
/// Individual probes degrade to "not found" / "not writable" instead of
/// failing the whole diagnosis.
///
/// # Errors
///
/// Returns an error only when the leftover-workspace scan itself fails.
pub async fn collect_environment(
    runner: &impl CommandRunner,
    probe: &impl HostProbe,
    allocator: &impl WorkspaceAllocator,
    config: &WimforgeConfig,
    temp_root: &Path,
    cache_dir: &Path,
    reporter: &impl ProgressReporter,
) -> Result<EnvironmentReport> {
    reporter.step("checking servicing tools...");
    let tools = vec![
        probe_dism(runner).await,
        probe_oscdimg(runner, probe, config.iso.oscdimg_path.as_deref()).await,
        probe_reg(runner).await,
    ];

    reporter.step("checking privileges and directories...");
    let elevated = probe.is_elevated();
    let temp_root_writable = probe.is_writable(temp_root).unwrap_or(false);
    let cache_dir_writable = probe.is_writable(cache_dir).unwrap_or(false);
    let disk_space_gb = probe.disk_space_gb(temp_root).unwrap_or(0);

    reporter.step("checking for leftover workspaces...");
    let stale_workspaces = allocator.scan_leftovers().await?.len();

    reporter.step("checking runtime download configuration...");
    let default_version = config.powershell.default_version.clone();
    let hash_pinned = parse_version(&default_version)
        .ok()
        .and_then(|v| config.powershell.pinned_hash(&v))
        .is_some();
    let download_url_https = config.powershell.download_url.starts_with("https://");

    reporter.success("diagnostics complete");

    Ok(EnvironmentReport {
        tools,
        elevated,
        temp_root_writable,
        cache_dir_writable,
        disk_space_gb,
        disk_space_ok: disk_space_gb >= MIN_DISK_GB,
        stale_workspaces,
        default_version,
        hash_pinned,
        download_url_https,
    })
}

// ── Internal probes ───────────────────────────────────────────────────────────

async fn probe_dism(runner: &impl CommandRunner) -> ToolCheck {
    let output = runner.run("dism", &["/English", "/?"]).await;
    let Ok(output) = output else {
        return ToolCheck {
            name: "dism".to_string(),
            found: false,
            version: None,
            path: None,
        };
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let version = stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("Version:"))
        .map(|v| v.trim().to_string());

    ToolCheck {
        name: "dism".to_string(),
        found: true,
        version,
        path: None,
    }
}

/// Find `oscdimg`: an explicitly configured path wins, then the standard
/// ADK install locations, then a bare PATH lookup.
async fn probe_oscdimg(
    runner: &impl CommandRunner,
    probe: &impl HostProbe,
    configured: Option<&Path>,
) -> ToolCheck {
    let mut candidates: Vec<&Path> = Vec::new();
    if let Some(path) = configured {
        candidates.push(path);
    }
    candidates.extend(OSCDIMG_ADK_PATHS.iter().map(Path::new));

    for candidate in candidates {
        if probe.file_exists(candidate) {
            return ToolCheck {
                name: "oscdimg".to_string(),
                found: true,
                version: None,
                path: Some(candidate.to_path_buf()),
            };
        }
    }

    ToolCheck {
        name: "oscdimg".to_string(),
        found: runner.run("oscdimg", &[]).await.is_ok(),
        version: None,
        path: None,
    }
}

async fn probe_reg(runner: &impl CommandRunner) -> ToolCheck {
    ToolCheck {
        name: "reg".to_string(),
        found: runner.run("reg", &["/?"]).await.is_ok(),
        version: None,
        path: None,
    }
}
