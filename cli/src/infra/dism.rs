//! Image servicing infrastructure — implements the `ImageServicer` port.
//!
//! `DismServicer<R>` routes all DISM calls through a `CommandRunner`.
//! Generic over the runner so tests can inject a mock without spawning
//! real processes. `/English` is passed on every call so failure text is
//! stable for transient-error classification.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::{CommandRunner, ImageServicer};
use crate::domain::error::PipelineError;
use crate::domain::workspace::DismountMode;
use crate::infra::command_runner::{DEFAULT_PROBE_TIMEOUT, TokioCommandRunner};

/// Production `ImageServicer` backed by the DISM command-line tool.
pub struct DismServicer<R: CommandRunner> {
    runner: R,
    mount_timeout: Duration,
    dismount_timeout: Duration,
}

impl<R: CommandRunner> DismServicer<R> {
    pub fn new(runner: R, mount_timeout: Duration, dismount_timeout: Duration) -> Self {
        Self {
            runner,
            mount_timeout,
            dismount_timeout,
        }
    }
}

impl DismServicer<TokioCommandRunner> {
    /// Convenience constructor for production use. The runner's own default
    /// timeout only bounds short calls; mount and dismount pass explicit
    /// per-operation timeouts.
    #[must_use]
    pub fn with_timeouts(mount_timeout: Duration, dismount_timeout: Duration) -> Self {
        Self::new(
            TokioCommandRunner::new(DEFAULT_PROBE_TIMEOUT),
            mount_timeout,
            dismount_timeout,
        )
    }
}

impl<R: CommandRunner> ImageServicer for DismServicer<R> {
    async fn mount(&self, image_path: &Path, mount_dir: &Path, index: u32) -> Result<()> {
        let args = mount_args(image_path, mount_dir, index);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self
            .runner
            .run_with_timeout("dism", &arg_refs, self.mount_timeout)
            .await
            .context("running dism mount")?;
        ensure_success("mounting image", &output)
    }

    async fn dismount(&self, mount_dir: &Path, mode: DismountMode) -> Result<()> {
        let args = dismount_args(mount_dir, mode);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self
            .runner
            .run_with_timeout("dism", &arg_refs, self.dismount_timeout)
            .await
            .context("running dism unmount")?;
        ensure_success("dismounting image", &output)
    }

    async fn is_mounted(&self, mount_dir: &Path) -> Result<bool> {
        // Ask DISM for its live mount table; a stale leftover directory
        // is not a mount. Fall back to the layout probe on hosts where
        // the query itself fails.
        if let Ok(output) = self
            .runner
            .run("dism", &["/English", "/Get-MountedWimInfo"])
            .await
        {
            if output.status.success() {
                let stdout = String::from_utf8_lossy(&output.stdout);
                return Ok(mount_listed(&stdout, mount_dir));
            }
        }
        // A mounted image always exposes a Windows directory at its root.
        Ok(tokio::fs::try_exists(mount_dir.join("Windows"))
            .await
            .unwrap_or(false))
    }

    async fn cleanup_stale(&self) -> Result<()> {
        let output = self
            .runner
            .run_with_timeout("dism", &cleanup_args(), self.dismount_timeout)
            .await
            .context("running dism cleanup")?;
        ensure_success("cleaning up stale mounts", &output)
    }
}

fn mount_args(image_path: &Path, mount_dir: &Path, index: u32) -> Vec<String> {
    vec![
        "/English".to_string(),
        "/Mount-Wim".to_string(),
        format!("/WimFile:{}", image_path.display()),
        format!("/Index:{index}"),
        format!("/MountDir:{}", mount_dir.display()),
    ]
}

fn dismount_args(mount_dir: &Path, mode: DismountMode) -> Vec<String> {
    let finish = match mode {
        DismountMode::Commit => "/Commit",
        DismountMode::Discard => "/Discard",
    };
    vec![
        "/English".to_string(),
        "/Unmount-Wim".to_string(),
        format!("/MountDir:{}", mount_dir.display()),
        finish.to_string(),
    ]
}

fn cleanup_args() -> [&'static str; 2] {
    ["/English", "/Cleanup-Wim"]
}

/// Whether `/Get-MountedWimInfo` output lists `mount_dir` as a mount.
/// Paths are compared case-insensitively with trailing separators
/// stripped, matching how DISM echoes them back.
fn mount_listed(stdout: &str, mount_dir: &Path) -> bool {
    let want = normalized_path(&mount_dir.to_string_lossy());
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Mount Dir :"))
        .any(|listed| normalized_path(listed.trim()) == want)
}

fn normalized_path(path: &str) -> String {
    path.trim_end_matches(['\\', '/']).to_ascii_lowercase()
}

fn ensure_success(what: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    Err(PipelineError::WimProcessing(format!("{what}: {}", failure_detail(output))).into())
}

/// DISM reports most failures on stdout, with the message in the last few
/// lines after an error code. Prefer stderr when present.
fn failure_detail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let tail: Vec<&str> = lines.iter().rev().take(4).rev().copied().collect();
    if tail.is_empty() {
        format!("exited with {}", output.status)
    } else {
        tail.join(" ")
    }
}
