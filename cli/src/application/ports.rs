//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` — never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use semver::Version;

use crate::domain::{
    CancelFlag, DismountMode, IsoReport, JobFn, JobReport, JobSpec, RunState, WorkspaceInstance,
};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Critical section guarding copies into a shared mounted-image tree.
pub const COPY_SECTION: &str = "WinPE_CustomizeCopy";

/// Critical section guarding offline registry hive load/write/unload.
pub const REGISTRY_SECTION: &str = "WinPE_CustomizeRegistry";

// ── Value Types ───────────────────────────────────────────────────────────────

/// A verified runtime archive held by the package cache.
#[derive(Debug, Clone)]
pub struct CachedPackage {
    /// Runtime version the archive contains.
    pub version: Version,
    /// Location of the archive inside the cache directory.
    pub archive_path: PathBuf,
    /// Verified SHA-256 of the archive, lowercase hex.
    pub sha256: String,
    /// Lock file serializing access to this cache entry.
    pub lock_path: PathBuf,
}

/// A held critical section. Whatever resource backs the section (when one
/// exists) is released when the guard is dropped.
pub struct SectionGuard {
    _hold: Option<Box<dyn std::any::Any + Send>>,
}

impl std::fmt::Debug for SectionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionGuard").finish_non_exhaustive()
    }
}

impl SectionGuard {
    /// Wrap a held lock. Test doubles pass `None`.
    #[must_use]
    pub fn new(hold: Option<Box<dyn std::any::Any + Send>>) -> Self {
        Self { _hold: hold }
    }
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
}

// ── Image Servicing Port ──────────────────────────────────────────────────────

/// Abstracts offline image mount and dismount operations.
///
/// Implementations are configured with their own operation timeouts; callers
/// wrap invocations in retry when the operation is retryable.
#[allow(async_fn_in_trait)]
pub trait ImageServicer {
    /// Mount image `index` of `image_path` at `mount_dir` with write access.
    async fn mount(&self, image_path: &Path, mount_dir: &Path, index: u32) -> Result<()>;
    /// Release the image mounted at `mount_dir`, committing or discarding
    /// pending changes.
    async fn dismount(&self, mount_dir: &Path, mode: DismountMode) -> Result<()>;
    /// Whether an image is currently mounted at `mount_dir`.
    async fn is_mounted(&self, mount_dir: &Path) -> Result<bool>;
    /// Clean up resources associated with abandoned mounts.
    async fn cleanup_stale(&self) -> Result<()>;
}

// ── ISO Assembly Port ─────────────────────────────────────────────────────────

/// Abstracts bootable ISO creation from a media tree.
#[allow(async_fn_in_trait)]
pub trait IsoBuilder {
    /// Build a bootable ISO from `media_dir` at `output_path`.
    ///
    /// # Errors
    ///
    /// Returns an error on a non-zero tool exit status or when the output
    /// file is missing or empty afterwards.
    async fn build(&self, media_dir: &Path, output_path: &Path, label: &str) -> Result<IsoReport>;
}

// ── Package Cache Ports ───────────────────────────────────────────────────────

/// Abstracts the verified package cache and the download that fills it.
///
/// `cached` acquires the entry's lock and validates before answering, so a
/// `ResourceBusy` from it means a stuck peer — callers must not retry it.
/// `fetch_and_store` performs network I/O and is the retryable half.
#[allow(async_fn_in_trait)]
pub trait PackageProvider {
    /// Return the verified cached package for `version`, or `None` when the
    /// cache has no valid copy (a corrupt copy is deleted on the way).
    async fn cached(&self, version: &Version, expected_sha256: &str)
    -> Result<Option<CachedPackage>>;
    /// Download `version` from `url`, verify it against `expected_sha256`,
    /// and move it into the cache.
    async fn fetch_and_store(
        &self,
        version: &Version,
        url: &str,
        expected_sha256: &str,
        show_progress: bool,
    ) -> Result<CachedPackage>;
}

// ── Workspace Allocation Port ─────────────────────────────────────────────────

/// Abstracts per-run workspace directory management under the temp root.
#[allow(async_fn_in_trait)]
pub trait WorkspaceAllocator {
    /// Create the mount and staging directories for a new run.
    ///
    /// Uses `instance_id` when given, otherwise generates one. Creating a
    /// directory that already exists is not an error.
    async fn allocate(&self, instance_id: Option<String>) -> Result<WorkspaceInstance>;
    /// Recursively delete a run's workspace directories.
    async fn remove(&self, workspace: &WorkspaceInstance) -> Result<()>;
    /// Find leftover workspace directories from earlier runs.
    async fn scan_leftovers(&self) -> Result<Vec<PathBuf>>;
    /// Delete one leftover directory found by `scan_leftovers`.
    async fn remove_leftover(&self, path: &Path) -> Result<()>;
}

// ── Worker Pool Port ──────────────────────────────────────────────────────────

/// Abstracts the bounded pool the customization jobs run on.
#[allow(async_fn_in_trait)]
pub trait WorkerPool {
    /// Run every job to completion under one shared `timeout`.
    ///
    /// # Errors
    ///
    /// Returns a `Timeout` error when the budget elapses; in that case the
    /// cancel flag has been raised and partial results are discarded.
    async fn run_all(
        &self,
        jobs: Vec<JobSpec>,
        run: JobFn,
        cancel: CancelFlag,
        timeout: Duration,
    ) -> Result<Vec<JobReport>>;
}

// ── Offline Hive Port ─────────────────────────────────────────────────────────

/// Abstracts offline registry hive manipulation. Sync trait — called from
/// worker threads, not the async orchestrator.
pub trait HiveStore {
    /// Load the hive file at `hive_file` under the temporary key `mount_key`.
    fn load(&self, hive_file: &Path, mount_key: &str) -> Result<()>;
    /// Unload the hive at `mount_key`, releasing the file.
    fn unload(&self, mount_key: &str) -> Result<()>;
    /// Write a string value under `mount_key\subkey`. `value_name` of `None`
    /// sets the key's default value.
    fn set_value(
        &self,
        mount_key: &str,
        subkey: &str,
        value_name: Option<&str>,
        data: &str,
    ) -> Result<()>;
}

// ── Workspace Filesystem Port ─────────────────────────────────────────────────

/// Abstracts the bulk file operations the customization jobs perform inside
/// the mounted image and the media tree. Sync trait — jobs run on worker
/// threads.
pub trait WorkspaceFs {
    /// Extract a zip archive into `dest`, returning the entry count.
    fn extract_archive(&self, archive: &Path, dest: &Path) -> Result<usize>;
    /// Recursively copy `from` into `to`, returning the number of files
    /// copied. Creates `to` and any missing parents.
    fn copy_tree(&self, from: &Path, to: &Path) -> Result<u64>;
    /// Copy a single file, creating parent directories as needed.
    fn copy_file(&self, from: &Path, to: &Path) -> Result<()>;
    /// Replace the contents of `path` with `contents`.
    fn write_string(&self, path: &Path, contents: &str) -> Result<()>;
    /// Whether `path` exists.
    fn exists(&self, path: &Path) -> bool;
    /// Immediate children of `path`.
    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
    /// Recursively delete a directory, returning the bytes freed.
    fn remove_tree(&self, path: &Path) -> Result<u64>;
    /// Delete a single file, returning the bytes freed.
    fn remove_file(&self, path: &Path) -> Result<u64>;
    /// Files under `root` (recursive) whose extension matches one of `exts`,
    /// compared case-insensitively.
    fn find_by_extension(&self, root: &Path, exts: &[&str]) -> Result<Vec<PathBuf>>;
}

// ── Critical Section Port ─────────────────────────────────────────────────────

/// Abstracts named cross-process mutual exclusion. Sync trait — sections are
/// entered from worker threads and held only across short step bodies.
pub trait CriticalSections {
    /// Enter the named section, waiting up to the implementation's configured
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns a `ResourceBusy` error when the wait times out.
    fn enter(&self, name: &str) -> Result<SectionGuard>;
}

// ── Config Store Port ─────────────────────────────────────────────────────────

/// Abstracts configuration persistence. Sync trait — config is loaded once
/// at startup and written only by the `config set` command.
pub trait ConfigStore {
    /// Load the configuration, falling back to defaults when no file exists.
    fn load(&self) -> Result<crate::domain::config::WimforgeConfig>;
    /// Persist the configuration.
    fn save(&self, config: &crate::domain::config::WimforgeConfig) -> Result<()>;
    /// Path of the configuration file.
    fn path(&self) -> Result<PathBuf>;
}

// ── Run State Port ────────────────────────────────────────────────────────────

/// Abstracts run state persistence between pipeline stages.
#[allow(async_fn_in_trait)]
pub trait RunStateStore {
    /// Persist the given run state.
    async fn save(&self, state: &RunState) -> Result<()>;
    /// Load the state for `run_id`, returning `None` if no state exists.
    async fn load(&self, run_id: &str) -> Result<Option<RunState>>;
    /// Remove the state file for `run_id`.
    async fn delete(&self, run_id: &str) -> Result<()>;
    /// List every persisted run state under the temp root.
    async fn list(&self) -> Result<Vec<RunState>>;
}

// ── Host Probe Port ───────────────────────────────────────────────────────────

/// Abstracts host environment checks so the doctor service can be tested
/// with mocks.
pub trait HostProbe {
    /// Available disk space under `path`, in whole GB.
    fn disk_space_gb(&self, path: &Path) -> Result<u64>;
    /// Whether `path` exists (or can be created) and accepts writes.
    fn is_writable(&self, path: &Path) -> Result<bool>;
    /// Whether a file exists at `path`.
    fn file_exists(&self, path: &Path) -> bool;
    /// Whether the current process has administrative rights.
    fn is_elevated(&self) -> bool;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait — no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}
