//! Application service — WinPE build pipeline use-case.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! All I/O is routed through injected port traits.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use semver::Version;

use crate::application::ports::{
    ImageServicer, IsoBuilder, PackageProvider, ProgressReporter, RunStateStore, WorkerPool,
    WorkspaceAllocator,
};
use crate::application::services::jobs::evaluate_reports;
use crate::application::services::retry::RetryRunner;
use crate::domain::config::RetryPolicy;
use crate::domain::error::PipelineError;
use crate::domain::jobs::{CancelFlag, InjectSpec, JobFn, JobSpec, OptimizeSpec};
use crate::domain::workspace::{DismountMode, IsoReport, RunStage, RunState, WorkspaceInstance};

pub struct BuildOptions<'a, R: ProgressReporter> {
    pub reporter: &'a R,
    /// Image file to customize, normally `<media>/sources/boot.wim`.
    pub wim_path: &'a Path,
    pub image_index: u32,
    /// Boot media tree the ISO is assembled from.
    pub media_dir: &'a Path,
    pub output_path: &'a Path,
    pub version: &'a Version,
    pub expected_sha256: &'a str,
    pub download_url: &'a str,
    pub label: &'a str,
    /// Run identifier override; a fresh UUID when `None`.
    pub instance_id: Option<String>,
    pub skip_cleanup: bool,
    pub skip_optimize: bool,
    pub show_progress: bool,
    /// Directory holding named critical-section lock files.
    pub lock_dir: PathBuf,
    pub lock_timeout: Duration,
    /// Shared wall-clock budget for the customization jobs.
    pub job_timeout: Duration,
    pub retry: RetryPolicy,
    /// Maps job descriptions to executable work; chosen by the caller so
    /// this service stays free of adapter types.
    pub run_job: JobFn,
    pub cancel: CancelFlag,
}

/// Outcome of the `run_build` use-case.
#[derive(Debug)]
pub struct BuildOutcome {
    pub run_id: String,
    pub iso: IsoReport,
    pub output_path: PathBuf,
}

/// Run the full customization pipeline: resolve the runtime package, mount
/// the image, run the parallel customization jobs, commit, and assemble the
/// ISO.
///
/// On any failure the pipeline releases the mount (discarding changes) and
/// removes the run's workspace directories unless cleanup was explicitly
/// skipped; cleanup problems are reported as warnings and never mask the
/// original error.
///
/// # Errors
///
/// Returns the first step error after best-effort cleanup.
pub async fn run_build(
    images: &impl ImageServicer,
    packages: &impl PackageProvider,
    iso: &impl IsoBuilder,
    allocator: &impl WorkspaceAllocator,
    pool: &impl WorkerPool,
    states: &impl RunStateStore,
    opts: BuildOptions<'_, impl ProgressReporter>,
) -> Result<BuildOutcome> {
    let reporter = opts.reporter;

    // Step 1: Allocate the run workspace and persist the initial state.
    let workspace = allocator
        .allocate(opts.instance_id.clone())
        .await
        .context("allocating run workspace")?;
    let mut state = RunState::new(
        &workspace,
        opts.wim_path.to_path_buf(),
        opts.image_index,
        opts.output_path.to_path_buf(),
        opts.version.to_string(),
    );
    states.save(&state).await.context("saving run state")?;
    reporter.step(&format!("run {} started", workspace.instance_id));

    let retry = RetryRunner::new(opts.retry, opts.cancel.clone());
    let result = customize(images, packages, iso, pool, states, &retry, &workspace, &mut state, &opts).await;

    match result {
        Ok(report) => {
            // Step 7: Remove the run's state and directories. State goes
            // first so an emptied temp root can be dropped with the dirs.
            if opts.skip_cleanup {
                reporter.warn(&format!(
                    "workspace kept for inspection: {}",
                    workspace.mount_dir.display()
                ));
            } else {
                states
                    .delete(&workspace.instance_id)
                    .await
                    .context("removing run state")?;
                allocator
                    .remove(&workspace)
                    .await
                    .context("removing run workspace")?;
            }
            Ok(BuildOutcome {
                run_id: workspace.instance_id.clone(),
                iso: report,
                output_path: opts.output_path.to_path_buf(),
            })
        }
        Err(err) => {
            state.fail(format!("{err:#}"));
            if let Err(save_err) = states.save(&state).await {
                reporter.warn(&format!("could not record failure state: {save_err:#}"));
            }
            release_on_failure(images, allocator, &retry, reporter, &workspace, opts.skip_cleanup)
                .await;
            Err(err)
        }
    }
}

/// Steps 2–6: everything between workspace allocation and final cleanup.
#[allow(clippy::too_many_arguments)]
async fn customize(
    images: &impl ImageServicer,
    packages: &impl PackageProvider,
    iso: &impl IsoBuilder,
    pool: &impl WorkerPool,
    states: &impl RunStateStore,
    retry: &RetryRunner,
    workspace: &WorkspaceInstance,
    state: &mut RunState,
    opts: &BuildOptions<'_, impl ProgressReporter>,
) -> Result<IsoReport> {
    let reporter = opts.reporter;

    // Step 2: Resolve the runtime package, downloading on a cache miss.
    // The cache probe is deliberately outside the retry wrapper: a busy
    // cache lock means a stuck peer, not a transient condition.
    reporter.step(&format!("resolving PowerShell {}", opts.version));
    let package = match packages
        .cached(opts.version, opts.expected_sha256)
        .await
        .context("checking package cache")?
    {
        Some(package) => {
            reporter.success(&format!("using cached {}", package.archive_path.display()));
            package
        }
        None => {
            let downloaded = retry
                .run_async("package download", reporter, || {
                    packages.fetch_and_store(
                        opts.version,
                        opts.download_url,
                        opts.expected_sha256,
                        opts.show_progress,
                    )
                })
                .await
                .context("downloading runtime package")?;
            reporter.success("package downloaded and verified");
            downloaded
        }
    };
    state.advance(RunStage::PackageResolved);
    states.save(state).await?;

    // Step 3: Mount the image. Mounting over an occupied mount point is a
    // precondition violation, never retried.
    if images.is_mounted(&workspace.mount_dir).await? {
        return Err(PipelineError::Validation(format!(
            "an image is already mounted at {}",
            workspace.mount_dir.display()
        ))
        .into());
    }
    reporter.step(&format!("mounting image index {}", opts.image_index));
    retry
        .run_async("image mount", reporter, || {
            images.mount(opts.wim_path, &workspace.mount_dir, opts.image_index)
        })
        .await
        .context("mounting image")?;
    state.advance(RunStage::Mounted);
    states.save(state).await?;
    reporter.success("image mounted");

    // Step 4: Run the customization jobs on the worker pool.
    let jobs = build_jobs(opts, workspace, &package.archive_path);
    reporter.step(&format!("running {} customization job(s)", jobs.len()));
    let reports = pool
        .run_all(jobs, opts.run_job, opts.cancel.clone(), opts.job_timeout)
        .await
        .context("running customization jobs")?;
    for report in &reports {
        match (&report.result, report.failure_summary()) {
            (Some(result), None) => reporter.success(&format!("{}: {}", report.job, result.message)),
            (_, Some(summary)) => reporter.warn(&summary),
            (None, None) => {}
        }
    }
    evaluate_reports(&reports)?;
    state.advance(RunStage::Customized);
    states.save(state).await?;

    // Step 5: Commit the customized image back into the WIM.
    reporter.step("saving image changes");
    retry
        .run_async("image dismount", reporter, || {
            images.dismount(&workspace.mount_dir, DismountMode::Commit)
        })
        .await
        .context("committing image changes")?;
    state.advance(RunStage::Dismounted);
    states.save(state).await?;

    // Step 6: Assemble the bootable ISO. Assembly failures are structural,
    // so the call is not retried.
    reporter.step("assembling bootable ISO");
    let report = iso
        .build(opts.media_dir, opts.output_path, opts.label)
        .await
        .context("assembling ISO")?;
    if !report.signature_ok {
        reporter.warn("ISO volume descriptor not found where expected");
    }
    state.advance(RunStage::Assembled);
    states.save(state).await?;
    reporter.success(&format!(
        "ISO written: {} ({} MB)",
        opts.output_path.display(),
        report.size_bytes / (1024 * 1024)
    ));

    Ok(report)
}

/// Job list for the parallel phase: runtime injection always, media
/// optimization unless skipped.
fn build_jobs(
    opts: &BuildOptions<'_, impl ProgressReporter>,
    workspace: &WorkspaceInstance,
    package_path: &Path,
) -> Vec<JobSpec> {
    let mut jobs = vec![JobSpec::InjectRuntime(InjectSpec {
        package_path: package_path.to_path_buf(),
        staging_dir: workspace.staging_dir.clone(),
        mount_dir: workspace.mount_dir.clone(),
        lock_dir: opts.lock_dir.clone(),
        lock_timeout: opts.lock_timeout,
        retry: opts.retry,
    })];
    if !opts.skip_optimize {
        jobs.push(JobSpec::OptimizeMedia(OptimizeSpec {
            media_dir: opts.media_dir.to_path_buf(),
            retry: opts.retry,
        }));
    }
    jobs
}

/// Best-effort release after a failed run: discard the mount if one is
/// held, then remove the workspace directories unless told otherwise.
/// Every problem here is a warning — the original error stays primary.
async fn release_on_failure(
    images: &impl ImageServicer,
    allocator: &impl WorkspaceAllocator,
    retry: &RetryRunner,
    reporter: &impl ProgressReporter,
    workspace: &WorkspaceInstance,
    skip_cleanup: bool,
) {
    match images.is_mounted(&workspace.mount_dir).await {
        Ok(true) => {
            reporter.step("releasing mounted image (discarding changes)");
            if let Err(err) = retry
                .run_async("cleanup dismount", reporter, || {
                    images.dismount(&workspace.mount_dir, DismountMode::Discard)
                })
                .await
            {
                reporter.warn(&format!("dismount failed during cleanup: {err:#}"));
            }
        }
        Ok(false) => {}
        Err(err) => reporter.warn(&format!("could not probe mount state: {err:#}")),
    }

    if skip_cleanup {
        reporter.warn(&format!(
            "workspace kept for inspection: {}",
            workspace.mount_dir.display()
        ));
        return;
    }
    if let Err(err) = allocator.remove(workspace).await {
        reporter.warn(&format!("workspace cleanup failed: {err:#}"));
    }
}
