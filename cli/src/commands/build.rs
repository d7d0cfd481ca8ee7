//! `wimforge build` — the full customization pipeline.
//!
//! Wires concrete infrastructure (dism, oscdimg, reg.exe, the package
//! cache, file locks, and the worker pool) into the pipeline service.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use crate::app::AppContext;
use crate::application::services::inject::run_inject;
use crate::application::services::jobs::BufferedReporter;
use crate::application::services::optimize::run_optimize;
use crate::application::services::pipeline::{BuildOptions, run_build};
use crate::domain::config::validate_config_value;
use crate::domain::error::PipelineError;
use crate::domain::jobs::{CancelFlag, JobResult, JobSpec};
use crate::domain::pwsh::{download_url, parse_version};
use crate::domain::workspace::validate_instance_id;
use crate::infra::cache::CachingPackageProvider;
use crate::infra::dism::DismServicer;
use crate::infra::fs::StdWorkspaceFs;
use crate::infra::locks::FlockSections;
use crate::infra::mountpoint::DirWorkspaceAllocator;
use crate::infra::oscdimg::{OscdimgBuilder, resolve_tool};
use crate::infra::pool::select_worker_pool;
use crate::infra::registry::RegExeHive;
use crate::infra::state::JsonStateStore;
use crate::output::reporter::TerminalReporter;

/// Arguments for the build command.
#[derive(Args)]
pub struct BuildArgs {
    /// Boot image to customize (normally <media>/sources/boot.wim)
    pub wim: PathBuf,

    /// Output ISO path
    #[arg(short, long)]
    pub output: PathBuf,

    /// Image index inside the WIM
    #[arg(long, default_value_t = 1)]
    pub index: u32,

    /// Boot media tree to assemble the ISO from (derived from the WIM
    /// location when omitted)
    #[arg(long)]
    pub media_dir: Option<PathBuf>,

    /// PowerShell version to inject (defaults to the configured version)
    #[arg(long)]
    pub pwsh_version: Option<String>,

    /// ISO volume label (defaults to the configured label)
    #[arg(long)]
    pub label: Option<String>,

    /// Reuse a specific run identifier instead of generating one
    #[arg(long)]
    pub instance_id: Option<String>,

    /// Keep the run workspace for inspection instead of removing it
    #[arg(long)]
    pub skip_cleanup: bool,

    /// Skip the boot media optimization job
    #[arg(long)]
    pub skip_optimize: bool,
}

/// Run the build command.
///
/// # Errors
///
/// Returns the first pipeline error after best-effort cleanup, or a
/// validation error for bad arguments.
pub async fn run(app: &AppContext, args: BuildArgs) -> Result<ExitCode> {
    if !args.wim.is_file() {
        return Err(PipelineError::Validation(format!(
            "image file not found: {}",
            args.wim.display()
        ))
        .into());
    }
    if let Some(id) = &args.instance_id {
        validate_instance_id(id)?;
    }

    let version_input = args
        .pwsh_version
        .as_deref()
        .unwrap_or(&app.config.powershell.default_version);
    let version = parse_version(version_input)?;

    // An unpinned version must fail before any download happens.
    let expected_sha256 = app
        .config
        .powershell
        .pinned_hash(&version)
        .ok_or_else(|| {
            PipelineError::Configuration(format!(
                "no pinned hash for PowerShell {version}; \
                 run 'wimforge config set powershell.hash.{version} <sha256>'"
            ))
        })?
        .to_string();
    let url = download_url(&app.config.powershell.download_url, &version)?;

    let media_dir = match &args.media_dir {
        Some(dir) => dir.clone(),
        None => derive_media_dir(&args.wim)?,
    };
    if !media_dir.is_dir() {
        return Err(PipelineError::Validation(format!(
            "media directory not found: {}",
            media_dir.display()
        ))
        .into());
    }

    let label = match &args.label {
        Some(label) => {
            validate_config_value("iso.label", label)?;
            label.clone()
        }
        None => app.config.iso.label.clone(),
    };

    std::fs::create_dir_all(&app.lock_dir)
        .with_context(|| format!("creating lock directory {}", app.lock_dir.display()))?;

    // Adapters.
    let timeouts = &app.config.timeouts;
    let images = DismServicer::with_timeouts(
        Duration::from_secs(timeouts.mount_secs),
        Duration::from_secs(timeouts.dismount_secs),
    );
    let packages = CachingPackageProvider::new(
        app.cache_dir.clone(),
        app.lock_timeout(),
        Duration::from_secs(timeouts.download_secs),
    );
    let iso = OscdimgBuilder::new(
        crate::infra::command_runner::TokioCommandRunner::new(Duration::from_secs(
            timeouts.job_secs,
        )),
        resolve_tool(app.config.iso.oscdimg_path.as_deref()),
        Duration::from_secs(timeouts.job_secs),
    );
    let allocator = DirWorkspaceAllocator::new(app.temp_root.clone());
    let pool = select_worker_pool();
    let states = JsonStateStore::new(app.temp_root.clone());
    let reporter = TerminalReporter::new(&app.output);

    // Ctrl-C raises the cancel flag; running jobs stop at their next
    // cancellation check and the failure path discards the mount.
    let cancel = CancelFlag::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_for_signal.cancel();
        }
    });

    let outcome = run_build(
        &images,
        &packages,
        &iso,
        &allocator,
        &pool,
        &states,
        BuildOptions {
            reporter: &reporter,
            wim_path: &args.wim,
            image_index: args.index,
            media_dir: &media_dir,
            output_path: &args.output,
            version: &version,
            expected_sha256: &expected_sha256,
            download_url: &url,
            label: &label,
            instance_id: args.instance_id.clone(),
            skip_cleanup: args.skip_cleanup,
            skip_optimize: args.skip_optimize,
            show_progress: app.output.show_progress() && !app.json,
            lock_dir: app.lock_dir.clone(),
            lock_timeout: app.lock_timeout(),
            job_timeout: Duration::from_secs(timeouts.job_secs),
            retry: app.config.retry,
            run_job: dispatch_job,
            cancel,
        },
    )
    .await?;

    if app.json {
        let body = serde_json::json!({
            "run_id": outcome.run_id,
            "output": outcome.output_path,
            "size_bytes": outcome.iso.size_bytes,
            "signature_ok": outcome.iso.signature_ok,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    }
    Ok(ExitCode::SUCCESS)
}

/// Media tree the WIM came from: for the conventional
/// `<media>/sources/boot.wim` layout that is the grandparent, otherwise
/// the parent directory.
fn derive_media_dir(wim: &Path) -> Result<PathBuf> {
    let parent = wim.parent().ok_or_else(|| {
        PipelineError::Validation(format!(
            "cannot derive media directory from {}",
            wim.display()
        ))
    })?;
    let is_sources = parent
        .file_name()
        .is_some_and(|n| n.eq_ignore_ascii_case("sources"));
    let media = if is_sources {
        parent.parent().unwrap_or(parent)
    } else {
        parent
    };
    Ok(media.to_path_buf())
}

/// Production job dispatcher: runs on a worker thread, so it builds its
/// own sync adapters and buffers progress instead of printing.
fn dispatch_job(spec: JobSpec, cancel: CancelFlag) -> JobResult {
    let fs = StdWorkspaceFs;
    let reporter = BufferedReporter::default();
    match spec {
        JobSpec::InjectRuntime(spec) => {
            let sections = FlockSections::new(spec.lock_dir.clone(), spec.lock_timeout);
            match run_inject(&spec, &fs, &sections, &RegExeHive, &reporter, &cancel) {
                Ok(()) => JobResult::ok(reporter.annotate("runtime injected")),
                Err(err) => JobResult::fail(format!("{err:#}")),
            }
        }
        JobSpec::OptimizeMedia(spec) => match run_optimize(&spec, &fs, &reporter, &cancel) {
            Ok(outcome) => JobResult::ok(reporter.annotate(&outcome.summary())),
            Err(err) => JobResult::fail(format!("{err:#}")),
        },
    }
}
