//! Application service — PowerShell runtime injection job.
//!
//! Runs on a worker thread: every port it takes is synchronous. Imports
//! only from `crate::domain` and `crate::application::ports`.

use anyhow::{Context, Result};

use crate::application::ports::{
    COPY_SECTION, CriticalSections, HiveStore, ProgressReporter, REGISTRY_SECTION, WorkspaceFs,
};
use crate::application::services::retry::RetryRunner;
use crate::domain::jobs::{CancelFlag, InjectSpec};
use crate::domain::pwsh::{
    APP_PATHS_SUBKEY, BOOT_RUNTIME_DIR, BOOT_RUNTIME_EXE, HIVE_MOUNT_KEY, runtime_install_dir,
    software_hive_path, startnet_backup_path, startnet_path, startnet_script,
};

/// Inject the staged PowerShell runtime into a mounted image: extract the
/// archive, copy it under `Windows\System32\PowerShell7`, register an App
/// Paths entry in the offline `SOFTWARE` hive, and rewrite `startnet.cmd`
/// to launch the shell at boot.
///
/// Each step is retried on transient failure. The copy and registry steps
/// hold their named critical sections; section entry itself is never
/// retried because contention past the timeout means a stuck peer.
///
/// # Errors
///
/// Returns the first step error. A failed registry write still attempts
/// the hive unload so the image is not left locked.
pub fn run_inject(
    spec: &InjectSpec,
    fs: &impl WorkspaceFs,
    sections: &impl CriticalSections,
    hive: &impl HiveStore,
    reporter: &impl ProgressReporter,
    cancel: &CancelFlag,
) -> Result<()> {
    let retry = RetryRunner::new(spec.retry, cancel.clone());

    // Step 1: Extract the runtime archive into the staging directory.
    ensure_active(cancel)?;
    reporter.step("extracting runtime archive");
    let entries = retry
        .run("archive extraction", reporter, || {
            fs.extract_archive(&spec.package_path, &spec.staging_dir)
        })
        .context("extracting runtime archive")?;
    reporter.success(&format!("extracted {entries} archive entries"));

    // Step 2: Copy the staged runtime into the mounted image. The target
    // tree is shared with any concurrent run servicing the same image.
    ensure_active(cancel)?;
    reporter.step("copying runtime into image");
    let target = runtime_install_dir(&spec.mount_dir);
    {
        let _guard = sections
            .enter(COPY_SECTION)
            .context("entering runtime copy section")?;
        let copied = retry
            .run("runtime copy", reporter, || {
                fs.copy_tree(&spec.staging_dir, &target)
            })
            .context("copying runtime into image")?;
        reporter.success(&format!("copied {copied} files into the image"));
    }

    // Step 3: Register the runtime under App Paths in the offline hive.
    ensure_active(cancel)?;
    reporter.step("registering runtime in offline hive");
    let hive_file = software_hive_path(&spec.mount_dir);
    {
        let _guard = sections
            .enter(REGISTRY_SECTION)
            .context("entering registry section")?;
        let load = retry.run("hive load", reporter, || {
            hive.load(&hive_file, HIVE_MOUNT_KEY)
        });
        let write = if load.is_ok() {
            write_app_paths(hive, &retry, reporter)
        } else {
            Ok(())
        };
        // Unload runs regardless of the load/write outcome so the hive
        // file is never left locked inside the image. After a failed load
        // a single bare attempt is enough.
        let unload = if load.is_ok() {
            retry.run("hive unload", reporter, || hive.unload(HIVE_MOUNT_KEY))
        } else {
            hive.unload(HIVE_MOUNT_KEY)
        };
        finish_hive_step(load, write, unload, reporter)?;
    }
    reporter.success("runtime registered in offline hive");

    // Step 4: Rewrite startnet.cmd to start the injected shell at boot.
    ensure_active(cancel)?;
    reporter.step("rewriting boot script");
    let script = startnet_path(&spec.mount_dir);
    let backup = startnet_backup_path(&spec.mount_dir);
    let had_original = fs.exists(&script);
    if had_original {
        retry
            .run("boot script backup", reporter, || {
                fs.copy_file(&script, &backup)
            })
            .context("backing up startnet.cmd")?;
    }
    if let Err(err) = retry.run("boot script write", reporter, || {
        fs.write_string(&script, &startnet_script())
    }) {
        if had_original {
            if let Err(restore_err) = fs.copy_file(&backup, &script) {
                reporter.warn(&format!(
                    "could not restore original startnet.cmd: {restore_err:#}"
                ));
            }
        }
        return Err(err.context("rewriting startnet.cmd"));
    }
    reporter.success("boot script updated");

    Ok(())
}

fn ensure_active(cancel: &CancelFlag) -> Result<()> {
    anyhow::ensure!(!cancel.is_cancelled(), "runtime injection cancelled");
    Ok(())
}

/// App Paths entries: the key default names the executable, the `Path`
/// value names its directory so it lands on the boot PATH.
fn write_app_paths(
    hive: &impl HiveStore,
    retry: &RetryRunner,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    retry.run("app-paths default value", reporter, || {
        hive.set_value(HIVE_MOUNT_KEY, APP_PATHS_SUBKEY, None, BOOT_RUNTIME_EXE)
    })?;
    retry.run("app-paths path value", reporter, || {
        hive.set_value(HIVE_MOUNT_KEY, APP_PATHS_SUBKEY, Some("Path"), BOOT_RUNTIME_DIR)
    })
}

/// Collapse the load/write/unload results into one outcome. Load and write
/// failures outrank an unload failure, which is then only warned about.
fn finish_hive_step(
    load: Result<()>,
    write: Result<()>,
    unload: Result<()>,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    let primary = load
        .context("loading offline hive")
        .and_then(|()| write.context("writing App Paths entries"));
    match (primary, unload) {
        (Ok(()), unload) => unload.context("unloading offline hive"),
        (Err(primary), Err(unload_err)) => {
            reporter.warn(&format!("hive unload also failed: {unload_err:#}"));
            Err(primary)
        }
        (Err(primary), Ok(())) => Err(primary),
    }
}
