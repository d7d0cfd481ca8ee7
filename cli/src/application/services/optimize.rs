//! Application service — boot media size optimization job.
//!
//! Runs on a worker thread concurrently with runtime injection. Touches
//! only the media tree, never the mounted image.

use std::path::Path;

use anyhow::{Context, Result};

use crate::application::ports::{ProgressReporter, WorkspaceFs};
use crate::application::services::retry::RetryRunner;
use crate::domain::jobs::{CancelFlag, OptimizeSpec};
use crate::domain::workspace::is_prunable_boot_dir;

/// Boot media subtrees that carry per-locale duplicates worth pruning.
const PRUNE_ROOTS: [&str; 2] = ["boot", "efi/microsoft/boot"];

/// Stray file extensions left behind by interrupted runs.
const STRAY_EXTENSIONS: [&str; 2] = ["bak", "partial"];

/// What the optimizer removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OptimizeOutcome {
    pub removed_dirs: u64,
    pub removed_files: u64,
    pub bytes_reclaimed: u64,
}

impl OptimizeOutcome {
    /// One-line summary for the job result message.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "reclaimed {} MB ({} directories, {} files)",
            self.bytes_reclaimed / (1024 * 1024),
            self.removed_dirs,
            self.removed_files
        )
    }
}

/// Prune redundant boot media content: non-default locale directories
/// under the boot loader trees, plus stray backup and partial-download
/// files anywhere under the media root.
///
/// Each removal is retried on transient failure. Missing prune roots are
/// skipped, so the job works on minimal media layouts too.
///
/// # Errors
///
/// Returns the first removal or listing error after retries.
pub fn run_optimize(
    spec: &OptimizeSpec,
    fs: &impl WorkspaceFs,
    reporter: &impl ProgressReporter,
    cancel: &CancelFlag,
) -> Result<OptimizeOutcome> {
    let retry = RetryRunner::new(spec.retry, cancel.clone());
    let mut outcome = OptimizeOutcome::default();

    // Step 1: Prune non-default locale directories from the loader trees.
    for root in PRUNE_ROOTS {
        ensure_active(cancel)?;
        let root_dir = spec.media_dir.join(root);
        if !fs.exists(&root_dir) {
            continue;
        }
        reporter.step(&format!("pruning locale directories under {root}"));
        prune_locale_dirs(fs, &retry, reporter, &root_dir, &mut outcome)
            .with_context(|| format!("pruning {root}"))?;
    }

    // Step 2: Sweep stray droppings from earlier interrupted runs.
    ensure_active(cancel)?;
    reporter.step("removing stray backup and partial files");
    let strays = fs
        .find_by_extension(&spec.media_dir, &STRAY_EXTENSIONS)
        .context("scanning for stray files")?;
    for stray in strays {
        ensure_active(cancel)?;
        let freed = retry
            .run("stray file removal", reporter, || fs.remove_file(&stray))
            .with_context(|| format!("removing {}", stray.display()))?;
        outcome.removed_files += 1;
        outcome.bytes_reclaimed += freed;
    }

    reporter.success(&outcome.summary());
    Ok(outcome)
}

fn ensure_active(cancel: &CancelFlag) -> Result<()> {
    anyhow::ensure!(!cancel.is_cancelled(), "media optimization cancelled");
    Ok(())
}

fn prune_locale_dirs(
    fs: &impl WorkspaceFs,
    retry: &RetryRunner,
    reporter: &impl ProgressReporter,
    root_dir: &Path,
    outcome: &mut OptimizeOutcome,
) -> Result<()> {
    let entries = fs
        .list_dir(root_dir)
        .with_context(|| format!("listing {}", root_dir.display()))?;
    for entry in entries {
        let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !is_prunable_boot_dir(name) {
            continue;
        }
        let freed = retry
            .run("locale directory removal", reporter, || {
                fs.remove_tree(&entry)
            })
            .with_context(|| format!("removing {}", entry.display()))?;
        outcome.removed_dirs += 1;
        outcome.bytes_reclaimed += freed;
    }
    Ok(())
}
