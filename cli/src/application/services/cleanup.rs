//! Application service — crashed-run recovery use-case.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::{Context, Result};

use crate::application::ports::{
    ImageServicer, ProgressReporter, RunStateStore, WorkspaceAllocator,
};
use crate::domain::workspace::{DismountMode, MOUNT_DIR_PREFIX};

/// What a cleanup pass released.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub dismounted: usize,
    pub removed_dirs: usize,
    pub removed_states: usize,
}

impl CleanupOutcome {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Recover from interrupted runs: discard stale image mounts, remove
/// leftover workspace directories, and drop their saved run states.
///
/// Must not run while another build is in progress on the same temp root:
/// a live run's workspace is indistinguishable from a crashed one here, so
/// the caller is responsible for confirming with the operator first.
///
/// # Errors
///
/// Returns an error when the leftover scan itself fails. Individual
/// dismounts and removals degrade to warnings so one stuck entry does not
/// stop the sweep.
pub async fn run_cleanup(
    images: &impl ImageServicer,
    allocator: &impl WorkspaceAllocator,
    states: &impl RunStateStore,
    reporter: &impl ProgressReporter,
) -> Result<CleanupOutcome> {
    let mut outcome = CleanupOutcome::default();

    // Step 1: Find what earlier runs left behind.
    let leftovers = allocator
        .scan_leftovers()
        .await
        .context("scanning for leftover workspaces")?;
    let saved = states.list().await.unwrap_or_default();
    if leftovers.is_empty() && saved.is_empty() {
        reporter.success("nothing to clean up");
        return Ok(outcome);
    }
    reporter.step(&format!(
        "found {} leftover director(ies), {} saved run state(s)",
        leftovers.len(),
        saved.len()
    ));

    // Step 2: Release any mounts still held under leftover mount dirs.
    // Dirs must be unmounted before they can be removed.
    for dir in &leftovers {
        let is_mount_dir = dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(MOUNT_DIR_PREFIX));
        if !is_mount_dir {
            continue;
        }
        match images.is_mounted(dir).await {
            Ok(true) => {
                reporter.step(&format!("discarding stale mount at {}", dir.display()));
                match images.dismount(dir, DismountMode::Discard).await {
                    Ok(()) => outcome.dismounted += 1,
                    Err(err) => reporter.warn(&format!(
                        "could not dismount {}: {err:#}",
                        dir.display()
                    )),
                }
            }
            Ok(false) => {}
            Err(err) => reporter.warn(&format!(
                "could not probe mount state of {}: {err:#}",
                dir.display()
            )),
        }
    }

    // Step 3: Let the servicing tool drop records for mounts whose
    // directories vanished entirely.
    if let Err(err) = images.cleanup_stale().await {
        reporter.warn(&format!("servicing-tool mount cleanup failed: {err:#}"));
    }

    // Step 4: Remove the leftover directories.
    for dir in &leftovers {
        match allocator.remove_leftover(dir).await {
            Ok(()) => outcome.removed_dirs += 1,
            Err(err) => reporter.warn(&format!("could not remove {}: {err:#}", dir.display())),
        }
    }

    // Step 5: Drop the saved states now that their directories are gone.
    for state in &saved {
        match states.delete(&state.run_id).await {
            Ok(()) => outcome.removed_states += 1,
            Err(err) => {
                reporter.warn(&format!("could not remove state {}: {err:#}", state.run_id));
            }
        }
    }

    reporter.success(&format!(
        "cleaned up: {} dismounted, {} director(ies) removed, {} state(s) removed",
        outcome.dismounted, outcome.removed_dirs, outcome.removed_states
    ));
    Ok(outcome)
}
