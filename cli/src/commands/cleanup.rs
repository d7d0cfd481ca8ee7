//! `wimforge cleanup` — recover from interrupted runs.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;

use crate::app::AppContext;
use crate::application::services::cleanup::run_cleanup;
use crate::infra::dism::DismServicer;
use crate::infra::mountpoint::DirWorkspaceAllocator;
use crate::infra::state::JsonStateStore;
use crate::output::reporter::TerminalReporter;

/// Run the cleanup command.
///
/// A live build's workspace looks identical to a crashed one, so the
/// operator is asked to confirm that no build is running before the sweep.
///
/// # Errors
///
/// Returns an error when the leftover scan fails or the prompt cannot be
/// shown.
pub async fn run(app: &AppContext) -> Result<ExitCode> {
    let confirmed = app.confirm(
        "Remove leftover workspaces? Make sure no build is currently running",
        true,
    )?;
    if !confirmed {
        app.output.info("cleanup cancelled");
        return Ok(ExitCode::SUCCESS);
    }

    let images = DismServicer::with_timeouts(
        Duration::from_secs(app.config.timeouts.mount_secs),
        Duration::from_secs(app.config.timeouts.dismount_secs),
    );
    let allocator = DirWorkspaceAllocator::new(app.temp_root.clone());
    let states = JsonStateStore::new(app.temp_root.clone());
    let reporter = TerminalReporter::new(&app.output);

    let outcome = run_cleanup(&images, &allocator, &states, &reporter).await?;

    if app.json {
        let body = serde_json::json!({
            "dismounted": outcome.dismounted,
            "removed_dirs": outcome.removed_dirs,
            "removed_states": outcome.removed_states,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    }
    Ok(ExitCode::SUCCESS)
}
