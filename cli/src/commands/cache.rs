//! `wimforge cache` — inspect and maintain the runtime package cache.

use std::collections::BTreeMap;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Subcommand;
use owo_colors::OwoColorize;

use crate::app::AppContext;
use crate::infra::cache::{CacheEntry, EntryState, PackageCache};
use crate::output::progress;

/// Cache subcommands.
#[derive(Subcommand)]
pub enum CacheCommand {
    /// List cached packages and their verification state
    Status,
    /// Re-hash every cached package and evict corrupt ones
    Verify,
    /// Remove every cached package
    Clear,
}

/// Run the cache command.
///
/// # Errors
///
/// Returns an error when the cache directory cannot be listed, an archive
/// cannot be hashed, or a cache lock is held by another process.
pub async fn run(app: &AppContext, cmd: CacheCommand) -> Result<ExitCode> {
    match cmd {
        CacheCommand::Status => status(app).await,
        CacheCommand::Verify => verify(app).await,
        CacheCommand::Clear => clear(app).await,
    }
}

fn cache_for(app: &AppContext) -> PackageCache {
    PackageCache::new(app.cache_dir.clone(), app.lock_timeout())
}

/// Hashing multi-hundred-MB archives belongs on the blocking pool.
async fn list_entries(
    app: &AppContext,
    pinned: BTreeMap<String, String>,
) -> Result<Vec<CacheEntry>> {
    let root = app.cache_dir.clone();
    let lock_timeout = app.lock_timeout();
    let pb = (app.output.show_progress() && !app.json)
        .then(|| progress::spinner("scanning package cache..."));
    let entries = tokio::task::spawn_blocking(move || {
        PackageCache::new(root, lock_timeout).entries(&pinned)
    })
    .await
    .context("cache scan task panicked")?;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    entries
}

async fn status(app: &AppContext) -> Result<ExitCode> {
    let entries = list_entries(app, app.config.powershell.hashes.clone()).await?;

    if app.json {
        render_json(app, &entries)?;
        return Ok(ExitCode::SUCCESS);
    }

    app.output.header(&format!(
        "Package cache ({})",
        app.cache_dir.display()
    ));
    if entries.is_empty() {
        app.output.info("cache is empty");
        return Ok(ExitCode::SUCCESS);
    }
    for entry in &entries {
        let mark = state_mark(entry.state);
        println!(
            "  {mark} PowerShell {}  {} MB  {}",
            entry.version,
            entry.size_bytes / (1024 * 1024),
            &entry.sha256[..12.min(entry.sha256.len())],
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn verify(app: &AppContext) -> Result<ExitCode> {
    let entries = list_entries(app, app.config.powershell.hashes.clone()).await?;
    if entries.is_empty() {
        app.output.info("cache is empty");
        return Ok(ExitCode::SUCCESS);
    }

    let mut evicted = Vec::new();
    for entry in &entries {
        match entry.state {
            EntryState::Verified => {
                app.output
                    .success(&format!("PowerShell {} verified", entry.version));
            }
            EntryState::Unpinned => {
                app.output.warn(&format!(
                    "PowerShell {} has no pinned hash (set powershell.hash.{})",
                    entry.version, entry.version
                ));
            }
            EntryState::Mismatch => {
                let cache = cache_for(app);
                let version = entry.version.clone();
                tokio::task::spawn_blocking(move || cache.evict(&version))
                    .await
                    .context("cache evict task panicked")??;
                app.output.error(&format!(
                    "PowerShell {} failed verification — removed from cache",
                    entry.version
                ));
                evicted.push(entry.version.to_string());
            }
        }
    }

    if app.json {
        let body = serde_json::json!({
            "checked": entries.len(),
            "evicted": evicted,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    }
    Ok(ExitCode::SUCCESS)
}

async fn clear(app: &AppContext) -> Result<ExitCode> {
    let entries = list_entries(app, BTreeMap::new()).await?;
    if entries.is_empty() {
        app.output.info("cache is already empty");
        return Ok(ExitCode::SUCCESS);
    }

    let total_mb: u64 = entries.iter().map(|e| e.size_bytes).sum::<u64>() / (1024 * 1024);
    let confirmed = app.confirm(
        &format!(
            "Remove {} cached package(s) ({} MB)?",
            entries.len(),
            total_mb
        ),
        false,
    )?;
    if !confirmed {
        app.output.info("clear cancelled");
        return Ok(ExitCode::SUCCESS);
    }

    let mut removed = 0usize;
    for entry in &entries {
        let cache = cache_for(app);
        let version = entry.version.clone();
        let gone = tokio::task::spawn_blocking(move || cache.evict(&version))
            .await
            .context("cache evict task panicked")??;
        if gone {
            removed += 1;
        }
    }

    if app.json {
        println!("{}", serde_json::json!({ "removed": removed }));
    } else {
        app.output
            .success(&format!("removed {removed} cached package(s)"));
    }
    Ok(ExitCode::SUCCESS)
}

fn state_mark(state: EntryState) -> String {
    match state {
        EntryState::Verified => "✓".green().to_string(),
        EntryState::Mismatch => "✗".red().to_string(),
        EntryState::Unpinned => "?".yellow().to_string(),
    }
}

fn render_json(app: &AppContext, entries: &[CacheEntry]) -> Result<()> {
    let items: Vec<serde_json::Value> = entries
        .iter()
        .map(|e| {
            serde_json::json!({
                "version": e.version.to_string(),
                "path": e.archive_path,
                "size_bytes": e.size_bytes,
                "sha256": e.sha256,
                "state": match e.state {
                    EntryState::Verified => "verified",
                    EntryState::Mismatch => "mismatch",
                    EntryState::Unpinned => "unpinned",
                },
            })
        })
        .collect();
    let body = serde_json::json!({
        "cache_dir": app.cache_dir,
        "entries": items,
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
