//! Mount-point allocation infrastructure — implements the
//! `WorkspaceAllocator` port.
//!
//! Each run gets fresh `Mount_<uuid>` and `PS7_<uuid>` directories under a
//! shared temp root, so concurrent runs never collide on a mount point.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::ports::WorkspaceAllocator;
use crate::domain::error::PipelineError;
use crate::domain::workspace::{
    MOUNT_DIR_PREFIX, STAGING_DIR_PREFIX, WorkspaceInstance, generate_instance_id,
    validate_instance_id,
};

/// Production `WorkspaceAllocator` rooted at a temp directory.
pub struct DirWorkspaceAllocator {
    temp_root: PathBuf,
}

impl DirWorkspaceAllocator {
    #[must_use]
    pub fn new(temp_root: PathBuf) -> Self {
        Self { temp_root }
    }
}

impl WorkspaceAllocator for DirWorkspaceAllocator {
    async fn allocate(&self, instance_id: Option<String>) -> Result<WorkspaceInstance> {
        let temp_root = self.temp_root.clone();
        tokio::task::spawn_blocking(move || allocate_blocking(&temp_root, instance_id))
            .await
            .context("spawn_blocking for allocate")?
    }

    async fn remove(&self, workspace: &WorkspaceInstance) -> Result<()> {
        let workspace = workspace.clone();
        tokio::task::spawn_blocking(move || {
            remove_if_present(&workspace.mount_dir)?;
            remove_if_present(&workspace.staging_dir)?;
            // Drop the temp root itself once the last run's directories are
            // gone; fails silently while anything else still lives there.
            let _ = std::fs::remove_dir(&workspace.temp_root);
            Ok(())
        })
        .await
        .context("spawn_blocking for remove")?
    }

    async fn scan_leftovers(&self) -> Result<Vec<PathBuf>> {
        let temp_root = self.temp_root.clone();
        tokio::task::spawn_blocking(move || scan_blocking(&temp_root))
            .await
            .context("spawn_blocking for scan_leftovers")?
    }

    async fn remove_leftover(&self, path: &Path) -> Result<()> {
        anyhow::ensure!(
            path.parent() == Some(self.temp_root.as_path()) && is_workspace_dir_name(path),
            "refusing to remove {}: not a workspace directory under {}",
            path.display(),
            self.temp_root.display()
        );
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || remove_if_present(&path))
            .await
            .context("spawn_blocking for remove_leftover")?
    }
}

fn allocate_blocking(temp_root: &Path, instance_id: Option<String>) -> Result<WorkspaceInstance> {
    std::fs::create_dir_all(temp_root)
        .with_context(|| format!("creating temp root {}", temp_root.display()))?;

    if let Some(id) = instance_id {
        validate_instance_id(&id)?;
        let workspace = WorkspaceInstance::rooted_at(temp_root, &id);
        return create_fresh(&workspace).map_err(|err| {
            if is_already_exists(&err) {
                PipelineError::Validation(format!(
                    "workspace '{id}' already exists under {}",
                    temp_root.display()
                ))
                .into()
            } else {
                err
            }
        });
    }

    // Generated IDs collide only if the RNG misbehaves; a few fresh draws
    // cover even that.
    let mut tries = 0u32;
    loop {
        let id = generate_instance_id();
        let workspace = WorkspaceInstance::rooted_at(temp_root, &id);
        match create_fresh(&workspace) {
            Ok(workspace) => return Ok(workspace),
            Err(err) if is_already_exists(&err) && tries < 3 => tries += 1,
            Err(err) => return Err(err),
        }
    }
}

/// Create the run's directories, requiring both to be new.
fn create_fresh(workspace: &WorkspaceInstance) -> Result<WorkspaceInstance> {
    std::fs::create_dir(&workspace.mount_dir)
        .with_context(|| format!("creating mount dir {}", workspace.mount_dir.display()))?;
    if let Err(err) = std::fs::create_dir(&workspace.staging_dir) {
        let _ = std::fs::remove_dir(&workspace.mount_dir);
        return Err(err).with_context(|| {
            format!("creating staging dir {}", workspace.staging_dir.display())
        });
    }
    Ok(workspace.clone())
}

fn is_already_exists(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|io| io.kind() == ErrorKind::AlreadyExists)
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("removing directory {}", path.display()))
        }
    }
}

fn scan_blocking(temp_root: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(temp_root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("listing temp root {}", temp_root.display()));
        }
    };
    let mut leftovers = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("listing temp root {}", temp_root.display()))?;
        let path = entry.path();
        if path.is_dir() && is_workspace_dir_name(&path) {
            leftovers.push(path);
        }
    }
    leftovers.sort();
    Ok(leftovers)
}

fn is_workspace_dir_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(MOUNT_DIR_PREFIX) || n.starts_with(STAGING_DIR_PREFIX))
}
