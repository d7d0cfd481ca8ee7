//! Infrastructure implementation of the `RunStateStore` port.
//!
//! One JSON file per run (`Run_<id>.json`) under the temp root, written
//! atomically (temp file + rename) on `tokio::task::spawn_blocking` so an
//! interrupted save never leaves a half-written state behind.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::ports::RunStateStore;
use crate::domain::workspace::{RunState, STATE_FILE_PREFIX, validate_instance_id};

/// Run state files live directly under the temp root, next to the run's
/// `Mount_` and `PS7_` directories.
pub struct JsonStateStore {
    temp_root: PathBuf,
}

impl JsonStateStore {
    #[must_use]
    pub fn new(temp_root: PathBuf) -> Self {
        Self { temp_root }
    }

    fn state_path(&self, run_id: &str) -> PathBuf {
        self.temp_root.join(format!("{STATE_FILE_PREFIX}{run_id}.json"))
    }

    fn load_sync(path: &Path) -> Result<Option<RunState>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading state file {}", path.display()))?;
        let state: RunState = serde_json::from_str(&content)
            .with_context(|| format!("parsing state file {}", path.display()))?;
        validate_instance_id(&state.run_id)?;
        Ok(Some(state))
    }

    fn save_sync(path: &Path, state: &RunState) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(state).context("serializing run state")?;

        // Atomic write via temp file then rename.
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("setting permissions on {}", temp_path.display()))?;
        }

        std::fs::rename(&temp_path, path)
            .with_context(|| format!("finalizing state file {}", path.display()))?;
        Ok(())
    }

    fn list_sync(temp_root: &Path) -> Result<Vec<RunState>> {
        if !temp_root.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(temp_root)
            .with_context(|| format!("reading {}", temp_root.display()))?;
        let mut states = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("reading {}", temp_root.display()))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(STATE_FILE_PREFIX) || !name.ends_with(".json") {
                continue;
            }
            // An unreadable or malformed state file is skipped here; the
            // cleanup command reports it as a leftover instead.
            if let Ok(Some(state)) = Self::load_sync(&entry.path()) {
                states.push(state);
            }
        }
        states.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(states)
    }
}

impl RunStateStore for JsonStateStore {
    async fn save(&self, state: &RunState) -> Result<()> {
        let path = self.state_path(&state.run_id);
        let state = state.clone();
        tokio::task::spawn_blocking(move || JsonStateStore::save_sync(&path, &state))
            .await
            .context("state save task panicked")?
    }

    async fn load(&self, run_id: &str) -> Result<Option<RunState>> {
        validate_instance_id(run_id)?;
        let path = self.state_path(run_id);
        tokio::task::spawn_blocking(move || JsonStateStore::load_sync(&path))
            .await
            .context("state load task panicked")?
    }

    async fn delete(&self, run_id: &str) -> Result<()> {
        let path = self.state_path(run_id);
        tokio::task::spawn_blocking(move || {
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("removing state file {}", path.display()))?;
            }
            Ok(())
        })
        .await
        .context("state delete task panicked")?
    }

    async fn list(&self) -> Result<Vec<RunState>> {
        let temp_root = self.temp_root.clone();
        tokio::task::spawn_blocking(move || JsonStateStore::list_sync(&temp_root))
            .await
            .context("state list task panicked")?
    }
}
