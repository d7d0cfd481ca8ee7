//! Run workspace domain types and pure validation functions.
//!
//! This module is intentionally free of I/O, async, and external layer imports.
//! All functions take data in and return data out.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::PipelineError;

/// Directory name prefix for image mount points.
/// Centralized constant used by the allocator, cleanup, and doctor modules.
pub const MOUNT_DIR_PREFIX: &str = "Mount_";

/// Directory name prefix for runtime staging directories.
pub const STAGING_DIR_PREFIX: &str = "PS7_";

/// File name prefix for persisted run state.
pub const STATE_FILE_PREFIX: &str = "Run_";

/// Boot-media directory names the optimizer must never remove.
pub const PRESERVED_BOOT_DIRS: &[&str] = &["en-us", "fonts", "resources"];

/// How a mounted image is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismountMode {
    /// Write pending changes back into the image file.
    Commit,
    /// Throw pending changes away.
    Discard,
}

/// Per-run workspace paths, all derived from the instance identifier.
///
/// Path derivation is pure so that uniqueness follows directly from
/// identifier uniqueness. Directory creation happens in the infra layer.
#[derive(Debug, Clone)]
pub struct WorkspaceInstance {
    /// Unique run identifier (UUID v4, hyphenated lowercase).
    pub instance_id: String,
    /// Parent directory holding every per-run path.
    pub temp_root: PathBuf,
    /// Image mount point (`Mount_<id>`).
    pub mount_dir: PathBuf,
    /// Runtime extraction directory (`PS7_<id>`).
    pub staging_dir: PathBuf,
    /// Persisted run state (`Run_<id>.json`).
    pub state_file: PathBuf,
}

impl WorkspaceInstance {
    /// Derives every workspace path for `instance_id` under `temp_root`.
    #[must_use]
    pub fn rooted_at(temp_root: &Path, instance_id: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            temp_root: temp_root.to_path_buf(),
            mount_dir: temp_root.join(format!("{MOUNT_DIR_PREFIX}{instance_id}")),
            staging_dir: temp_root.join(format!("{STAGING_DIR_PREFIX}{instance_id}")),
            state_file: temp_root.join(format!("{STATE_FILE_PREFIX}{instance_id}.json")),
        }
    }
}

/// Generate a unique run instance identifier.
///
/// Format: hyphenated lowercase UUID v4.
#[must_use]
pub fn generate_instance_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Validates an instance identifier supplied on the command line.
///
/// # Errors
///
/// Returns an error if the ID is not a valid UUID.
pub fn validate_instance_id(id: &str) -> Result<()> {
    if uuid::Uuid::parse_str(id).is_err() {
        return Err(PipelineError::Validation(format!(
            "'{id}' is not a valid instance ID (expected a UUID)"
        ))
        .into());
    }
    Ok(())
}

/// Pipeline stages a run moves through, persisted between updates so an
/// interrupted run can be diagnosed and cleaned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Init,
    PackageResolved,
    Mounted,
    Customized,
    Dismounted,
    Assembled,
    Cleaned,
    Failed,
}

/// Run state persisted to `<temp_root>/Run_<id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Run identifier, same UUID the workspace paths are derived from.
    pub run_id: String,
    /// When the run started.
    pub created_at: DateTime<Utc>,
    /// When the state last changed.
    pub updated_at: DateTime<Utc>,
    /// Last stage the run reached.
    pub stage: RunStage,
    /// Source image being customized.
    pub wim_path: PathBuf,
    /// Image index inside the WIM.
    pub image_index: u32,
    /// Where the image is (or was) mounted.
    pub mount_dir: PathBuf,
    /// Where the runtime package is (or was) staged.
    pub staging_dir: PathBuf,
    /// Target ISO path.
    pub output_path: PathBuf,
    /// Runtime version being injected.
    pub pwsh_version: String,
    /// Failure message, set only when `stage` is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl RunState {
    #[must_use]
    pub fn new(
        workspace: &WorkspaceInstance,
        wim_path: PathBuf,
        image_index: u32,
        output_path: PathBuf,
        pwsh_version: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id: workspace.instance_id.clone(),
            created_at: now,
            updated_at: now,
            stage: RunStage::Init,
            wim_path,
            image_index,
            mount_dir: workspace.mount_dir.clone(),
            staging_dir: workspace.staging_dir.clone(),
            output_path,
            pwsh_version,
            failure: None,
        }
    }

    /// Moves the run to `stage` and refreshes the update timestamp.
    pub fn advance(&mut self, stage: RunStage) {
        self.stage = stage;
        self.updated_at = Utc::now();
    }

    /// Marks the run failed, keeping the message for later diagnosis.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.stage = RunStage::Failed;
        self.failure = Some(message.into());
        self.updated_at = Utc::now();
    }
}

/// Outcome of assembling an ISO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsoReport {
    /// Final size of the ISO file.
    pub size_bytes: u64,
    /// Whether the ISO 9660 volume descriptor was found where expected.
    pub signature_ok: bool,
}

/// Whether a boot-media directory name looks like a Windows locale folder
/// (e.g. `de-de`, `ja-jp`, `sr-latn-rs`).
#[must_use]
pub fn is_locale_dir(name: &str) -> bool {
    let parts: Vec<&str> = name.split('-').collect();
    if !(2..=3).contains(&parts.len()) {
        return false;
    }
    let lang_ok =
        (2..=3).contains(&parts[0].len()) && parts[0].chars().all(|c| c.is_ascii_alphabetic());
    let rest_ok = parts[1..]
        .iter()
        .all(|part| (2..=4).contains(&part.len()) && part.chars().all(|c| c.is_ascii_alphanumeric()));
    lang_ok && rest_ok
}

/// Whether the optimizer may remove a boot-media directory entry.
///
/// Only locale folders outside the preserved set qualify.
#[must_use]
pub fn is_prunable_boot_dir(name: &str) -> bool {
    is_locale_dir(name)
        && !PRESERVED_BOOT_DIRS
            .iter()
            .any(|kept| name.eq_ignore_ascii_case(kept))
}

/// Encode bytes as lowercase hex string.
///
/// Pure utility used by package hash verification.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(char::from(HEX[(b >> 4) as usize]));
        out.push(char::from(HEX[(b & 0xf) as usize]));
    }
    out
}
