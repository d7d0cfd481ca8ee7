//! Offline registry infrastructure — implements the `HiveStore` port.
//!
//! Drives the Windows `reg.exe` tool. Each operation is a separate child
//! process, so no hive file handle outlives its call and unload never
//! waits on this process releasing one.

use std::path::Path;

use anyhow::{Context, Result};

use crate::application::ports::HiveStore;
use crate::domain::error::PipelineError;

/// Production `HiveStore` backed by `reg.exe`. Synchronous — runs on
/// worker threads.
pub struct RegExeHive;

impl HiveStore for RegExeHive {
    fn load(&self, hive_file: &Path, mount_key: &str) -> Result<()> {
        let args = load_args(hive_file, mount_key);
        run_reg(&args)
    }

    fn unload(&self, mount_key: &str) -> Result<()> {
        let args = unload_args(mount_key);
        run_reg(&args)
    }

    fn set_value(
        &self,
        mount_key: &str,
        subkey: &str,
        value_name: Option<&str>,
        data: &str,
    ) -> Result<()> {
        let args = add_args(mount_key, subkey, value_name, data);
        run_reg(&args)
    }
}

fn hive_root(mount_key: &str) -> String {
    format!(r"HKLM\{mount_key}")
}

fn load_args(hive_file: &Path, mount_key: &str) -> Vec<String> {
    vec![
        "load".to_string(),
        hive_root(mount_key),
        hive_file.to_string_lossy().into_owned(),
    ]
}

fn unload_args(mount_key: &str) -> Vec<String> {
    vec!["unload".to_string(), hive_root(mount_key)]
}

/// `reg add` arguments for a string value. `value_name` of `None` targets
/// the key's default value (`/ve`).
fn add_args(mount_key: &str, subkey: &str, value_name: Option<&str>, data: &str) -> Vec<String> {
    let mut args = vec!["add".to_string(), format!(r"HKLM\{mount_key}\{subkey}")];
    match value_name {
        Some(name) => {
            args.push("/v".to_string());
            args.push(name.to_string());
        }
        None => args.push("/ve".to_string()),
    }
    args.extend([
        "/t".to_string(),
        "REG_SZ".to_string(),
        "/d".to_string(),
        data.to_string(),
        "/f".to_string(),
    ]);
    args
}

fn run_reg(args: &[String]) -> Result<()> {
    let output = std::process::Command::new("reg")
        .args(args)
        .output()
        .context("failed to spawn reg")?;
    if output.status.success() {
        return Ok(());
    }
    let verb = args.first().map_or("", String::as_str);
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(PipelineError::WimProcessing(format!("reg {verb} failed: {}", stderr.trim())).into())
}
