//! HTTPS download infrastructure with resume support.
//!
//! Downloads stream into a `.partial` file next to the destination and are
//! finalized by rename, so an interrupted transfer never leaves a
//! half-written file where the cache could trust it. A later attempt
//! resumes from the partial file via a `Range` request.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::domain::error::PipelineError;

/// Download `url` to `dest`, resuming a previous partial transfer when one
/// exists. HTTPS only; the agent negotiates TLS 1.2+.
///
/// # Errors
///
/// Returns a `Configuration` error for non-HTTPS URLs, a `Timeout` error
/// when the transfer exceeds `timeout`, and a `FileSystem`/HTTP error
/// otherwise.
pub fn download_file(url: &str, dest: &Path, timeout: Duration, show_progress: bool) -> Result<()> {
    if !url.starts_with("https://") {
        return Err(PipelineError::Configuration(format!(
            "refusing non-HTTPS download URL '{url}'"
        ))
        .into());
    }

    let partial = partial_path(dest);
    let existing = partial.metadata().map(|m| m.len()).unwrap_or(0);
    transfer(url, dest, &partial, existing, timeout, show_progress, true)
}

fn transfer(
    url: &str,
    dest: &Path,
    partial: &Path,
    existing: u64,
    timeout: Duration,
    show_progress: bool,
    allow_restart: bool,
) -> Result<()> {
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();
    let req = agent.get(url);
    let req = if existing > 0 {
        req.set("Range", &format!("bytes={existing}-"))
    } else {
        req
    };

    let response = match req.call() {
        Ok(r) => r,
        // The partial file already covers (or overshoots) the remote size;
        // it cannot be trusted, so start over once.
        Err(ureq::Error::Status(416, _)) if allow_restart => {
            let _ = std::fs::remove_file(partial);
            return transfer(url, dest, partial, 0, timeout, show_progress, false);
        }
        Err(ureq::Error::Status(code, _)) => {
            anyhow::bail!("download failed: HTTP {code} from {url}")
        }
        Err(err) => {
            return Err(anyhow::Error::from(err)).context(format!("download interrupted: {url}"));
        }
    };

    let status = response.status();
    let (mut file, start_pos) = open_partial(status, partial, existing)?;
    let total = response
        .header("Content-Length")
        .and_then(|v| v.parse::<u64>().ok())
        .map(|len| if status == 206 { start_pos + len } else { len });

    let bar = progress_bar(show_progress, total, start_pos);
    let mut reader = response.into_reader();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("download interrupted: {url}"))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .with_context(|| format!("writing {}", partial.display()))?;
        bar.inc(n as u64);
    }
    bar.finish_and_clear();
    drop(file);

    std::fs::rename(partial, dest)
        .with_context(|| format!("finalizing download at {}", dest.display()))?;
    Ok(())
}

fn open_partial(status: u16, partial: &Path, existing: u64) -> Result<(File, u64)> {
    match status {
        206 => {
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(partial)
                .with_context(|| format!("opening partial file {}", partial.display()))?;
            Ok((file, existing))
        }
        200 => {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(partial)
                .with_context(|| format!("opening partial file {}", partial.display()))?;
            Ok((file, 0))
        }
        other => anyhow::bail!("download failed: HTTP {other}"),
    }
}

fn progress_bar(show_progress: bool, total: Option<u64>, start_pos: u64) -> ProgressBar {
    if !show_progress {
        return ProgressBar::hidden();
    }
    match total {
        Some(len) => {
            let bar = ProgressBar::new(len);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("    {bar:40.cyan/dim} {percent}%  {bytes}/{total_bytes}  {bytes_per_sec}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("━━─"),
            );
            bar.set_position(start_pos);
            bar
        }
        None => ProgressBar::new_spinner(),
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut s = dest.as_os_str().to_owned();
    s.push(".partial");
    PathBuf::from(s)
}
