//! ISO assembly infrastructure — implements the `IsoBuilder` port.
//!
//! Drives `oscdimg.exe` from the Windows ADK to pack the media tree into
//! a BIOS+UEFI bootable ISO, then verifies the output file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::application::ports::{CommandRunner, IsoBuilder};
use crate::domain::error::PipelineError;
use crate::domain::health::OSCDIMG_ADK_PATHS;
use crate::domain::workspace::IsoReport;

/// Offset of the primary volume descriptor's `CD001` identifier.
const CD001_OFFSET: u64 = 0x8001;

/// Production `IsoBuilder` backed by `oscdimg`.
pub struct OscdimgBuilder<R: CommandRunner> {
    runner: R,
    tool: PathBuf,
    build_timeout: Duration,
}

impl<R: CommandRunner> OscdimgBuilder<R> {
    pub fn new(runner: R, tool: PathBuf, build_timeout: Duration) -> Self {
        Self {
            runner,
            tool,
            build_timeout,
        }
    }
}

/// Locate `oscdimg`: an explicitly configured path wins, then the standard
/// ADK install locations, then a bare PATH lookup.
#[must_use]
pub fn resolve_tool(configured: Option<&Path>) -> PathBuf {
    if let Some(path) = configured {
        return path.to_path_buf();
    }
    for candidate in OSCDIMG_ADK_PATHS {
        let path = Path::new(candidate);
        if path.is_file() {
            return path.to_path_buf();
        }
    }
    PathBuf::from("oscdimg")
}

impl<R: CommandRunner> IsoBuilder for OscdimgBuilder<R> {
    async fn build(&self, media_dir: &Path, output_path: &Path, label: &str) -> Result<IsoReport> {
        let args = build_args(media_dir, output_path, label);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let tool = self.tool.to_string_lossy();
        let output = self
            .runner
            .run_with_timeout(&tool, &arg_refs, self.build_timeout)
            .await
            .context("running oscdimg")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(
                PipelineError::WimProcessing(format!("ISO assembly failed: {detail}")).into(),
            );
        }

        verify_output(output_path).await
    }
}

/// Check the finished ISO: it must exist and be non-empty even when the
/// tool reported success. The `CD001` signature probe is advisory only;
/// its result is surfaced in the report, not as an error.
async fn verify_output(output_path: &Path) -> Result<IsoReport> {
    let metadata = tokio::fs::metadata(output_path)
        .await
        .with_context(|| format!("ISO not found at {}", output_path.display()))?;
    if metadata.len() == 0 {
        return Err(PipelineError::WimProcessing(format!(
            "ISO at {} is empty",
            output_path.display()
        ))
        .into());
    }

    Ok(IsoReport {
        size_bytes: metadata.len(),
        signature_ok: has_cd001_signature(output_path).await,
    })
}

async fn has_cd001_signature(output_path: &Path) -> bool {
    let Ok(mut file) = tokio::fs::File::open(output_path).await else {
        return false;
    };
    if file
        .seek(std::io::SeekFrom::Start(CD001_OFFSET))
        .await
        .is_err()
    {
        return false;
    }
    let mut magic = [0u8; 5];
    file.read_exact(&mut magic).await.is_ok() && &magic == b"CD001"
}

fn build_args(media_dir: &Path, output_path: &Path, label: &str) -> Vec<String> {
    let etfsboot = media_dir.join("boot").join("etfsboot.com");
    let efisys = media_dir
        .join("efi")
        .join("microsoft")
        .join("boot")
        .join("efisys.bin");
    vec![
        format!(
            "-bootdata:2#p0,e,b{}#pEF,e,b{}",
            etfsboot.display(),
            efisys.display()
        ),
        "-m".to_string(),
        "-o".to_string(),
        "-u2".to_string(),
        "-udfver102".to_string(),
        format!("-l{label}"),
        media_dir.display().to_string(),
        output_path.display().to_string(),
    ]
}
