//! Filesystem infrastructure — implements `WorkspaceFs`, `HostProbe`, and
//! raw file helpers shared by the other adapters.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::application::ports::{HostProbe, WorkspaceFs};
use crate::domain::workspace::hex_encode;

/// Production filesystem implementation of `WorkspaceFs` and `HostProbe`.
/// All methods are synchronous; callers on the async side go through
/// `spawn_blocking` or a worker thread.
pub struct StdWorkspaceFs;

impl WorkspaceFs for StdWorkspaceFs {
    fn extract_archive(&self, archive: &Path, dest: &Path) -> Result<usize> {
        let file = std::fs::File::open(archive)
            .with_context(|| format!("opening archive {}", archive.display()))?;
        let mut zip = zip::ZipArchive::new(file)
            .with_context(|| format!("reading archive {}", archive.display()))?;
        std::fs::create_dir_all(dest)
            .with_context(|| format!("creating directory {}", dest.display()))?;
        zip.extract(dest)
            .with_context(|| format!("extracting into {}", dest.display()))?;
        Ok(zip.len())
    }

    fn copy_tree(&self, from: &Path, to: &Path) -> Result<u64> {
        let mut copied = 0u64;
        for entry in WalkDir::new(from) {
            let entry = entry.with_context(|| format!("walking {}", from.display()))?;
            let rel = entry
                .path()
                .strip_prefix(from)
                .with_context(|| format!("relativizing {}", entry.path().display()))?;
            let target = to.join(rel);
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target)
                    .with_context(|| format!("creating directory {}", target.display()))?;
            } else {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("creating directory {}", parent.display()))?;
                }
                std::fs::copy(entry.path(), &target).with_context(|| {
                    format!("copying {} to {}", entry.path().display(), target.display())
                })?;
                copied += 1;
            }
        }
        Ok(copied)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        std::fs::copy(from, to)
            .with_context(|| format!("copying {} to {}", from.display(), to.display()))?;
        Ok(())
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<()> {
        std::fs::write(path, contents)
            .with_context(|| format!("writing file {}", path.display()))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)
            .with_context(|| format!("listing directory {}", path.display()))?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("listing directory {}", path.display()))?;
            paths.push(entry.path());
        }
        Ok(paths)
    }

    fn remove_tree(&self, path: &Path) -> Result<u64> {
        let bytes = tree_size(path);
        std::fs::remove_dir_all(path)
            .with_context(|| format!("removing directory {}", path.display()))?;
        Ok(bytes)
    }

    fn remove_file(&self, path: &Path) -> Result<u64> {
        let bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        std::fs::remove_file(path)
            .with_context(|| format!("removing file {}", path.display()))?;
        Ok(bytes)
    }

    fn find_by_extension(&self, root: &Path, exts: &[&str]) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry.with_context(|| format!("walking {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let matches = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| exts.iter().any(|want| e.eq_ignore_ascii_case(want)));
            if matches {
                found.push(entry.path().to_path_buf());
            }
        }
        Ok(found)
    }
}

impl HostProbe for StdWorkspaceFs {
    fn disk_space_gb(&self, path: &Path) -> Result<u64> {
        // The directory may not exist yet; probe the nearest existing
        // ancestor so a fresh temp root still reports its volume.
        let mut probe = path;
        while !probe.exists() {
            probe = probe
                .parent()
                .ok_or_else(|| anyhow::anyhow!("no existing ancestor for {}", path.display()))?;
        }
        let bytes = fs2::available_space(probe)
            .with_context(|| format!("querying free space under {}", probe.display()))?;
        Ok(bytes / (1024 * 1024 * 1024))
    }

    fn is_writable(&self, path: &Path) -> Result<bool> {
        if std::fs::create_dir_all(path).is_err() {
            return Ok(false);
        }
        let probe = path.join(format!(".wimforge_probe_{}", std::process::id()));
        let writable = std::fs::write(&probe, b"probe").is_ok();
        let _ = std::fs::remove_file(&probe);
        Ok(writable)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    #[cfg(windows)]
    fn is_elevated(&self) -> bool {
        // `net session` succeeds only from an elevated prompt.
        std::process::Command::new("net")
            .args(["session"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[cfg(unix)]
    fn is_elevated(&self) -> bool {
        use std::os::unix::fs::MetadataExt;
        unix_elevated(
            std::fs::metadata("/proc/self").ok().map(|m| m.uid()),
            std::env::var_os("USER"),
        )
    }

    #[cfg(not(any(windows, unix)))]
    fn is_elevated(&self) -> bool {
        false
    }
}

/// `/proc/self` is owned by the process's effective uid, so its owner
/// being 0 means the process runs as root regardless of what the login
/// environment claims. Hosts without procfs fall back to the login name.
#[cfg(unix)]
fn unix_elevated(euid: Option<u32>, user: Option<std::ffi::OsString>) -> bool {
    match euid {
        Some(uid) => uid == 0,
        None => user.is_some_and(|u| u == "root"),
    }
}

/// Compute the SHA256 hex digest of a file.
///
/// Reads the file in 64 KB chunks to avoid loading large files into memory.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 65536];
    loop {
        let n = file.read(&mut buf).context("reading file")?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

/// Total size of all files under `path`, tolerating entries that vanish
/// mid-walk.
fn tree_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// The per-user wimforge directory (`~/.wimforge`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn wimforge_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))
        .map(|h| h.join(".wimforge"))
}

/// Default package cache directory (`~/.wimforge/cache`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_cache_dir() -> Result<PathBuf> {
    Ok(wimforge_dir()?.join("cache"))
}

/// Default workspace temp root (`<system temp>/wimforge`).
#[must_use]
pub fn default_temp_root() -> PathBuf {
    std::env::temp_dir().join("wimforge")
}
