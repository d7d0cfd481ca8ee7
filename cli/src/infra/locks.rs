//! Lock-file infrastructure — implements the `CriticalSections` port.
//!
//! Sections are plain lock files held via OS advisory locks, so they
//! exclude across processes as well as threads. A crashed holder's lock
//! is released by the OS, never leaving a stale section behind; a clean
//! release also removes the lock file itself.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use fs2::FileExt;

use crate::application::ports::{CriticalSections, SectionGuard};
use crate::domain::error::PipelineError;

/// Production `CriticalSections` backed by lock files under a shared
/// directory.
pub struct FlockSections {
    lock_dir: PathBuf,
    timeout: Duration,
}

impl FlockSections {
    #[must_use]
    pub fn new(lock_dir: PathBuf, timeout: Duration) -> Self {
        Self { lock_dir, timeout }
    }
}

impl CriticalSections for FlockSections {
    fn enter(&self, name: &str) -> Result<SectionGuard> {
        std::fs::create_dir_all(&self.lock_dir)
            .with_context(|| format!("creating lock directory {}", self.lock_dir.display()))?;
        let path = self.lock_dir.join(format!("{name}.lock"));
        let lock = acquire_file_lock(&path, self.timeout, name)?;
        Ok(SectionGuard::new(Some(Box::new(lock))))
    }
}

/// An exclusively held lock file. Dropping the guard removes the file and
/// releases the lock, in that order: the unlink happens while the lock is
/// still held, so a waiter either sees the name disappear or locks an
/// orphaned inode and re-checks against the live path.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Acquire an exclusive advisory lock on `path`, polling until `timeout`.
///
/// Poll intervals are jittered so concurrent waiters do not probe in
/// lockstep. The lock file is created on demand and removed again when
/// the returned guard is dropped.
///
/// # Errors
///
/// Returns `ResourceBusy` when the lock is still held at the deadline,
/// or a filesystem error if the lock file cannot be created.
pub fn acquire_file_lock(path: &Path, timeout: Duration, what: &str) -> Result<FileLock> {
    let deadline = Instant::now() + timeout;
    loop {
        // Re-open every attempt: the previous holder removes the file on
        // release, and on Windows a removed-but-open name refuses new
        // opens until the last handle closes.
        let file = match OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
        {
            Ok(file) => file,
            Err(err) if Instant::now() >= deadline => {
                return Err(err)
                    .with_context(|| format!("opening lock file {}", path.display()));
            }
            Err(_) => {
                std::thread::sleep(poll_interval());
                continue;
            }
        };

        if file.try_lock_exclusive().is_ok() && lock_file_is_current(&file, path) {
            return Ok(FileLock {
                _file: file,
                path: path.to_path_buf(),
            });
        }

        if Instant::now() >= deadline {
            return Err(PipelineError::ResourceBusy(format!(
                "'{what}' is locked by another process (gave up after {}s; lock file {})",
                timeout.as_secs(),
                path.display()
            ))
            .into());
        }
        std::thread::sleep(poll_interval());
    }
}

/// Whether the locked handle still refers to the file at `path`. A holder
/// that unlinked the file between our open and our lock leaves us holding
/// an orphaned inode, which excludes nobody.
#[cfg(unix)]
fn lock_file_is_current(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), std::fs::metadata(path)) {
        (Ok(held), Ok(live)) => held.ino() == live.ino() && held.dev() == live.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn lock_file_is_current(_file: &File, path: &Path) -> bool {
    // A deleted-but-open name cannot be re-opened on Windows, so having
    // the handle at all means the path is live.
    path.exists()
}

/// A random wait in `[50ms, 150ms)`.
fn poll_interval() -> Duration {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let entropy = RandomState::new().build_hasher().finish();
    Duration::from_millis(50 + entropy % 100)
}
