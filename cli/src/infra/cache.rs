//! Package cache infrastructure — implements the `PackageProvider` port.
//!
//! The cache is content addressed: an archive is trusted only while its
//! recomputed SHA-256 matches the hash pinned in configuration. Every
//! read/validate/write sequence for an entry runs under that entry's lock
//! file, so concurrent builds sharing a cache never corrupt each other.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use semver::Version;

use crate::application::ports::{CachedPackage, PackageProvider};
use crate::domain::error::PipelineError;
use crate::domain::pwsh::artifact_name;
use crate::infra::download::download_file;
use crate::infra::fs::sha256_file;
use crate::infra::locks::acquire_file_lock;

/// Hash state of one cache entry, as reported by `wimforge cache status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Recomputed hash matches the pinned hash.
    Verified,
    /// Recomputed hash differs from the pinned hash.
    Mismatch,
    /// No hash is pinned for this version.
    Unpinned,
}

/// One archive found in the cache directory.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub version: Version,
    pub archive_path: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
    pub state: EntryState,
}

/// Verified, lock-guarded package cache rooted at a directory.
pub struct PackageCache {
    root: PathBuf,
    lock_timeout: Duration,
}

impl PackageCache {
    #[must_use]
    pub fn new(root: PathBuf, lock_timeout: Duration) -> Self {
        Self { root, lock_timeout }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `version`'s archive lives (or would live) in the cache.
    #[must_use]
    pub fn artifact_path(&self, version: &Version) -> PathBuf {
        self.root.join(artifact_name(version))
    }

    fn sidecar_path(&self, version: &Version) -> PathBuf {
        sidecar_for(&self.artifact_path(version))
    }

    fn lock_path(&self, version: &Version) -> PathBuf {
        let mut name = artifact_name(version);
        name.push_str(".lock");
        self.root.join(name)
    }

    /// Return the verified archive for `version`, or `None` when the cache
    /// has no trustworthy copy. A copy whose hash does not match
    /// `expected_sha256` is deleted together with its sidecar on the way.
    ///
    /// # Errors
    ///
    /// Returns `ResourceBusy` when the entry's lock cannot be acquired
    /// within the configured timeout, or a filesystem error from hashing.
    pub fn get(&self, version: &Version, expected_sha256: &str) -> Result<Option<CachedPackage>> {
        if !self.artifact_path(version).is_file() {
            return Ok(None);
        }
        let _lock = acquire_file_lock(
            &self.lock_path(version),
            self.lock_timeout,
            &artifact_name(version),
        )?;
        self.get_locked(version, expected_sha256)
    }

    /// `get` body for callers already holding the entry's lock. Re-probes
    /// existence: a peer may have evicted or filled the entry while the
    /// caller waited for the lock.
    fn get_locked(
        &self,
        version: &Version,
        expected_sha256: &str,
    ) -> Result<Option<CachedPackage>> {
        let artifact = self.artifact_path(version);
        if !artifact.is_file() {
            return Ok(None);
        }

        let actual = verified_hash(&artifact)?;
        if !actual.eq_ignore_ascii_case(expected_sha256) {
            evict_entry(&artifact)?;
            return Ok(None);
        }

        Ok(Some(CachedPackage {
            version: version.clone(),
            archive_path: artifact,
            sha256: actual,
            lock_path: self.lock_path(version),
        }))
    }

    /// Move a downloaded archive into the cache after verifying it against
    /// `expected_sha256`, and write its hash sidecar.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error (and deletes `source`) when the hash
    /// does not match, or `ResourceBusy` on lock contention.
    pub fn store(
        &self,
        version: &Version,
        source: &Path,
        expected_sha256: &str,
    ) -> Result<CachedPackage> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("creating cache directory {}", self.root.display()))?;
        let _lock = acquire_file_lock(
            &self.lock_path(version),
            self.lock_timeout,
            &artifact_name(version),
        )?;
        self.store_locked(version, source, expected_sha256)
    }

    fn store_locked(
        &self,
        version: &Version,
        source: &Path,
        expected_sha256: &str,
    ) -> Result<CachedPackage> {
        let actual = sha256_file(source)?;
        if !actual.eq_ignore_ascii_case(expected_sha256) {
            let _ = std::fs::remove_file(source);
            return Err(PipelineError::Validation(format!(
                "downloaded package for {version} failed verification \
                 (expected sha256 {expected_sha256}, got {actual})"
            ))
            .into());
        }

        let artifact = self.artifact_path(version);
        move_file(source, &artifact)?;
        // Sidecar goes last so its mtime is never older than the artifact's.
        std::fs::write(self.sidecar_path(version), actual.to_lowercase())
            .with_context(|| format!("writing hash sidecar for {}", artifact.display()))?;

        Ok(CachedPackage {
            version: version.clone(),
            archive_path: artifact,
            sha256: actual.to_lowercase(),
            lock_path: self.lock_path(version),
        })
    }

    /// Fill the cache for `version` by running `fetch`, with the whole
    /// probe/download/verify/store sequence under the entry's lock. A
    /// caller that waited on a peer doing the same download reuses the
    /// peer's verified copy instead of downloading again.
    ///
    /// `fetch` receives the staging path to write the archive to. Staging
    /// lands next to the final artifact so the store step is a same-volume
    /// rename, never a cross-device copy; sharing the staging name across
    /// processes is safe because the entry lock spans the download.
    ///
    /// # Errors
    ///
    /// Returns `ResourceBusy` on lock contention, `fetch`'s own error, or
    /// a `Validation` error when the fetched archive fails verification.
    pub fn populate(
        &self,
        version: &Version,
        expected_sha256: &str,
        fetch: impl FnOnce(&Path) -> Result<()>,
    ) -> Result<CachedPackage> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("creating cache directory {}", self.root.display()))?;
        let _lock = acquire_file_lock(
            &self.lock_path(version),
            self.lock_timeout,
            &artifact_name(version),
        )?;

        if let Some(package) = self.get_locked(version, expected_sha256)? {
            return Ok(package);
        }

        let staging = self.artifact_path(version).with_extension("zip.download");
        fetch(&staging)?;
        self.store_locked(version, &staging, expected_sha256)
    }

    /// Delete `version`'s archive and sidecar, returning whether anything
    /// was removed.
    ///
    /// # Errors
    ///
    /// Returns `ResourceBusy` on lock contention, or a filesystem error.
    pub fn evict(&self, version: &Version) -> Result<bool> {
        let artifact = self.artifact_path(version);
        let _lock = acquire_file_lock(
            &self.lock_path(version),
            self.lock_timeout,
            &artifact_name(version),
        )?;
        if !artifact.exists() {
            return Ok(false);
        }
        evict_entry(&artifact)?;
        Ok(true)
    }

    /// Every archive in the cache directory, with its hash checked against
    /// `pinned` (version string → expected hash).
    ///
    /// # Errors
    ///
    /// Returns an error when the cache directory cannot be listed or an
    /// archive cannot be hashed.
    pub fn entries(
        &self,
        pinned: &std::collections::BTreeMap<String, String>,
    ) -> Result<Vec<CacheEntry>> {
        let dir = match std::fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("listing cache directory {}", self.root.display()));
            }
        };

        let mut entries = Vec::new();
        for item in dir {
            let item =
                item.with_context(|| format!("listing cache directory {}", self.root.display()))?;
            let path = item.path();
            let Some(version) = version_from_artifact(&path) else {
                continue;
            };
            let size_bytes = item.metadata().map(|m| m.len()).unwrap_or(0);
            let sha256 = verified_hash(&path)?;
            let state = match pinned.get(&version.to_string()) {
                Some(expected) if sha256.eq_ignore_ascii_case(expected) => EntryState::Verified,
                Some(_) => EntryState::Mismatch,
                None => EntryState::Unpinned,
            };
            entries.push(CacheEntry {
                version,
                archive_path: path,
                size_bytes,
                sha256,
                state,
            });
        }
        entries.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(entries)
    }
}

/// Production `PackageProvider`: the cache plus the download that fills it.
pub struct CachingPackageProvider {
    root: PathBuf,
    lock_timeout: Duration,
    download_timeout: Duration,
}

impl CachingPackageProvider {
    #[must_use]
    pub fn new(root: PathBuf, lock_timeout: Duration, download_timeout: Duration) -> Self {
        Self {
            root,
            lock_timeout,
            download_timeout,
        }
    }

    fn cache(&self) -> PackageCache {
        PackageCache::new(self.root.clone(), self.lock_timeout)
    }
}

impl PackageProvider for CachingPackageProvider {
    async fn cached(
        &self,
        version: &Version,
        expected_sha256: &str,
    ) -> Result<Option<CachedPackage>> {
        let cache = self.cache();
        let version = version.clone();
        let expected = expected_sha256.to_string();
        tokio::task::spawn_blocking(move || cache.get(&version, &expected))
            .await
            .context("spawn_blocking for cache probe")?
    }

    async fn fetch_and_store(
        &self,
        version: &Version,
        url: &str,
        expected_sha256: &str,
        show_progress: bool,
    ) -> Result<CachedPackage> {
        let cache = self.cache();
        let version = version.clone();
        let url = url.to_string();
        let expected = expected_sha256.to_string();
        let timeout = self.download_timeout;
        tokio::task::spawn_blocking(move || {
            cache.populate(&version, &expected, |staging| {
                download_file(&url, staging, timeout, show_progress)
            })
        })
        .await
        .context("spawn_blocking for package download")?
    }
}

/// Hash of `artifact`, trusting the sidecar while it is at least as new as
/// the artifact and recomputing (and rewriting the sidecar) otherwise.
fn verified_hash(artifact: &Path) -> Result<String> {
    let sidecar = sidecar_for(artifact);
    if sidecar_is_current(artifact, &sidecar) {
        let cached = std::fs::read_to_string(&sidecar)
            .with_context(|| format!("reading hash sidecar {}", sidecar.display()))?;
        let cached = cached.trim();
        if crate::domain::config::is_sha256_hex(cached) {
            return Ok(cached.to_lowercase());
        }
    }
    let actual = sha256_file(artifact)?;
    std::fs::write(&sidecar, &actual)
        .with_context(|| format!("writing hash sidecar {}", sidecar.display()))?;
    Ok(actual)
}

fn sidecar_is_current(artifact: &Path, sidecar: &Path) -> bool {
    let Ok(artifact_mtime) = std::fs::metadata(artifact).and_then(|m| m.modified()) else {
        return false;
    };
    let Ok(sidecar_mtime) = std::fs::metadata(sidecar).and_then(|m| m.modified()) else {
        return false;
    };
    sidecar_mtime >= artifact_mtime
}

fn sidecar_for(artifact: &Path) -> PathBuf {
    let mut s = artifact.as_os_str().to_owned();
    s.push(".sha256");
    PathBuf::from(s)
}

fn evict_entry(artifact: &Path) -> Result<()> {
    std::fs::remove_file(artifact)
        .with_context(|| format!("deleting corrupt archive {}", artifact.display()))?;
    let sidecar = sidecar_for(artifact);
    match std::fs::remove_file(&sidecar) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("deleting hash sidecar {}", sidecar.display()))
        }
    }
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            // Different volume: copy then delete.
            std::fs::copy(from, to)
                .with_context(|| format!("copying {} to {}", from.display(), to.display()))?;
            std::fs::remove_file(from)
                .with_context(|| format!("removing {}", from.display()))
        }
    }
}

/// Parse `PowerShell-{version}-win-x64.zip` back into a version.
fn version_from_artifact(path: &Path) -> Option<Version> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_prefix("PowerShell-")?.strip_suffix("-win-x64.zip")?;
    Version::parse(stem).ok()
}
