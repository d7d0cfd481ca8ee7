//! Job descriptions and results for the parallel customization phase.
//!
//! Jobs are described as plain data so worker pools can run them without
//! knowing anything about the adapters behind them. The function that maps
//! a [`JobSpec`] to work is chosen by the composition root.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::config::RetryPolicy;

/// Cooperative cancellation signal shared between the orchestrator and
/// running jobs. Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything the runtime-injection job needs, as data.
#[derive(Debug, Clone)]
pub struct InjectSpec {
    /// Verified runtime archive to extract.
    pub package_path: PathBuf,
    /// Workspace directory the archive is extracted into.
    pub staging_dir: PathBuf,
    /// Root of the mounted image.
    pub mount_dir: PathBuf,
    /// Directory holding named critical-section lock files.
    pub lock_dir: PathBuf,
    /// Maximum wait for a critical section before giving up.
    pub lock_timeout: Duration,
    /// Backoff policy for the job's individually retried steps.
    pub retry: RetryPolicy,
}

/// Everything the media-optimization job needs, as data.
#[derive(Debug, Clone)]
pub struct OptimizeSpec {
    /// Root of the boot media tree to prune.
    pub media_dir: PathBuf,
    /// Backoff policy for the job's individually retried removals.
    pub retry: RetryPolicy,
}

/// A unit of work for the customization worker pool.
#[derive(Debug, Clone)]
pub enum JobSpec {
    InjectRuntime(InjectSpec),
    OptimizeMedia(OptimizeSpec),
}

impl JobSpec {
    /// Stable job name used in reports and progress output.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            JobSpec::InjectRuntime(_) => "inject-runtime",
            JobSpec::OptimizeMedia(_) => "optimize-media",
        }
    }
}

/// What a job reported when it finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub success: bool,
    pub message: String,
}

impl JobResult {
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// A job's outcome as observed by the coordinator.
///
/// `result` is `None` when the worker never reported back, which is
/// treated as a failure distinct from an explicit `success: false`.
#[derive(Debug, Clone)]
pub struct JobReport {
    /// Name of the job this report belongs to.
    pub job: String,
    /// The job's own result, if the worker delivered one.
    pub result: Option<JobResult>,
}

impl JobReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.success)
    }

    /// Human-readable failure description, or `None` on success.
    #[must_use]
    pub fn failure_summary(&self) -> Option<String> {
        match &self.result {
            Some(r) if r.success => None,
            Some(r) => Some(format!("job '{}' failed: {}", self.job, r.message)),
            None => Some(format!(
                "job '{}' crashed without reporting a result",
                self.job
            )),
        }
    }
}

/// Maps a job description to actual work. Runs on a worker, so it must
/// observe `CancelFlag` between long steps rather than relying on the
/// pool to interrupt it.
pub type JobFn = fn(JobSpec, CancelFlag) -> JobResult;
