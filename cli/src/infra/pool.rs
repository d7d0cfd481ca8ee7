//! Worker pool infrastructure — implements the `WorkerPool` port.
//!
//! Two implementations: `TokioWorkerPool` runs job bodies on the runtime's
//! blocking thread pool, `ThreadWorkerPool` on plain OS threads for
//! environments without a multi-threaded runtime. `select_worker_pool`
//! picks one at startup; the choice is never re-probed mid-run.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::application::ports::WorkerPool;
use crate::domain::error::PipelineError;
use crate::domain::jobs::{CancelFlag, JobFn, JobReport, JobSpec};

/// Width of the fallback thread pool. The customization phase never has
/// more than a handful of jobs.
pub const DEFAULT_WORKERS: usize = 2;

/// Pool selected once at startup.
pub enum AnyWorkerPool {
    Tokio(TokioWorkerPool),
    Threads(ThreadWorkerPool),
}

impl AnyWorkerPool {
    /// Name of the selected implementation, for startup diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            AnyWorkerPool::Tokio(_) => "tokio-blocking",
            AnyWorkerPool::Threads(_) => "os-threads",
        }
    }
}

impl WorkerPool for AnyWorkerPool {
    async fn run_all(
        &self,
        jobs: Vec<JobSpec>,
        run: JobFn,
        cancel: CancelFlag,
        timeout: Duration,
    ) -> Result<Vec<JobReport>> {
        match self {
            AnyWorkerPool::Tokio(pool) => pool.run_all(jobs, run, cancel, timeout).await,
            AnyWorkerPool::Threads(pool) => pool.run_all(jobs, run, cancel, timeout).await,
        }
    }
}

/// Pick the pool implementation for this process: the runtime's blocking
/// pool when a multi-threaded runtime is active, OS threads otherwise.
#[must_use]
pub fn select_worker_pool() -> AnyWorkerPool {
    let multi_thread = tokio::runtime::Handle::try_current()
        .map(|h| matches!(h.runtime_flavor(), tokio::runtime::RuntimeFlavor::MultiThread))
        .unwrap_or(false);
    if multi_thread {
        AnyWorkerPool::Tokio(TokioWorkerPool)
    } else {
        AnyWorkerPool::Threads(ThreadWorkerPool::new(DEFAULT_WORKERS))
    }
}

/// `WorkerPool` backed by `tokio::task::spawn_blocking`.
pub struct TokioWorkerPool;

impl WorkerPool for TokioWorkerPool {
    async fn run_all(
        &self,
        jobs: Vec<JobSpec>,
        run: JobFn,
        cancel: CancelFlag,
        timeout: Duration,
    ) -> Result<Vec<JobReport>> {
        let handles: Vec<(String, tokio::task::JoinHandle<_>)> = jobs
            .into_iter()
            .map(|job| {
                let name = job.name().to_string();
                let cancel = cancel.clone();
                (name, tokio::task::spawn_blocking(move || run(job, cancel)))
            })
            .collect();

        let collect = async {
            let mut reports = Vec::with_capacity(handles.len());
            for (name, handle) in handles {
                // A join error means the job panicked: report "no result"
                // rather than tearing the whole phase down.
                let result = handle.await.ok();
                reports.push(JobReport { job: name, result });
            }
            reports
        };

        tokio::select! {
            reports = collect => Ok(reports),
            () = tokio::time::sleep(timeout) => {
                // Raise the flag so still-running bodies stop at their next
                // cancellation check; their partial results are discarded.
                cancel.cancel();
                Err(timeout_error(timeout))
            }
        }
    }
}

/// `WorkerPool` backed by plain OS threads. Blocks the calling thread for
/// the duration of the phase; only used where no multi-threaded runtime is
/// available.
pub struct ThreadWorkerPool {
    workers: usize,
}

impl ThreadWorkerPool {
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }
}

impl WorkerPool for ThreadWorkerPool {
    async fn run_all(
        &self,
        jobs: Vec<JobSpec>,
        run: JobFn,
        cancel: CancelFlag,
        timeout: Duration,
    ) -> Result<Vec<JobReport>> {
        let expected = jobs.len();
        let queue = Arc::new(std::sync::Mutex::new(
            jobs.into_iter().collect::<std::collections::VecDeque<_>>(),
        ));
        let (tx, rx) = mpsc::channel::<JobReport>();

        let width = self.workers.min(expected);
        for _ in 0..width {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                loop {
                    let job = match queue.lock() {
                        Ok(mut q) => q.pop_front(),
                        Err(_) => None,
                    };
                    let Some(job) = job else { break };
                    let name = job.name().to_string();
                    let cancel_for_job = cancel.clone();
                    // Contain a panicking job body: its report carries no
                    // result, which the coordinator treats as a crash.
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        run(job, cancel_for_job)
                    }))
                    .ok();
                    if tx.send(JobReport { job: name, result }).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let deadline = Instant::now() + timeout;
        let mut reports = Vec::with_capacity(expected);
        while reports.len() < expected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                cancel.cancel();
                return Err(timeout_error(timeout));
            }
            match rx.recv_timeout(remaining) {
                Ok(report) => reports.push(report),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    cancel.cancel();
                    return Err(timeout_error(timeout));
                }
                // All senders gone with reports missing: workers died
                // without reporting.
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(reports)
    }
}

fn timeout_error(timeout: Duration) -> anyhow::Error {
    PipelineError::Timeout {
        operation: "customization jobs".to_string(),
        seconds: timeout.as_secs(),
    }
    .into()
}
