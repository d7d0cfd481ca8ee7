//! Retry executor for transient external-tool failures.
//!
//! Imaging tools fail transiently under antivirus scans and slow device
//! teardown ("file in use", "access is denied", timeouts). The runner
//! retries only errors matching the transient taxonomy, with exponential
//! backoff and jitter, and stops early when the run is cancelled.

use std::time::Duration;

use anyhow::Result;

use crate::application::ports::ProgressReporter;
use crate::domain::config::RetryPolicy;
use crate::domain::error::is_transient;
use crate::domain::jobs::CancelFlag;

/// Runs fallible operations under a shared retry policy.
///
/// Both the async orchestrator and the sync job bodies go through the same
/// runner so backoff and cancellation behave identically everywhere.
#[derive(Debug, Clone)]
pub struct RetryRunner {
    policy: RetryPolicy,
    cancel: CancelFlag,
}

impl RetryRunner {
    #[must_use]
    pub fn new(policy: RetryPolicy, cancel: CancelFlag) -> Self {
        Self { policy, cancel }
    }

    /// Total tries: the initial attempt plus configured retries.
    fn total_tries(&self) -> u32 {
        self.policy.max_retries.saturating_add(1)
    }

    /// Run `op`, retrying transient failures. Blocking variant for worker
    /// threads.
    ///
    /// # Errors
    ///
    /// Returns the first non-transient error unchanged, or the last error
    /// (with attempt context) once tries are exhausted or the run is
    /// cancelled.
    pub fn run<T>(
        &self,
        label: &str,
        reporter: &impl ProgressReporter,
        mut op: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let total = self.total_tries();
        let mut attempt = 1u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let delay = self.after_failure(label, reporter, attempt, total, err)?;
                    std::thread::sleep(delay);
                }
            }
            attempt += 1;
        }
    }

    /// Run `op`, retrying transient failures. Async variant for the
    /// orchestrator's own mount, dismount, and download calls.
    ///
    /// # Errors
    ///
    /// Same contract as [`RetryRunner::run`].
    pub async fn run_async<T, Fut>(
        &self,
        label: &str,
        reporter: &impl ProgressReporter,
        mut op: impl FnMut() -> Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let total = self.total_tries();
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let delay = self.after_failure(label, reporter, attempt, total, err)?;
                    tokio::time::sleep(delay).await;
                }
            }
            attempt += 1;
        }
    }

    /// Decide what to do with a failed attempt: propagate the error, or
    /// return the jittered delay to sleep before the next try.
    fn after_failure(
        &self,
        label: &str,
        reporter: &impl ProgressReporter,
        attempt: u32,
        total: u32,
        err: anyhow::Error,
    ) -> Result<Duration> {
        if !is_transient(&err) {
            return Err(err);
        }
        if attempt >= total {
            return Err(err.context(format!("'{label}' still failing after {total} attempts")));
        }
        if self.cancel.is_cancelled() {
            return Err(err.context(format!("'{label}' cancelled while retrying")));
        }
        let delay = jittered(self.policy.delay_for_attempt(attempt));
        reporter.warn(&format!(
            "'{label}' failed (attempt {attempt}/{total}): {err:#}; retrying in {}ms",
            delay.as_millis()
        ));
        Ok(delay)
    }
}

/// Scale a delay by a random factor in `[0.5, 1.5)` so concurrent runs that
/// hit the same contended resource do not retry in lockstep.
fn jittered(base: Duration) -> Duration {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let entropy = RandomState::new().build_hasher().finish();
    #[allow(clippy::cast_precision_loss)]
    let factor = 0.5 + (entropy % 1000) as f64 / 1000.0;
    base.mul_f64(factor)
}
