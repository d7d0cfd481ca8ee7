//! Application service — customization job result evaluation.

use std::sync::Mutex;

use anyhow::Result;

use crate::application::ports::ProgressReporter;
use crate::domain::error::PipelineError;
use crate::domain::jobs::JobReport;

/// Decide pipeline-level success from the collected job reports.
///
/// Every report is inspected before judging, so a single pass surfaces
/// all failures at once. A report with no result counts as a worker
/// crash, which fails the pipeline like any explicit job failure.
///
/// # Errors
///
/// Returns a `WimProcessing` error joining every failure summary.
pub fn evaluate_reports(reports: &[JobReport]) -> Result<()> {
    let failures: Vec<String> = reports
        .iter()
        .filter_map(JobReport::failure_summary)
        .collect();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::WimProcessing(failures.join("; ")).into())
    }
}

/// Reporter for code running on worker threads. Progress lines would
/// interleave across workers, so steps and successes are dropped and
/// only warnings are kept for the job's final message.
#[derive(Debug, Default)]
pub struct BufferedReporter {
    warnings: Mutex<Vec<String>>,
}

impl BufferedReporter {
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        match self.warnings.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Append the warning count to `message` when any were recorded.
    #[must_use]
    pub fn annotate(&self, message: &str) -> String {
        let warnings = self.warnings();
        if warnings.is_empty() {
            message.to_string()
        } else {
            format!("{message} ({} warning(s))", warnings.len())
        }
    }
}

impl ProgressReporter for BufferedReporter {
    fn step(&self, _message: &str) {}

    fn success(&self, _message: &str) {}

    fn warn(&self, message: &str) {
        if let Ok(mut guard) = self.warnings.lock() {
            guard.push(message.to_string());
        }
    }
}
