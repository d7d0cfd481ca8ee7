//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

// ── Pipeline errors ───────────────────────────────────────────────────────────

/// Errors raised by the image customization pipeline.
///
/// Every failure surfaced to the user maps onto one of these kinds; the
/// message carries the recovery hint where one exists.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Filesystem error: {0}")]
    FileSystem(String),

    #[error("Administrator privileges required: {0}\n\nRe-run from an elevated prompt.")]
    Permission(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Image servicing failed: {0}")]
    WimProcessing(String),

    #[error("'{operation}' timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Resource busy: {0}")]
    ResourceBusy(String),

    #[error("{0}")]
    Unknown(String),
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to configuration key/value validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown setting: {key}\n\nValid settings: {valid}")]
    UnknownKey { key: String, valid: String },

    #[error("Invalid value for {key}: {value}\n\n{reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

// ── Transient classification ──────────────────────────────────────────────────

/// Message patterns that identify a transient tool failure.
///
/// Matches the conditions external servicing tools emit when an offline
/// image or file is briefly contended: antivirus holding a handle, a
/// previous dismount still settling, a device that has not spun up yet.
const TRANSIENT_PATTERNS: &str = "(?i)used by another process\
    |file (is )?in use\
    |sharing violation\
    |access is denied\
    |device is not ready\
    |timed out|timeout\
    |resource busy\
    |temporarily unavailable";

fn transient_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Pattern is a compile-time constant and cannot fail to parse.
    #[allow(clippy::expect_used)]
    RE.get_or_init(|| Regex::new(TRANSIENT_PATTERNS).expect("valid transient pattern"))
}

/// Classify an error as transient (worth retrying) or fatal.
///
/// Walks the whole cause chain so a transient message wrapped in
/// `anyhow::Context` is still recognized. Anything that does not match
/// a known transient pattern is fatal and must not consume retries.
///
/// A typed [`PipelineError::ResourceBusy`] is always fatal: it reports
/// lock contention with a stuck peer, and queueing retries behind a held
/// lock only delays the inevitable failure. The textual `resource busy`
/// pattern still matches raw operating-system and tool output.
#[must_use]
pub fn is_transient(err: &anyhow::Error) -> bool {
    if err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<PipelineError>(),
            Some(PipelineError::ResourceBusy(_))
        )
    }) {
        return false;
    }
    err.chain()
        .any(|cause| transient_regex().is_match(&cause.to_string()))
}
