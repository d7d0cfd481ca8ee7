//! Domain layer — pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod config;
pub mod error;
pub mod health;
pub mod jobs;
pub mod pwsh;
pub mod workspace;

#[allow(unused_imports)]
pub use config::{
    IsoConfig, PwshConfig, RetryPolicy, TimeoutConfig, WimforgeConfig, validate_config,
    validate_config_key, validate_config_value,
};
#[allow(unused_imports)]
pub use error::{ConfigError, PipelineError, is_transient};
#[allow(unused_imports)]
pub use health::{CheckStatus, EnvironmentReport, ToolCheck};
#[allow(unused_imports)]
pub use jobs::{CancelFlag, JobFn, JobReport, JobResult, JobSpec};
#[allow(unused_imports)]
pub use workspace::{DismountMode, IsoReport, RunStage, RunState, WorkspaceInstance};
