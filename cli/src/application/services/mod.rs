//! Application services — use-case orchestration.
//!
//! Each service module implements a single use-case by composing domain logic
//! with port trait calls. Services import only from `crate::domain` and
//! `crate::application::ports` — never from `crate::infra`, `crate::commands`,
//! or `crate::output`.

pub mod cleanup;
pub mod doctor;
pub mod inject;
pub mod jobs;
pub mod optimize;
pub mod pipeline;
pub mod retry;

#[cfg(test)]
pub(crate) mod test_support;
