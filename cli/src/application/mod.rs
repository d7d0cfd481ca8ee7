//! Application layer — port trait definitions and use-case orchestration.
//!
//! This module depends only on `crate::domain` — never on `crate::infra`,
//! `crate::commands`, or `crate::output`.

pub mod ports;
pub mod services;

#[allow(unused_imports)]
pub use ports::{
    COPY_SECTION, CachedPackage, CommandRunner, CriticalSections, HiveStore, HostProbe,
    ImageServicer, IsoBuilder, PackageProvider, ProgressReporter, REGISTRY_SECTION, RunStateStore,
    SectionGuard, WorkerPool, WorkspaceAllocator, WorkspaceFs,
};
