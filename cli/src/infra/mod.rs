//! Infrastructure layer — concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, image
//! servicing, registry hive editing, package caching and download, lock
//! files, worker pools, and state persistence.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod cache;
pub mod command_runner;
pub mod config;
pub mod dism;
pub mod download;
pub mod fs;
pub mod locks;
pub mod mountpoint;
pub mod oscdimg;
pub mod pool;
pub mod registry;
pub mod state;
