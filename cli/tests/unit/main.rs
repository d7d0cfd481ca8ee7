//! Unit tests for the wimforge CLI.
//!
//! These tests use mocked ports and run fast without external I/O.

mod architecture;
mod pipeline_service;
mod property_tests;
