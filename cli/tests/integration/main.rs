//! Integration tests for the wimforge CLI.
//!
//! These tests spawn the actual binary and test end-to-end behavior.
//! They are slower and should be run separately from unit tests.

mod cache_command;
mod config_command;
