//! Command handlers for the wimforge CLI.
//!
//! Each handler wires concrete infrastructure into the application-layer
//! services and renders the outcome.

pub mod build;
pub mod cache;
pub mod cleanup;
pub mod config;
pub mod doctor;
pub mod version;
