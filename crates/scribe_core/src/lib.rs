//! Scribe Core - media conditioning and chunked transcription
//!
//! This crate contains all pipeline logic with zero UI dependencies.
//! It can be used by the CLI or embedded in a service.

pub mod asr;
pub mod chunking;
pub mod config;
pub mod logging;
pub mod media;
pub mod models;
pub mod orchestrator;
pub mod storage;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
