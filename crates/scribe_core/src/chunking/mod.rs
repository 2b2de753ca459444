//! Adaptive chunking of conditioned audio.
//!
//! [`plan`] holds the pure sizing math; [`AdaptiveChunker`] runs the
//! encodes and the bitrate fallback ladder.

mod chunker;
pub mod plan;

pub use chunker::{AdaptiveChunker, ChunkingOutput};

use thiserror::Error;

/// Errors from chunk materialization.
#[derive(Error, Debug)]
pub enum ChunkingError {
    /// Every planned chunk failed to encode.
    #[error("No chunks could be produced ({planned} planned)")]
    NoChunks { planned: usize },

    #[error("Cancelled")]
    Cancelled,
}

/// Result type for chunking operations.
pub type ChunkingResult<T> = Result<T, ChunkingError>;
