//! Media inspection and conditioning through ffmpeg / ffprobe.
//!
//! - [`MediaProbe`] reports duration, size and kind
//! - [`AudioConditioner`] produces mono PCM ready for recognition
//! - [`ToolRunner`] is the seam every external process goes through

pub mod commands;
mod conditioner;
mod probe;
mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use conditioner::{AudioConditioner, ConditionedAudio};
pub use probe::{MediaProbe, DEFAULT_DURATION_SECS};
pub use runner::{
    file_size, run_checked, run_to_file, FfmpegRunner, Invocation, StageContext, Tool, ToolError,
    ToolOutput, ToolRunner,
};

use std::path::PathBuf;

use thiserror::Error;

/// Errors from probing and conditioning.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Input file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Canonical audio could not be produced.
    #[error("Audio extraction failed: {message}")]
    ExtractionFailed { message: String },

    #[error("Cancelled")]
    Cancelled,
}

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;
