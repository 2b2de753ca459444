//! Error types for a transcription request.
//!
//! Stage errors (`MediaError`, `ChunkingError`) convert into
//! [`TranscribeError`]; per-unit ASR failures never surface here, they are
//! recorded in the report instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::chunking::ChunkingError;
use crate::media::MediaError;
use crate::models::TranscriptionReport;

/// Terminal error of a transcription request.
#[derive(Error, Debug)]
pub enum TranscribeError {
    /// The input file does not exist.
    #[error("Input file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Canonical audio could not be produced from the input.
    #[error("Audio extraction failed: {message}")]
    ExtractionFailed { message: String },

    /// Chunk planning produced nothing usable. Recovered internally by the
    /// emergency tier; only seen by callers of the chunking stage itself.
    #[error("Chunking failed: {message}")]
    ChunkingFailed { message: String },

    /// Every fallback tier was exhausted.
    #[error("Transcription failed after all fallbacks: {message}")]
    TranscriptionUnrecoverable { message: String },

    /// The request was cancelled. Units finished before cancellation are
    /// kept in `partial`.
    #[error("Transcription was cancelled")]
    Cancelled {
        partial: Option<Box<TranscriptionReport>>,
    },

    /// Failed to set up the request (work directory, log file).
    #[error("Request setup failed: {message}")]
    Setup { message: String },
}

impl TranscribeError {
    /// Create an extraction failed error.
    pub fn extraction_failed(message: impl Into<String>) -> Self {
        Self::ExtractionFailed {
            message: message.into(),
        }
    }

    /// Create a chunking failed error.
    pub fn chunking_failed(message: impl Into<String>) -> Self {
        Self::ChunkingFailed {
            message: message.into(),
        }
    }

    /// Create an unrecoverable error.
    pub fn unrecoverable(message: impl Into<String>) -> Self {
        Self::TranscriptionUnrecoverable {
            message: message.into(),
        }
    }

    /// Create a setup failed error.
    pub fn setup_failed(message: impl Into<String>) -> Self {
        Self::Setup {
            message: message.into(),
        }
    }

    /// Cancelled with nothing to return.
    pub fn cancelled() -> Self {
        Self::Cancelled { partial: None }
    }

    /// Cancelled after some units completed.
    pub fn cancelled_with(partial: TranscriptionReport) -> Self {
        Self::Cancelled {
            partial: Some(Box::new(partial)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Partial report carried by a cancellation, if any.
    pub fn partial_report(&self) -> Option<&TranscriptionReport> {
        match self {
            Self::Cancelled { partial } => partial.as_deref(),
            _ => None,
        }
    }
}

impl From<MediaError> for TranscribeError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::NotFound(path) => Self::NotFound(path),
            MediaError::ExtractionFailed { message } => Self::extraction_failed(message),
            MediaError::Cancelled => Self::cancelled(),
        }
    }
}

impl From<ChunkingError> for TranscribeError {
    fn from(err: ChunkingError) -> Self {
        match err {
            ChunkingError::Cancelled => Self::cancelled(),
            other => Self::chunking_failed(other.to_string()),
        }
    }
}

/// Result type for transcription requests.
pub type TranscribeResult<T> = Result<T, TranscribeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_errors_map_to_taxonomy() {
        let err: TranscribeError = MediaError::NotFound(PathBuf::from("/x/talk.mp3")).into();
        assert!(matches!(err, TranscribeError::NotFound(_)));
        assert!(err.to_string().contains("/x/talk.mp3"));

        let err: TranscribeError = MediaError::Cancelled.into();
        assert!(err.is_cancelled());
        assert!(err.partial_report().is_none());
    }

    #[test]
    fn no_chunks_becomes_chunking_failed() {
        let err: TranscribeError = ChunkingError::NoChunks { planned: 4 }.into();
        match err {
            TranscribeError::ChunkingFailed { message } => assert!(message.contains("4 planned")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn cancellation_carries_partial_report() {
        let report = TranscriptionReport {
            merged_text: "first part".into(),
            ..Default::default()
        };
        let err = TranscribeError::cancelled_with(report);
        assert_eq!(err.partial_report().unwrap().merged_text, "first part");
    }
}
