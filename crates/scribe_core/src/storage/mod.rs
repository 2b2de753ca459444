//! Transcript persistence.
//!
//! The pipeline only needs `store(text, duration, language) -> id`;
//! [`TranscriptionService`] glues that to the orchestrator.

mod service;
mod store;

pub use service::{ServiceError, StoredTranscription, TranscriptionService, AUTO_LANGUAGE};
pub use store::{JsonFileStore, MemoryStore};

use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stored transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub id: String,
    pub transcript: String,
    pub duration_seconds: u64,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

/// Errors from transcript stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Transcript not found: {0}")]
    NotFound(String),

    #[error("Invalid transcript id: {0:?}")]
    InvalidId(String),
}

impl StoreError {
    /// Create an I/O error with context.
    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable transcript storage.
pub trait TranscriptStore: Send + Sync {
    /// Store a transcript and return its id.
    fn store(&self, text: &str, duration_secs: u64, language: &str) -> StoreResult<String>;

    fn get(&self, id: &str) -> StoreResult<TranscriptRecord>;

    /// All transcripts, newest first.
    fn list(&self) -> StoreResult<Vec<TranscriptRecord>>;
}
