//! Transcribe-then-store service.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::{StoreError, TranscriptStore};
use crate::models::{formats, TranscriptionReport};
use crate::orchestrator::{TranscribeError, TranscriptionOrchestrator};

/// Language tag stored when none was given.
pub const AUTO_LANGUAGE: &str = "auto";

/// Errors from [`TranscriptionService::process_and_store`].
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Transcribe(#[from] TranscribeError),

    #[error("Failed to store transcript: {0}")]
    Store(#[from] StoreError),
}

/// Summary of a stored transcription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTranscription {
    pub transcript_id: String,
    pub filename: String,
    pub transcript: String,
    pub duration_seconds: u64,
    pub language: String,
    pub report: TranscriptionReport,
}

/// Runs the orchestrator and hands the merged text to a store.
pub struct TranscriptionService {
    orchestrator: Arc<TranscriptionOrchestrator>,
    store: Arc<dyn TranscriptStore>,
}

impl TranscriptionService {
    pub fn new(orchestrator: Arc<TranscriptionOrchestrator>, store: Arc<dyn TranscriptStore>) -> Self {
        Self { orchestrator, store }
    }

    /// Transcribe `path` and store the result.
    ///
    /// `original_name` is the user-facing file name used for format
    /// validation (uploads often live under a temporary name).
    pub async fn process_and_store(
        &self,
        path: &Path,
        original_name: &str,
        language: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<StoredTranscription, ServiceError> {
        if !formats::is_supported(original_name) {
            return Err(ServiceError::UnsupportedFormat(original_name.to_string()));
        }

        let report = self
            .orchestrator
            .run_transcription(path, language, cancel)
            .await?;

        let language = language
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(AUTO_LANGUAGE)
            .to_string();

        let store = Arc::clone(&self.store);
        let text = report.merged_text.clone();
        let duration = report.duration_secs;
        let lang = language.clone();
        let transcript_id = tokio::task::spawn_blocking(move || store.store(&text, duration, &lang))
            .await
            .map_err(|e| StoreError::Serialize(format!("store task failed: {}", e)))??;

        tracing::info!(
            id = %transcript_id,
            chars = report.merged_text.len(),
            "Stored transcript for {}",
            original_name
        );

        Ok(StoredTranscription {
            transcript_id,
            filename: original_name.to_string(),
            transcript: report.merged_text.clone(),
            duration_seconds: report.duration_secs,
            language,
            report,
        })
    }
}
