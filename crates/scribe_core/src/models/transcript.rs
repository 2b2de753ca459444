//! Per-unit transcription outcomes and the final report.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Result of transcribing one unit (the whole file or a single chunk).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionOutcome {
    /// Zero-based chunk index (0 for a direct transcription).
    pub index: usize,
    /// Transcribed text (empty on failure).
    pub text: String,
    /// Whether the ASR call eventually succeeded.
    pub succeeded: bool,
    /// Last error seen when the unit failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl TranscriptionOutcome {
    /// A successful unit.
    pub fn success(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            succeeded: true,
            error_detail: None,
        }
    }

    /// A unit that failed after its retries were used up.
    pub fn failure(index: usize, detail: impl Into<String>) -> Self {
        Self {
            index,
            text: String::new(),
            succeeded: false,
            error_detail: Some(detail.into()),
        }
    }
}

/// Which tier produced the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionPath {
    /// One call on the whole conditioned file.
    #[default]
    Direct,
    /// Adaptive chunking of the conditioned file.
    Chunked,
    /// Maximally compressed re-encode, direct or re-chunked.
    Emergency,
}

impl std::fmt::Display for TranscriptionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptionPath::Direct => write!(f, "direct"),
            TranscriptionPath::Chunked => write!(f, "chunked"),
            TranscriptionPath::Emergency => write!(f, "emergency"),
        }
    }
}

/// A non-fatal quality reduction applied while producing the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// Loudness normalization fell back to a plain copy or was skipped.
    NormalizationSkipped { reason: String },
    /// Noise reduction could not be applied.
    DenoiseSkipped { reason: String },
    /// The whole input was re-encoded at a lower bitrate before chunking.
    PreemptiveBitrate { kbps: u32 },
    /// A chunk was re-encoded at a lower ladder bitrate.
    ChunkBitrateReduced { index: usize, kbps: u32 },
    /// No ladder bitrate got a chunk under the ceiling; it was kept anyway.
    ChunkOversized { index: usize, size_bytes: u64 },
    /// A chunk was squeezed to 8 kHz before its ASR call.
    ChunkAggressivelyCompressed { index: usize, size_bytes: u64 },
    /// The direct attempt failed and the file was chunked instead.
    DirectAttemptFailed { detail: String },
    /// Normal chunking failed and the emergency encoding was used.
    EmergencyEncoding { kbps: u32 },
}

impl std::fmt::Display for Degradation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Degradation::NormalizationSkipped { reason } => {
                write!(f, "loudness normalization skipped: {}", reason)
            }
            Degradation::DenoiseSkipped { reason } => write!(f, "noise reduction skipped: {}", reason),
            Degradation::PreemptiveBitrate { kbps } => {
                write!(f, "input re-encoded at {}kbps before chunking", kbps)
            }
            Degradation::ChunkBitrateReduced { index, kbps } => {
                write!(f, "chunk {} re-encoded at {}kbps", index + 1, kbps)
            }
            Degradation::ChunkOversized { index, size_bytes } => {
                write!(f, "chunk {} still oversized ({} bytes)", index + 1, size_bytes)
            }
            Degradation::ChunkAggressivelyCompressed { index, size_bytes } => {
                write!(f, "chunk {} compressed to 8kHz ({} bytes)", index + 1, size_bytes)
            }
            Degradation::DirectAttemptFailed { detail } => {
                write!(f, "direct transcription failed: {}", detail)
            }
            Degradation::EmergencyEncoding { kbps } => {
                write!(f, "emergency {}kbps encoding used", kbps)
            }
        }
    }
}

/// Terminal artifact returned to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionReport {
    /// Merged transcript, including a note when chunks are missing.
    pub merged_text: String,
    /// Zero-based indices of units that produced no text.
    pub failed_chunk_indices: BTreeSet<usize>,
    /// Number of units that were attempted.
    pub unit_count: usize,
    /// Tier that produced the transcript.
    pub path: TranscriptionPath,
    /// Probed duration of the original input.
    #[serde(default)]
    pub duration_secs: u64,
    /// Quality reductions applied on the way.
    #[serde(default)]
    pub warnings: Vec<Degradation>,
}

impl TranscriptionReport {
    /// Whether every unit was transcribed.
    pub fn is_complete(&self) -> bool {
        self.failed_chunk_indices.is_empty()
    }

    /// Whether the transcript is usable but not perfect.
    pub fn is_degraded(&self) -> bool {
        !self.is_complete() || !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_has_empty_text() {
        let outcome = TranscriptionOutcome::failure(3, "rate limited");
        assert!(!outcome.succeeded);
        assert!(outcome.text.is_empty());
        assert_eq!(outcome.error_detail.as_deref(), Some("rate limited"));
    }

    #[test]
    fn report_degradation_flags() {
        let mut report = TranscriptionReport::default();
        assert!(report.is_complete());
        assert!(!report.is_degraded());

        report.warnings.push(Degradation::EmergencyEncoding { kbps: 8 });
        assert!(report.is_complete());
        assert!(report.is_degraded());

        report.warnings.clear();
        report.failed_chunk_indices.insert(1);
        assert!(!report.is_complete());
        assert!(report.is_degraded());
    }

    #[test]
    fn degradation_uses_one_based_chunk_numbers() {
        let msg = Degradation::ChunkBitrateReduced { index: 0, kbps: 8 }.to_string();
        assert_eq!(msg, "chunk 1 re-encoded at 8kbps");
    }

    #[test]
    fn degradation_serializes_with_kind_tag() {
        let json = serde_json::to_string(&Degradation::EmergencyEncoding { kbps: 8 }).unwrap();
        assert!(json.contains("\"kind\":\"emergency_encoding\""));
    }
}
