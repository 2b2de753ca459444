//! Speech recognition client abstraction.
//!
//! The pipeline only needs `transcribe(bytes, language) -> text`; which
//! service answers is chosen by [`build_asr_client`]. Every call goes
//! through [`transcribe_with_retry`], which applies the backoff policy.

mod demo;
mod openai;
mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use demo::{DemoAsrClient, DEMO_TRANSCRIPT};
pub use openai::OpenAiWhisperClient;
pub use retry::{transcribe_with_retry, RetryPolicy, UnitRequest};

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{AsrProvider, AsrSettings};

/// Errors from a recognition call, classified for the retry policy.
#[derive(Debug, thiserror::Error)]
pub enum AsrError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The service rejected the payload size. Never retried.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Timeout: transcription took too long")]
    Timeout,

    #[error("API error: {0}")]
    Fatal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cancelled")]
    Cancelled,
}

impl AsrError {
    /// Classify an HTTP error response.
    ///
    /// Body text is checked too since some proxies report size and rate
    /// limits with a generic status.
    pub fn from_response(status: u16, body: &str) -> Self {
        let lower = body.to_lowercase();
        let detail = format!("HTTP {}: {}", status, body.trim());
        if status == 413 || lower.contains("content size limit") || lower.contains("maximum content size") {
            AsrError::PayloadTooLarge(detail)
        } else if status == 429 || lower.contains("rate limit") {
            AsrError::RateLimited(detail)
        } else if status == 408 || status >= 500 {
            AsrError::Transient(detail)
        } else {
            AsrError::Fatal(detail)
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AsrError::RateLimited(_) | AsrError::Transient(_) | AsrError::Timeout
        )
    }
}

/// A speech recognition service.
#[async_trait]
pub trait AsrClient: Send + Sync {
    /// Transcribe one audio file.
    ///
    /// `file_name` is sent along so the service can infer the container.
    async fn transcribe(
        &self,
        audio: &[u8],
        file_name: &str,
        language: Option<&str>,
    ) -> Result<String, AsrError>;

    /// Get the name of this client.
    fn name(&self) -> &'static str;
}

/// Build the client selected by `[asr]`.
///
/// The OpenAI client needs its key in the environment variable named by
/// `api_key_env`; without one the demo client is used.
pub fn build_asr_client(settings: &AsrSettings) -> Result<Arc<dyn AsrClient>, AsrError> {
    match settings.provider {
        AsrProvider::Demo => Ok(Arc::new(DemoAsrClient::new())),
        AsrProvider::OpenAi => {
            let key = std::env::var(&settings.api_key_env)
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty());
            match key {
                Some(key) => Ok(Arc::new(OpenAiWhisperClient::from_settings(key, settings)?)),
                None => {
                    tracing::warn!(
                        "{} is not set, running in demo mode with canned transcripts",
                        settings.api_key_env
                    );
                    Ok(Arc::new(DemoAsrClient::new()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_codes() {
        assert!(matches!(AsrError::from_response(413, ""), AsrError::PayloadTooLarge(_)));
        assert!(matches!(AsrError::from_response(429, ""), AsrError::RateLimited(_)));
        assert!(matches!(AsrError::from_response(503, "busy"), AsrError::Transient(_)));
        assert!(matches!(AsrError::from_response(401, "bad key"), AsrError::Fatal(_)));
    }

    #[test]
    fn classifies_by_body_text() {
        let err = AsrError::from_response(400, "Maximum content size limit (26214400) exceeded");
        assert!(matches!(err, AsrError::PayloadTooLarge(_)));
        let err = AsrError::from_response(400, "Rate limit reached for requests");
        assert!(matches!(err, AsrError::RateLimited(_)));
    }

    #[test]
    fn retryable_errors() {
        assert!(AsrError::Timeout.is_retryable());
        assert!(AsrError::Transient("x".into()).is_retryable());
        assert!(!AsrError::PayloadTooLarge("x".into()).is_retryable());
        assert!(!AsrError::Fatal("x".into()).is_retryable());
    }

    #[test]
    fn demo_provider_needs_no_key() {
        let settings = AsrSettings {
            provider: AsrProvider::Demo,
            ..Default::default()
        };
        assert_eq!(build_asr_client(&settings).unwrap().name(), "demo");
    }

    #[test]
    fn missing_key_falls_back_to_demo() {
        let settings = AsrSettings {
            api_key_env: "SCRIBE_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..Default::default()
        };
        assert_eq!(build_asr_client(&settings).unwrap().name(), "demo");
    }
}
