//! Retry/backoff around a single recognition call.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{AsrClient, AsrError};
use crate::models::TranscriptionOutcome;

/// Backoff policy applied to every direct or per-chunk call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after the first.
    pub max_retries: u32,
    /// Rate-limit wait grows by this much per retry.
    pub rate_limit_step: Duration,
    /// Longest single rate-limit wait.
    pub rate_limit_cap: Duration,
    /// Wait before retrying any other transient error.
    pub transient_delay: Duration,
    /// Per-call timeout; a timeout counts as transient.
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            rate_limit_step: Duration::from_secs(5),
            rate_limit_cap: Duration::from_secs(30),
            transient_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-based), or `None` if `error`
    /// must not be retried.
    pub fn backoff(&self, error: &AsrError, retry: u32) -> Option<Duration> {
        if !error.is_retryable() {
            return None;
        }
        match error {
            AsrError::RateLimited(_) => Some((self.rate_limit_step * retry).min(self.rate_limit_cap)),
            _ => Some(self.transient_delay),
        }
    }
}

/// One unit of recognition work.
#[derive(Debug, Clone, Copy)]
pub struct UnitRequest<'a> {
    /// Chunk index (0 for a direct transcription).
    pub index: usize,
    pub audio: &'a [u8],
    pub file_name: &'a str,
    pub language: Option<&'a str>,
}

/// Call `client` until it succeeds, the error is permanent, or the retry
/// budget is used up.
///
/// Failures become a failed [`TranscriptionOutcome`]; the only error
/// returned is [`AsrError::Cancelled`].
pub async fn transcribe_with_retry(
    client: &dyn AsrClient,
    policy: &RetryPolicy,
    request: UnitRequest<'_>,
    cancel: &CancellationToken,
) -> Result<TranscriptionOutcome, AsrError> {
    let mut retries = 0u32;
    loop {
        let call = tokio::time::timeout(
            policy.request_timeout,
            client.transcribe(request.audio, request.file_name, request.language),
        );
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(AsrError::Cancelled),
            result = call => result.unwrap_or(Err(AsrError::Timeout)),
        };

        let error = match result {
            Ok(text) => {
                tracing::debug!(
                    unit = request.index,
                    attempts = retries + 1,
                    chars = text.len(),
                    "Transcribed {}",
                    request.file_name
                );
                return Ok(TranscriptionOutcome::success(request.index, text));
            }
            Err(AsrError::Cancelled) => return Err(AsrError::Cancelled),
            Err(e) => e,
        };

        retries += 1;
        let delay = match policy.backoff(&error, retries) {
            Some(delay) if retries <= policy.max_retries => delay,
            _ => {
                tracing::warn!(
                    unit = request.index,
                    attempts = retries,
                    "Giving up on {}: {}",
                    request.file_name,
                    error
                );
                return Ok(TranscriptionOutcome::failure(request.index, error.to_string()));
            }
        };

        tracing::warn!(
            unit = request.index,
            retry = retries,
            wait_secs = delay.as_secs_f64(),
            "{} failed: {}",
            request.file_name,
            error
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(AsrError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
