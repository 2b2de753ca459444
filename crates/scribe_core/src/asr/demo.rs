//! Canned client used when no API key is configured.

use std::time::Duration;

use async_trait::async_trait;

use super::{AsrClient, AsrError};

pub const DEMO_TRANSCRIPT: &str = "This is a demo transcription. Set the API key environment variable to get real transcriptions.";

/// Returns [`DEMO_TRANSCRIPT`] for every file after a short delay.
pub struct DemoAsrClient {
    delay: Duration,
}

impl DemoAsrClient {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(1500),
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for DemoAsrClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AsrClient for DemoAsrClient {
    async fn transcribe(
        &self,
        audio: &[u8],
        file_name: &str,
        _language: Option<&str>,
    ) -> Result<String, AsrError> {
        tracing::debug!("Demo transcription of {} ({} bytes)", file_name, audio.len());
        tokio::time::sleep(self.delay).await;
        Ok(DEMO_TRANSCRIPT.to_string())
    }

    fn name(&self) -> &'static str {
        "demo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn returns_canned_text() {
        let client = DemoAsrClient::new();
        let text = client.transcribe(b"abc", "a.mp3", None).await.unwrap();
        assert_eq!(text, DEMO_TRANSCRIPT);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_configured_delay() {
        let client = DemoAsrClient::with_delay(Duration::from_secs(3));
        let start = tokio::time::Instant::now();
        client.transcribe(b"", "b.wav", Some("en")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
