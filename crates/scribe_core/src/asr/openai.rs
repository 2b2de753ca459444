//! OpenAI Whisper client (`/v1/audio/transcriptions`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;

use super::{AsrClient, AsrError};
use crate::config::AsrSettings;

/// Multipart client for OpenAI-compatible transcription endpoints.
pub struct OpenAiWhisperClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiWhisperClient {
    /// Create a client with its own HTTP connection pool.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AsrError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AsrError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, api_key, model, endpoint))
    }

    /// Create a client around an existing `reqwest::Client`.
    pub fn with_client(
        client: reqwest::Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: endpoint.into(),
        }
    }

    pub fn from_settings(api_key: String, settings: &AsrSettings) -> Result<Self, AsrError> {
        Self::new(
            api_key,
            &settings.model,
            &settings.endpoint,
            Duration::from_secs(settings.request_timeout_secs.max(1)),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" | "oga" => "audio/ogg",
        "flac" => "audio/flac",
        "webm" => "audio/webm",
        _ => "application/octet-stream",
    }
}

fn map_send_error(e: reqwest::Error) -> AsrError {
    if e.is_timeout() {
        AsrError::Timeout
    } else if e.is_builder() {
        AsrError::Config(e.to_string())
    } else {
        AsrError::Transient(format!("Network error: {}", e))
    }
}

#[async_trait]
impl AsrClient for OpenAiWhisperClient {
    async fn transcribe(
        &self,
        audio: &[u8],
        file_name: &str,
        language: Option<&str>,
    ) -> Result<String, AsrError> {
        let part = multipart::Part::bytes(audio.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime_for(file_name))
            .map_err(|e| AsrError::Config(format!("Failed to create multipart: {}", e)))?;

        let mut form = multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());
        if let Some(language) = language.map(str::trim).filter(|l| !l.is_empty()) {
            form = form.text("language", language.to_string());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AsrError::from_response(status.as_u16(), &error_text));
        }

        let result: serde_json::Value = response.json().await.map_err(map_send_error)?;
        Ok(result["text"].as_str().unwrap_or("").trim().to_string())
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_from_settings() {
        let client = OpenAiWhisperClient::from_settings("test-key".into(), &AsrSettings::default()).unwrap();
        assert_eq!(client.name(), "openai");
        assert_eq!(client.model(), "whisper-1");
    }

    #[test]
    fn mime_by_extension() {
        assert_eq!(mime_for("chunk_000_24k.mp3"), "audio/mpeg");
        assert_eq!(mime_for("normalized.WAV"), "audio/wav");
        assert_eq!(mime_for("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transient() {
        let client = OpenAiWhisperClient::new(
            "k",
            "whisper-1",
            "http://127.0.0.1:9/v1/audio/transcriptions",
            Duration::from_secs(5),
        )
        .unwrap();
        let err = client.transcribe(b"abc", "a.mp3", None).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
