use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use url::Url;

use super::Synthesizer;
use crate::errors::{ProviderError, SynthesisError};

/// OpenAI text-to-speech client
#[derive(Debug)]
pub struct OpenAiSpeech {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// Full URL of the speech endpoint
    speech_url: Url,
    /// Model name (e.g. "tts-1")
    model: String,
    /// Voice name (e.g. "nova")
    voice: String,
}

/// Speech request body
#[derive(Debug, Serialize)]
pub struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
}

impl OpenAiSpeech {
    /// Create a new speech client
    pub fn new(
        api_key: impl Into<String>,
        endpoint: &str,
        model: impl Into<String>,
        voice: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ProviderError> {
        // keep the version path segment when joining
        let base = if endpoint.ends_with('/') {
            endpoint.to_string()
        } else {
            format!("{}/", endpoint)
        };
        let speech_url = Url::parse(&base)
            .and_then(|url| url.join("audio/speech"))
            .map_err(|e| ProviderError::RequestFailed(format!("Invalid speech endpoint '{}': {}", endpoint, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            speech_url,
            model: model.into(),
            voice: voice.into(),
        })
    }

    pub fn speech_url(&self) -> &Url {
        &self.speech_url
    }

    pub fn build_request<'a>(&'a self, text: &'a str) -> SpeechRequest<'a> {
        SpeechRequest {
            model: &self.model,
            voice: &self.voice,
            input: text,
        }
    }
}

#[async_trait]
impl Synthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str) -> Result<Bytes, SynthesisError> {
        let response = self
            .client
            .post(self.speech_url.clone())
            .bearer_auth(&self.api_key)
            .json(&self.build_request(text))
            .send()
            .await
            .map_err(ProviderError::from)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("OpenAI speech API error ({}): {}", status, error_text);
            return Err(ProviderError::from_status(status.as_u16(), error_text).into());
        }

        let audio = response.bytes().await.map_err(ProviderError::from)?;
        if audio.is_empty() {
            return Err(ProviderError::ParseError("empty audio body".to_string()).into());
        }

        debug!("Synthesized {} bytes of audio", audio.len());
        Ok(audio)
    }
}
