use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::Translator;
use crate::errors::{ProviderError, TranslationError};

/// DeepL client for the v2 translate API
#[derive(Debug)]
pub struct DeepLTranslator {
    /// HTTP client for API requests
    client: Client,
    /// Authentication key
    api_key: String,
    /// Full URL of the translate endpoint
    translate_url: Url,
    /// Target language code (e.g. "EN-US")
    target_language: String,
    /// Source language code, detected by DeepL when absent
    source_language: Option<String>,
}

/// Translate request body
#[derive(Debug, Serialize)]
pub struct TranslateRequest<'a> {
    /// Texts to translate
    text: Vec<&'a str>,
    /// Target language
    target_lang: &'a str,
    /// Source language
    #[serde(skip_serializing_if = "Option::is_none")]
    source_lang: Option<&'a str>,
}

/// Translate response body
#[derive(Debug, Deserialize)]
pub struct TranslateResponse {
    pub translations: Vec<Translation>,
}

/// Single translation in a response
#[derive(Debug, Deserialize)]
pub struct Translation {
    /// Language DeepL detected for the input
    #[serde(default)]
    pub detected_source_language: Option<String>,
    /// Translated text
    pub text: String,
}

impl DeepLTranslator {
    /// Create a new DeepL client
    pub fn new(
        api_key: impl Into<String>,
        endpoint: &str,
        target_language: impl Into<String>,
        source_language: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ProviderError> {
        let base = Url::parse(endpoint)
            .map_err(|e| ProviderError::RequestFailed(format!("Invalid DeepL endpoint '{}': {}", endpoint, e)))?;
        let translate_url = base
            .join("/v2/translate")
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            translate_url,
            target_language: target_language.into(),
            source_language: source_language.filter(|s| !s.is_empty()),
        })
    }

    /// URL requests are sent to
    pub fn translate_url(&self) -> &Url {
        &self.translate_url
    }

    /// Build the request body for one text
    pub fn build_request<'a>(&'a self, text: &'a str) -> TranslateRequest<'a> {
        TranslateRequest {
            text: vec![text],
            target_lang: &self.target_language,
            source_lang: self.source_language.as_deref(),
        }
    }

    /// Pull the first translation out of a response
    pub fn extract_text(response: TranslateResponse) -> Result<String, TranslationError> {
        response
            .translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or(TranslationError::EmptyResponse)
    }
}

#[async_trait]
impl Translator for DeepLTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        let response = self
            .client
            .post(self.translate_url.clone())
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
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
            error!("DeepL API error ({}): {}", status, error_text);
            return Err(ProviderError::from_status(status.as_u16(), error_text).into());
        }

        let body = response
            .json::<TranslateResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        if let Some(detected) = body.translations.first().and_then(|t| t.detected_source_language.as_deref()) {
            debug!("DeepL detected source language {}", detected);
        }

        Self::extract_text(body)
    }
}
