//! OpenAI-compatible provider: model catalog over HTTP.
//!
//! Works with: OpenAI, OpenRouter, Gemini's OpenAI endpoint, Ollama, vLLM,
//! and any endpoint exposing `GET /models` in the OpenAI list format.
//! Generation happens elsewhere; this provider only answers which models
//! exist and how many tokens a text costs.

use async_trait::async_trait;
use continuum_core::error::ProviderError;
use continuum_core::provider::Provider;
use std::time::Duration;
use tracing::{debug, warn};

/// An OpenAI-compatible model catalog.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    extra_headers: Vec<(String, String)>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            extra_headers: Vec::new(),
            client,
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Send an additional header with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.base_url)
    }
}

/// Extract model IDs from an OpenAI-style `{"data": [{"id": ...}]}` body.
///
/// Gemini-style `{"models": [{"name": "models/..."}]}` bodies are accepted too.
pub fn parse_models_response(body: &serde_json::Value) -> Vec<String> {
    if let Some(data) = body["data"].as_array() {
        return data
            .iter()
            .filter_map(|m| m["id"].as_str())
            .map(String::from)
            .collect();
    }

    body["models"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|m| m["name"].as_str())
                .map(|name| name.trim_start_matches("models/").to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let url = self.models_url();
        let mut request = self.client.get(&url);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }
        for (name, value) in &self.extra_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 401 || status == 403 {
            return Err(ProviderError::ApiError {
                status_code: status,
                message: format!("Authentication failed for provider '{}'", self.name),
            });
        }

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, body = %error_body, "Model listing failed");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError {
                status_code: status,
                message: format!("Invalid model list: {e}"),
            })?;

        let models = parse_models_response(&body);
        debug!(provider = %self.name, count = models.len(), "Model catalog fetched");
        Ok(models)
    }
}
