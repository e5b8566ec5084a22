// ABOUTME: OpenAI-compatible chat completions client built on reqwest.
// ABOUTME: Serves OpenAI, Gemini's compatibility endpoint, OpenRouter, and Ollama.

use async_trait::async_trait;
use futures::TryStreamExt;

use super::adapter::{completion_text, fragments_from_sse};
use super::error::ProviderError;
use super::llm::{FragmentStream, LlmProvider};
use super::types::ChatRequest;

/// Client for any endpoint speaking the `/chat/completions` protocol.
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    name: String,
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatClient {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            name: name.into(),
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    /// Build a client whose key comes from `env_var`. A missing or empty
    /// variable is a configuration error.
    pub fn from_env(
        name: impl Into<String>,
        base_url: impl Into<String>,
        env_var: &str,
    ) -> Result<Self, ProviderError> {
        let key = std::env::var(env_var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::configuration(format!(
                    "{} not found in environment; add it to .env or the secrets file",
                    env_var
                ))
            })?;
        Ok(Self::new(name, base_url, Some(key)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// POST the request and classify any non-success status before the body
    /// is consumed.
    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, ProviderError> {
        tracing::debug!(
            provider = %self.name,
            model = %request.model,
            stream = request.stream,
            messages = request.messages.len(),
            "sending chat completion request"
        );

        let mut builder = self.http.post(self.endpoint()).json(&request.to_body());
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = ProviderError::from_status(status.as_u16(), &body);
            tracing::warn!(provider = %self.name, status = status.as_u16(), error = %err, "request rejected");
            return Err(err);
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: &ChatRequest) -> Result<FragmentStream, ProviderError> {
        let mut request = request.clone();
        request.stream = true;
        let response = self.send(&request).await?;
        let body = response.bytes_stream().map_err(ProviderError::from);
        Ok(fragments_from_sse(body))
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let mut request = request.clone();
        request.stream = false;
        let response = self.send(&request).await?;
        let body: serde_json::Value = response.json().await?;
        completion_text(&body)
    }
}
