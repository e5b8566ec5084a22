// ABOUTME: LLM provider factory: creates the right client based on config.
// ABOUTME: Supports openai, gemini, openrouter, and ollama, plus a named provider set.

use std::collections::HashMap;
use std::sync::Arc;

use super::error::ProviderError;
use super::llm::LlmProvider;
use super::openai::OpenAiCompatClient;
use crate::config::LlmConfig;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Create an LLM client for the provider named in config.
pub fn create_client(config: &LlmConfig) -> anyhow::Result<Arc<dyn LlmProvider>> {
    create_named_client(&config.provider, config)
}

/// Create an LLM client for an explicit provider name, using the endpoint
/// overrides from `config`.
pub fn create_named_client(
    provider: &str,
    config: &LlmConfig,
) -> anyhow::Result<Arc<dyn LlmProvider>> {
    match provider {
        "openai" => {
            let url = base_url_or(config.openai.base_url.as_deref(), OPENAI_BASE_URL);
            Ok(Arc::new(OpenAiCompatClient::from_env(
                "openai",
                url,
                "OPENAI_API_KEY",
            )?))
        }
        "gemini" => {
            let url = base_url_or(config.gemini.base_url.as_deref(), GEMINI_BASE_URL);
            Ok(Arc::new(OpenAiCompatClient::from_env(
                "gemini",
                url,
                "GEMINI_API_KEY",
            )?))
        }
        "openrouter" => {
            let url = base_url_or(config.openrouter.base_url.as_deref(), OPENROUTER_BASE_URL);
            Ok(Arc::new(OpenAiCompatClient::from_env(
                "openrouter",
                url,
                "OPENROUTER_API_KEY",
            )?))
        }
        "ollama" => {
            let base_url = format!("{}/v1", config.ollama.base_url.trim_end_matches('/'));
            Ok(Arc::new(OpenAiCompatClient::new("ollama", base_url, None)))
        }
        other => anyhow::bail!(
            "Unknown LLM provider: '{}'. Expected: openai, gemini, openrouter, ollama",
            other
        ),
    }
}

fn base_url_or(configured: Option<&str>, default: &str) -> String {
    configured
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// The default provider plus any extra providers referenced by name, such as
/// a guardrail that runs on a different vendor than the main agent.
#[derive(Clone)]
pub struct ProviderSet {
    default: Arc<dyn LlmProvider>,
    named: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderSet {
    pub fn new(default: Arc<dyn LlmProvider>) -> Self {
        Self {
            default,
            named: HashMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, provider: Arc<dyn LlmProvider>) -> Self {
        self.named.insert(name.into(), provider);
        self
    }

    pub fn default_provider(&self) -> &Arc<dyn LlmProvider> {
        &self.default
    }

    pub fn contains(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    /// Look up a provider by name; `None` selects the default.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        match name {
            None => Ok(self.default.clone()),
            Some(name) if name == self.default.name() => Ok(self.default.clone()),
            Some(name) => self.named.get(name).cloned().ok_or_else(|| {
                ProviderError::configuration(format!("no provider named '{}' is configured", name))
            }),
        }
    }
}
