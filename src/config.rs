// ABOUTME: Configuration loading for streamclaw.
// ABOUTME: Reads ~/.streamclaw/config.toml and secrets.env, falling back to defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::guardrail::GuardrailConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub stream: StreamConfig,
    pub session: SessionConfig,
    pub guardrails: GuardrailsConfig,
}

/// LLM provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
    pub openai: EndpointConfig,
    pub gemini: EndpointConfig,
    pub openrouter: EndpointConfig,
    pub ollama: OllamaConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 500,
            openai: EndpointConfig::default(),
            gemini: EndpointConfig::default(),
            openrouter: EndpointConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

/// Optional base URL override for a hosted provider.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub base_url: Option<String>,
}

/// Ollama-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
        }
    }
}

/// How the CLI drives streamed responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Cancel a stream after this many seconds. Unset means no deadline.
    pub deadline_seconds: Option<u64>,
    /// Print live word/sentence/character counts while streaming.
    pub show_stats: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            deadline_seconds: None,
            show_stats: true,
        }
    }
}

/// Transcript logging for interactive chat.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub log_transcripts: bool,
}

/// Input and output guardrails applied by the `guard` command.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardrailsConfig {
    pub input: Vec<GuardrailConfig>,
    pub output: Vec<GuardrailConfig>,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            input: vec![GuardrailConfig::anger_detector()],
            output: vec![GuardrailConfig::response_validator()],
        }
    }
}

impl Config {
    /// Load config from ~/.streamclaw/config.toml, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Apply command-line overrides on top of the file configuration.
    pub fn with_overrides(mut self, provider: Option<String>, model: Option<String>) -> Self {
        if let Some(provider) = provider {
            self.llm.provider = provider;
        }
        if let Some(model) = model {
            self.llm.model = model;
        }
        self
    }

    /// Root directory for config and secrets.
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".streamclaw")
    }

    /// Path to the config file.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Path to the secrets file holding API keys.
    pub fn secrets_env_path() -> PathBuf {
        Self::config_dir().join("secrets.env")
    }

    /// Directory under which chat transcripts are written.
    pub fn sessions_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("streamclaw")
            .join("sessions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.llm.max_tokens, 500);
        assert!(config.stream.deadline_seconds.is_none());
        assert!(config.stream.show_stats);
        assert!(!config.session.log_transcripts);
        assert_eq!(config.guardrails.input.len(), 1);
        assert_eq!(config.guardrails.output.len(), 1);
    }

    #[test]
    fn parse_config_toml() {
        let toml_str = r#"
[llm]
provider = "ollama"
model = "llama3"
max_tokens = 2048

[llm.ollama]
base_url = "http://gpu-box:11434"

[llm.gemini]
base_url = "http://gemini-proxy/v1"

[stream]
deadline_seconds = 30
show_stats = false

[session]
log_transcripts = true

[[guardrails.input]]
name = "Homework Detector"
instructions = "Check if the user is asking you to do their homework."
verdict_field = "is_homework"

[[guardrails.output]]
name = "Kindness"
instructions = "Check if the response is mean."
verdict_field = "is_mean"
provider = "gemini"
model = "gemini-1.5-flash"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model, "llama3");
        assert_eq!(config.llm.max_tokens, 2048);
        assert_eq!(config.llm.ollama.base_url, "http://gpu-box:11434");
        assert_eq!(
            config.llm.gemini.base_url.as_deref(),
            Some("http://gemini-proxy/v1")
        );
        assert_eq!(config.stream.deadline_seconds, Some(30));
        assert!(!config.stream.show_stats);
        assert!(config.session.log_transcripts);
        assert_eq!(config.guardrails.input[0].verdict_field, "is_homework");
        assert_eq!(config.guardrails.output[0].provider.as_deref(), Some("gemini"));
        assert_eq!(
            config.guardrails.output[0].model.as_deref(),
            Some("gemini-1.5-flash")
        );
    }

    #[test]
    fn parse_partial_config_uses_defaults() {
        let toml_str = r#"
[llm]
provider = "gemini"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.llm.provider, "gemini");
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.guardrails.input[0].verdict_field, "is_angry");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_from(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.llm.provider, "openai");
    }

    #[test]
    fn invalid_file_reports_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[llm\nprovider = ").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn overrides_replace_provider_and_model() {
        let config = Config::default().with_overrides(Some("ollama".into()), Some("llama3".into()));
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model, "llama3");

        let untouched = Config::default().with_overrides(None, None);
        assert_eq!(untouched.llm.provider, "openai");
    }
}
