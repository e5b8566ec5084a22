// ABOUTME: Upstream error classification for LLM provider calls.
// ABOUTME: Maps HTTP statuses and transport faults to a kind plus the provider's message.

use std::fmt;

use serde_json::Value;

/// Broad category of an upstream failure, used by callers to decide on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Missing, invalid, or unauthorized credentials (401/403).
    Authentication,
    /// The provider is throttling requests (429).
    RateLimited,
    /// The request was rejected as invalid, e.g. unknown model (400/404/422).
    BadRequest,
    /// The provider failed internally (5xx).
    Server,
    /// Connection, TLS, or body-read failure.
    Transport,
    /// The provider sent something that could not be decoded.
    Malformed,
    /// Local setup problem, such as a missing API key.
    Configuration,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderErrorKind::Authentication => "authentication",
            ProviderErrorKind::RateLimited => "rate limit",
            ProviderErrorKind::BadRequest => "bad request",
            ProviderErrorKind::Server => "server",
            ProviderErrorKind::Transport => "transport",
            ProviderErrorKind::Malformed => "malformed response",
            ProviderErrorKind::Configuration => "configuration",
        };
        f.write_str(label)
    }
}

/// An error reported by, or while talking to, an LLM provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Provider-supplied message, or a local description.
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transport, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Malformed, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Configuration, message)
    }

    /// Classify a non-success HTTP response.
    ///
    /// The message is taken from an OpenAI-style `{"error": {"message": ...}}`
    /// body when present, otherwise from the raw body text.
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => ProviderErrorKind::Authentication,
            429 => ProviderErrorKind::RateLimited,
            400 | 404 | 409 | 413 | 422 => ProviderErrorKind::BadRequest,
            500..=599 => ProviderErrorKind::Server,
            _ => ProviderErrorKind::Malformed,
        };
        let message = extract_error_message(body).unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                format!("HTTP {}", status)
            } else {
                trimmed.to_string()
            }
        });
        Self {
            kind,
            status: Some(status),
            message,
        }
    }

    /// Classify an `error` object delivered inside an otherwise healthy stream.
    pub fn from_stream_error(error: &Value) -> Self {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("provider reported an error mid-stream")
            .to_string();
        let code = error
            .get("code")
            .and_then(|c| c.as_u64())
            .and_then(|c| u16::try_from(c).ok());
        match code {
            Some(code) => {
                let mut err = Self::from_status(code as u16, "");
                err.message = message;
                err
            }
            None => Self::new(ProviderErrorKind::Server, message),
        }
    }

    /// Whether the failure is transient. Informational only: nothing in this
    /// crate retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::RateLimited | ProviderErrorKind::Server | ProviderErrorKind::Transport
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::malformed(err.to_string())
        } else {
            Self::transport(err.to_string())
        }
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    let error = json.get("error")?;
    match error {
        Value::String(s) => Some(s.clone()),
        other => other
            .get("message")
            .and_then(|m| m.as_str())
            .map(|s| s.to_string()),
    }
}
