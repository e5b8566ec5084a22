// ABOUTME: Core types for guardrails: the configured check, its decision, and its errors.
// ABOUTME: Ships the default anger-detector input guardrail and kindness output guardrail.

use serde::{Deserialize, Serialize};

use crate::provider::ProviderError;

/// The outcome of running one guardrail over a piece of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailDecision {
    /// True when the checked text violates the guardrail and processing
    /// should abort.
    pub tripwire_triggered: bool,
    pub reason: String,
}

impl GuardrailDecision {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            tripwire_triggered: false,
            reason: reason.into(),
        }
    }

    pub fn trip(reason: impl Into<String>) -> Self {
        Self {
            tripwire_triggered: true,
            reason: reason.into(),
        }
    }
}

/// A configuration-driven guardrail.
///
/// The checking model is asked for a JSON object with exactly two fields:
/// the boolean named by `verdict_field` and a string `reason`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailConfig {
    pub name: String,
    pub instructions: String,
    #[serde(default = "default_verdict_field")]
    pub verdict_field: String,
    /// Model override; the agent's model is used when unset.
    #[serde(default)]
    pub model: Option<String>,
    /// Provider override, looked up by name; the default provider is used
    /// when unset.
    #[serde(default)]
    pub provider: Option<String>,
}

fn default_verdict_field() -> String {
    "tripwire".to_string()
}

impl GuardrailConfig {
    /// Input guardrail that trips on angry or rude user messages.
    pub fn anger_detector() -> Self {
        Self {
            name: "Anger Detector".to_string(),
            instructions: "Check if the user sounds angry or is being rude.".to_string(),
            verdict_field: "is_angry".to_string(),
            model: None,
            provider: None,
        }
    }

    /// Output guardrail that trips on mean or unkind agent responses.
    pub fn response_validator() -> Self {
        Self {
            name: "Response Validator".to_string(),
            instructions: "Check if the agent's response is mean or unkind. Be honest."
                .to_string(),
            verdict_field: "is_mean".to_string(),
            model: None,
            provider: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GuardrailError {
    #[error("guardrail request failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("guardrail '{guardrail}' returned an unusable verdict: {detail}")]
    Malformed { guardrail: String, detail: String },
}
