// ABOUTME: Runs a guardrail as a single non-streaming structured completion.
// ABOUTME: Builds the two-field JSON schema request and parses the verdict out of the reply.

use serde_json::{Value, json};

use super::types::{GuardrailConfig, GuardrailDecision, GuardrailError};
use crate::provider::{ChatRequest, LlmProvider, ResponseFormat};

/// Upper bound on tokens for a verdict; the reply is a tiny JSON object.
const VERDICT_MAX_TOKENS: u32 = 200;

/// A guardrail bound to the model it runs on.
#[derive(Debug, Clone)]
pub struct Guardrail {
    config: GuardrailConfig,
    model: String,
}

impl Guardrail {
    /// Bind `config` to its own model, or to `default_model` when it names none.
    pub fn new(config: GuardrailConfig, default_model: &str) -> Self {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| default_model.to_string());
        Self { config, model }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Name of the provider this guardrail asks for, if it overrides the default.
    pub fn provider_name(&self) -> Option<&str> {
        self.config.provider.as_deref()
    }

    pub fn config(&self) -> &GuardrailConfig {
        &self.config
    }

    /// The request sent to the checking model for `text`.
    pub fn request(&self, text: &str) -> ChatRequest {
        ChatRequest::new(&self.model)
            .system(&self.config.instructions)
            .user(text)
            .max_tokens(VERDICT_MAX_TOKENS)
            .response_format(ResponseFormat::JsonSchema {
                json_schema: verdict_schema(&self.config.verdict_field),
            })
    }

    /// Check `text` and report whether the tripwire fired.
    pub async fn check(
        &self,
        provider: &dyn LlmProvider,
        text: &str,
    ) -> Result<GuardrailDecision, GuardrailError> {
        let reply = provider.complete(&self.request(text)).await?;
        let decision = parse_verdict(&self.config, &reply)?;
        tracing::debug!(
            guardrail = %self.config.name,
            provider = provider.name(),
            tripwire = decision.tripwire_triggered,
            "guardrail verdict"
        );
        Ok(decision)
    }
}

/// JSON schema for `{ <verdict_field>: bool, reason: string }`.
pub fn verdict_schema(verdict_field: &str) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert(verdict_field.to_string(), json!({ "type": "boolean" }));
    properties.insert("reason".to_string(), json!({ "type": "string" }));
    json!({
        "name": "guardrail_verdict",
        "strict": true,
        "schema": {
            "type": "object",
            "properties": properties,
            "required": [verdict_field, "reason"],
            "additionalProperties": false,
        }
    })
}

/// Parse a verdict reply. Models sometimes wrap the object in a Markdown
/// code fence even when asked for JSON, so fences are stripped first.
pub fn parse_verdict(
    config: &GuardrailConfig,
    reply: &str,
) -> Result<GuardrailDecision, GuardrailError> {
    let malformed = |detail: String| GuardrailError::Malformed {
        guardrail: config.name.clone(),
        detail,
    };

    let body = strip_code_fence(reply);
    let value: Value =
        serde_json::from_str(body).map_err(|e| malformed(format!("invalid JSON: {}", e)))?;

    let Some(verdict) = value.get(&config.verdict_field) else {
        return Err(malformed(format!("missing field '{}'", config.verdict_field)));
    };
    let Some(tripwire_triggered) = verdict.as_bool() else {
        return Err(malformed(format!(
            "field '{}' is not a boolean: {}",
            config.verdict_field, verdict
        )));
    };
    let reason = value
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(GuardrailDecision {
        tripwire_triggered,
        reason,
    })
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
