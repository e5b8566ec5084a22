// ABOUTME: Wire-level request types for OpenAI-compatible chat completion endpoints.
// ABOUTME: ChatMessage, Role, FunctionDeclaration, ResponseFormat, and ChatRequest builders.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who authored a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in the conversation sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A function the model may call, described by a JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Structured-output constraint for non-streaming calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    JsonObject,
    JsonSchema { json_schema: Value },
}

/// A chat completion request. Serialized with [`ChatRequest::to_body`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub max_tokens: Option<u32>,
    pub functions: Vec<FunctionDeclaration>,
    pub response_format: Option<ResponseFormat>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            stream: false,
            max_tokens: None,
            functions: Vec::new(),
            response_format: None,
        }
    }

    pub fn system(mut self, instructions: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::system(instructions));
        self
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(content));
        self
    }

    pub fn messages(mut self, messages: impl IntoIterator<Item = ChatMessage>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn functions(mut self, functions: impl IntoIterator<Item = FunctionDeclaration>) -> Self {
        self.functions.extend(functions);
        self
    }

    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Serialize to the JSON body sent upstream.
    ///
    /// Function declarations go out as `tools` entries of type `function`,
    /// which every supported provider accepts.
    pub fn to_body(&self) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": self.messages,
            "stream": self.stream,
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !self.functions.is_empty() {
            let tools: Vec<Value> = self
                .functions
                .iter()
                .map(|f| serde_json::json!({ "type": "function", "function": f }))
                .collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(ref format) = self.response_format {
            body["response_format"] = serde_json::to_value(format).unwrap_or(Value::Null);
        }
        body
    }
}

/// The `get_weather` declaration used by the function-calling demo.
pub fn weather_function() -> FunctionDeclaration {
    FunctionDeclaration {
        name: "get_weather".to_string(),
        description: "Get the current weather for a location".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city and state, e.g. San Francisco, CA"
                },
                "unit": {
                    "type": "string",
                    "enum": ["celsius", "fahrenheit"],
                    "description": "The temperature unit to use"
                }
            },
            "required": ["location"]
        }),
    }
}
