// ABOUTME: Fragment types: the tagged units a streamed completion is delivered in.
// ABOUTME: Also defines FunctionCallRecord, the accumulated form of one function call.

use serde::{Deserialize, Serialize};

/// One incremental unit of a streamed generation response.
///
/// Fragments arrive in strict emission order. A `FunctionCallArgsDelta` always
/// belongs to the most recently started function call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fragment {
    /// A piece of assistant text.
    Content { text: String },
    /// The model began a new function call.
    FunctionCallStart { name: String },
    /// More argument text for the open function call.
    FunctionCallArgsDelta { text: String },
}

impl Fragment {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content { text: text.into() }
    }

    pub fn call_start(name: impl Into<String>) -> Self {
        Self::FunctionCallStart { name: name.into() }
    }

    pub fn args_delta(text: impl Into<String>) -> Self {
        Self::FunctionCallArgsDelta { text: text.into() }
    }
}

/// A function call assembled from a `FunctionCallStart` and its argument deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallRecord {
    pub name: String,
    /// Concatenation of every delta attributed to this call, in arrival order.
    pub arguments: String,
}

impl FunctionCallRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: String::new(),
        }
    }

    /// Parse the accumulated arguments as JSON.
    ///
    /// Only meaningful once the stream has ended; mid-stream the arguments are
    /// usually an incomplete document. Empty arguments parse as an empty object.
    pub fn parse_arguments(&self) -> Result<serde_json::Value, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&self.arguments)
    }
}
