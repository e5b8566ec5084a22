// ABOUTME: Provider module: the narrow adapter between agents and hosted LLM APIs.
// ABOUTME: Request types, SSE decoding, chunk adaptation, error classification, and clients.

pub mod adapter;
pub mod error;
pub mod factory;
pub mod llm;
pub mod openai;
pub mod scripted;
pub mod sse;
pub mod types;

pub use error::*;
pub use factory::*;
pub use llm::*;
pub use openai::OpenAiCompatClient;
pub use scripted::ScriptedProvider;
pub use types::*;
