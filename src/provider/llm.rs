// ABOUTME: The LlmProvider trait: the seam between agents and a hosted model API.
// ABOUTME: Streaming calls yield a FragmentStream; single-shot calls yield the reply text.

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::error::ProviderError;
use super::types::ChatRequest;
use crate::stream::Fragment;

/// Lazy, forward-only, single-pass sequence of fragments from one streamed call.
pub type FragmentStream = BoxStream<'static, Result<Fragment, ProviderError>>;

/// A text-generation backend.
///
/// Errors that happen before any fragment is produced (bad credentials,
/// unknown model, throttling) are returned from `stream` itself; failures
/// after that surface as an `Err` item inside the stream.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short identifier used in logs, e.g. `openai`.
    fn name(&self) -> &str;

    /// Start a streamed completion.
    async fn stream(&self, request: &ChatRequest) -> Result<FragmentStream, ProviderError>;

    /// Run a single-shot completion and return the assistant text.
    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError>;
}
