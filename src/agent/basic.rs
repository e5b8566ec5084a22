// ABOUTME: The plain agent: named instructions bound to a model, asked once or streamed.
// ABOUTME: Also defines the before/after ask hooks and the errors a streamed ask can produce.

use tokio_util::sync::CancellationToken;

use crate::provider::{ChatMessage, ChatRequest, FunctionDeclaration, LlmProvider, ProviderError};
use crate::stream::{AggregationOutcome, AggregationState, StreamAggregator, StreamInterrupted};

/// Errors from a streamed agent call.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The provider refused or failed the request before any fragment arrived.
    #[error("request failed: {0}")]
    Request(#[from] ProviderError),

    /// The stream broke part way; the partial state is kept.
    #[error(transparent)]
    Interrupted(#[from] StreamInterrupted),
}

impl AgentError {
    /// Text collected before the failure, if any.
    pub fn partial_state(&self) -> Option<&AggregationState> {
        match self {
            AgentError::Request(_) => None,
            AgentError::Interrupted(interrupted) => Some(&interrupted.partial_state),
        }
    }

    /// The upstream error behind this failure.
    pub fn provider_error(&self) -> &ProviderError {
        match self {
            AgentError::Request(err) => err,
            AgentError::Interrupted(interrupted) => &interrupted.cause,
        }
    }
}

/// Observer called around a blocking ask.
pub trait AgentHooks: Send + Sync {
    fn before_ask(&self, prompt: &str);
    fn after_ask(&self, response: &str);
}

/// Hooks that log prompts and responses at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHooks;

impl AgentHooks for TracingHooks {
    fn before_ask(&self, prompt: &str) {
        tracing::info!(prompt, "about to send prompt");
    }

    fn after_ask(&self, response: &str) {
        tracing::info!(response, "received response");
    }
}

/// A named set of instructions bound to a model.
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub name: String,
    /// System instructions; empty means none are sent.
    pub instructions: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub functions: Vec<FunctionDeclaration>,
}

impl Agent {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: String::new(),
            model: model.into(),
            max_tokens: None,
            functions: Vec::new(),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Declare functions the model may call while streaming.
    pub fn with_functions(mut self, functions: impl IntoIterator<Item = FunctionDeclaration>) -> Self {
        self.functions.extend(functions);
        self
    }

    /// The system message for this agent, if it has instructions.
    pub fn system_message(&self) -> Option<ChatMessage> {
        (!self.instructions.is_empty()).then(|| ChatMessage::system(&self.instructions))
    }

    /// Build a request carrying this agent's model, limits, and functions
    /// around the given conversation.
    pub fn request_for(&self, messages: impl IntoIterator<Item = ChatMessage>) -> ChatRequest {
        let mut request = ChatRequest::new(&self.model)
            .messages(messages)
            .functions(self.functions.iter().cloned());
        if let Some(max_tokens) = self.max_tokens {
            request = request.max_tokens(max_tokens);
        }
        request
    }

    /// A single-turn request: the system message (if any) then `prompt`.
    pub fn request(&self, prompt: &str) -> ChatRequest {
        self.request_for(self.system_message().into_iter().chain([ChatMessage::user(prompt)]))
    }

    /// One blocking completion with no state kept between calls.
    pub async fn ask(&self, provider: &dyn LlmProvider, prompt: &str) -> Result<String, ProviderError> {
        provider.complete(&self.request(prompt)).await
    }

    /// Like [`Agent::ask`], calling `hooks` before sending and after a
    /// successful reply.
    pub async fn ask_with_hooks(
        &self,
        provider: &dyn LlmProvider,
        prompt: &str,
        hooks: &dyn AgentHooks,
    ) -> Result<String, ProviderError> {
        hooks.before_ask(prompt);
        let response = self.ask(provider, prompt).await?;
        hooks.after_ask(&response);
        Ok(response)
    }

    /// Stream a single-turn reply through a fresh aggregator.
    pub async fn stream<F>(
        &self,
        provider: &dyn LlmProvider,
        prompt: &str,
        on_update: F,
        cancel: CancellationToken,
    ) -> Result<AggregationOutcome, AgentError>
    where
        F: FnMut(&AggregationState),
    {
        stream_request(provider, &self.request(prompt), on_update, cancel).await
    }
}

/// Open a stream for `request` and fold it with a fresh aggregator.
pub async fn stream_request<F>(
    provider: &dyn LlmProvider,
    request: &ChatRequest,
    on_update: F,
    cancel: CancellationToken,
) -> Result<AggregationOutcome, AgentError>
where
    F: FnMut(&AggregationState),
{
    let fragments = provider.stream(request).await?;
    let outcome = StreamAggregator::with_cancellation(cancel)
        .consume_with(fragments, on_update)
        .await?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::provider::{ProviderErrorKind, Role, ScriptedProvider, weather_function};
    use crate::provider::scripted::word_fragments;
    use crate::stream::{AggregationStatus, Fragment};

    #[derive(Default)]
    struct RecordingHooks {
        seen: Mutex<Vec<String>>,
    }

    impl AgentHooks for RecordingHooks {
        fn before_ask(&self, prompt: &str) {
            self.seen.lock().unwrap().push(format!("before:{}", prompt));
        }

        fn after_ask(&self, response: &str) {
            self.seen.lock().unwrap().push(format!("after:{}", response));
        }
    }

    #[test]
    fn request_includes_instructions_only_when_set() {
        let bare = Agent::new("bare", "gpt-3.5-turbo").request("hi");
        assert_eq!(bare.messages.len(), 1);
        assert_eq!(bare.messages[0].role, Role::User);
        assert_eq!(bare.max_tokens, None);

        let instructed = Agent::new("support", "gpt-3.5-turbo")
            .with_instructions("Be kind.")
            .with_max_tokens(500)
            .request("hi");
        assert_eq!(instructed.messages[0], ChatMessage::system("Be kind."));
        assert_eq!(instructed.messages[1], ChatMessage::user("hi"));
        assert_eq!(instructed.max_tokens, Some(500));
    }

    #[test]
    fn request_carries_functions() {
        let request = Agent::new("weather", "m")
            .with_functions([weather_function()])
            .request("Weather in NYC?");
        assert_eq!(request.functions.len(), 1);
        assert_eq!(request.functions[0].name, "get_weather");
    }

    #[tokio::test]
    async fn ask_with_hooks_calls_both_hooks_in_order() {
        let provider = ScriptedProvider::new();
        provider.push_completion("An agent is a program.");
        let hooks = RecordingHooks::default();

        let reply = Agent::new("a", "m")
            .ask_with_hooks(&provider, "What is an agent?", &hooks)
            .await
            .unwrap();
        assert_eq!(reply, "An agent is a program.");
        assert_eq!(
            *hooks.seen.lock().unwrap(),
            vec![
                "before:What is an agent?".to_string(),
                "after:An agent is a program.".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn after_hook_skipped_on_failure() {
        let provider = ScriptedProvider::new();
        provider.push_completion_error(ProviderError::from_status(401, "bad key"));
        let hooks = RecordingHooks::default();

        let err = Agent::new("a", "m")
            .ask_with_hooks(&provider, "hi", &hooks)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Authentication);
        assert_eq!(hooks.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stream_reports_every_fragment() {
        let provider = ScriptedProvider::new();
        provider.push_stream(word_fragments("Why did the chicken cross the road?"));

        let mut updates = 0;
        let outcome = Agent::new("a", "m")
            .stream(&provider, "joke", |_| updates += 1, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.status, AggregationStatus::Completed);
        assert_eq!(outcome.state.full_text, "Why did the chicken cross the road?");
        assert_eq!(updates, 7);
        assert!(provider.requests()[0].stream);
    }

    #[tokio::test]
    async fn rejected_stream_is_request_error() {
        let provider = ScriptedProvider::new();
        provider.push_stream_error(ProviderError::from_status(404, "model not found"));

        let err = Agent::new("a", "invalid-model")
            .stream(&provider, "hi", |_| {}, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.partial_state().is_none());
        assert_eq!(err.provider_error().kind, ProviderErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn broken_stream_keeps_partial_text() {
        let provider = ScriptedProvider::new();
        provider.push_stream(vec![
            Ok(Fragment::content("Once ")),
            Ok(Fragment::content("upon")),
            Err(ProviderError::transport("connection reset")),
        ]);

        let err = Agent::new("a", "m")
            .stream(&provider, "story", |_| {}, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.partial_state().unwrap().full_text, "Once upon");
        assert_eq!(err.provider_error().kind, ProviderErrorKind::Transport);
    }
}
