// ABOUTME: Interactive streaming chat that keeps the message history between turns.
// ABOUTME: Each turn streams through a fresh aggregator and optionally lands in a transcript.

use tokio_util::sync::CancellationToken;

use crate::provider::{ChatMessage, LlmProvider};
use crate::session::SessionLogger;
use crate::stream::{AggregationOutcome, AggregationState};

use super::basic::{Agent, AgentError, stream_request};

/// A multi-turn chat with one agent.
pub struct Conversation {
    agent: Agent,
    history: Vec<ChatMessage>,
    logger: Option<SessionLogger>,
}

impl Conversation {
    pub fn new(agent: Agent) -> Self {
        let history = agent.system_message().into_iter().collect();
        Self {
            agent,
            history,
            logger: None,
        }
    }

    /// Append every user and assistant message to `logger` as it is kept.
    pub fn with_logger(mut self, logger: SessionLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Number of completed user turns.
    pub fn turns(&self) -> usize {
        self.history
            .iter()
            .filter(|m| m.role == crate::provider::Role::User)
            .count()
    }

    /// Send `text` and stream the reply.
    ///
    /// The assistant message is kept when the reply produced any text, even
    /// if it was cancelled part way. If the request fails, or the reply has
    /// no text at all (a bare function call, or a cancel before any content),
    /// the user message is dropped again so the history keeps alternating.
    pub async fn send<F>(
        &mut self,
        provider: &dyn LlmProvider,
        text: &str,
        on_update: F,
        cancel: CancellationToken,
    ) -> Result<AggregationOutcome, AgentError>
    where
        F: FnMut(&AggregationState),
    {
        self.history.push(ChatMessage::user(text));
        let request = self.agent.request_for(self.history.iter().cloned());

        let outcome = match stream_request(provider, &request, on_update, cancel).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.history.pop();
                return Err(err);
            }
        };

        if outcome.state.full_text.is_empty() {
            self.history.pop();
            tracing::debug!(status = ?outcome.status, "reply produced no text; turn dropped");
            return Ok(outcome);
        }

        let user = ChatMessage::user(text);
        self.log(&user);
        let reply = ChatMessage::assistant(&outcome.state.full_text);
        self.log(&reply);
        self.history.push(reply);
        Ok(outcome)
    }

    /// Forget every message except the system instructions.
    pub fn clear(&mut self) {
        self.history.truncate(usize::from(self.agent.system_message().is_some()));
    }

    fn log(&mut self, message: &ChatMessage) {
        if let Some(logger) = self.logger.as_mut()
            && let Err(e) = logger.log_message(message)
        {
            tracing::warn!(error = %e, "failed to write transcript");
        }
    }
}
