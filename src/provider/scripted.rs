// ABOUTME: In-memory fragment sources and a scripted LlmProvider for tests and offline demos.
// ABOUTME: Replays queued streams and completions and records every request it receives.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::error::ProviderError;
use super::llm::{FragmentStream, LlmProvider};
use super::types::ChatRequest;
use crate::stream::Fragment;

/// One scripted item of a fragment stream.
pub type ScriptedItem = Result<Fragment, ProviderError>;

/// A finite stream that yields `items` in order.
pub fn scripted_source(items: Vec<ScriptedItem>) -> FragmentStream {
    futures::stream::iter(items).boxed()
}

/// A stream fed by hand through the returned sender. The stream ends when
/// every sender is dropped.
pub fn channel_source(buffer: usize) -> (mpsc::Sender<ScriptedItem>, FragmentStream) {
    let (tx, rx) = mpsc::channel(buffer);
    (tx, ReceiverStream::new(rx).boxed())
}

/// Split text into content fragments the way a provider tends to: one
/// fragment per word, each keeping its trailing space.
pub fn word_fragments(text: &str) -> Vec<ScriptedItem> {
    text.split_inclusive(' ')
        .map(|piece| Ok(Fragment::content(piece)))
        .collect()
}

/// Provider that replays queued responses instead of calling a network API.
pub struct ScriptedProvider {
    name: String,
    streams: Mutex<VecDeque<Result<Vec<ScriptedItem>, ProviderError>>>,
    completions: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::named("scripted")
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            streams: Mutex::new(VecDeque::new()),
            completions: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue the items of the next `stream` call.
    pub fn push_stream(&self, items: Vec<ScriptedItem>) -> &Self {
        self.lock_streams().push_back(Ok(items));
        self
    }

    /// Make the next `stream` call fail before producing any fragment.
    pub fn push_stream_error(&self, err: ProviderError) -> &Self {
        self.lock_streams().push_back(Err(err));
        self
    }

    /// Queue the reply of the next `complete` call.
    pub fn push_completion(&self, text: impl Into<String>) -> &Self {
        self.lock_completions().push_back(Ok(text.into()));
        self
    }

    pub fn push_completion_error(&self, err: ProviderError) -> &Self {
        self.lock_completions().push_back(Err(err));
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .expect("scripted requests lock poisoned")
            .clone()
    }

    fn record(&self, request: &ChatRequest) {
        self.requests
            .lock()
            .expect("scripted requests lock poisoned")
            .push(request.clone());
    }

    fn lock_streams(
        &self,
    ) -> std::sync::MutexGuard<'_, VecDeque<Result<Vec<ScriptedItem>, ProviderError>>> {
        self.streams.lock().expect("scripted streams lock poisoned")
    }

    fn lock_completions(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, ProviderError>>> {
        self.completions
            .lock()
            .expect("scripted completions lock poisoned")
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: &ChatRequest) -> Result<FragmentStream, ProviderError> {
        self.record(request);
        let next = self.lock_streams().pop_front();
        match next {
            Some(Ok(items)) => Ok(scripted_source(items)),
            Some(Err(err)) => Err(err),
            None => Err(ProviderError::configuration(
                "scripted provider has no stream queued",
            )),
        }
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        self.record(request);
        let next = self.lock_completions().pop_front();
        next.unwrap_or_else(|| {
            Err(ProviderError::configuration(
                "scripted provider has no completion queued",
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_fragments_preserve_text() {
        let items = word_fragments("Tell me a joke");
        let text: String = items
            .into_iter()
            .map(|item| match item.unwrap() {
                Fragment::Content { text } => text,
                other => panic!("expected content, got {:?}", other),
            })
            .collect();
        assert_eq!(text, "Tell me a joke");
    }

    #[tokio::test]
    async fn replays_streams_in_order_and_records_requests() {
        let provider = ScriptedProvider::new();
        provider
            .push_stream(vec![Ok(Fragment::content("first"))])
            .push_stream_error(ProviderError::from_status(401, "bad key"));

        let request = ChatRequest::new("m").user("hi").streaming();
        let items: Vec<_> = provider.stream(&request).await.unwrap().collect().await;
        assert_eq!(items, vec![Ok(Fragment::content("first"))]);

        let err = provider.stream(&request).await.err().unwrap();
        assert_eq!(err.status, Some(401));

        assert!(provider.stream(&request).await.is_err());
        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn completions_are_fifo() {
        let provider = ScriptedProvider::new();
        provider.push_completion("a").push_completion("b");
        let req = ChatRequest::new("m");
        assert_eq!(provider.complete(&req).await.unwrap(), "a");
        assert_eq!(provider.complete(&req).await.unwrap(), "b");
        assert!(provider.complete(&req).await.is_err());
    }

    #[tokio::test]
    async fn channel_source_ends_when_sender_drops() {
        let (tx, mut stream) = channel_source(2);
        tx.send(Ok(Fragment::content("x"))).await.unwrap();
        drop(tx);
        assert_eq!(stream.next().await, Some(Ok(Fragment::content("x"))));
        assert_eq!(stream.next().await, None);
    }
}
