// ABOUTME: Chunk adapter: maps OpenAI-style streaming chunks onto Fragment values.
// ABOUTME: Handles text deltas, legacy function_call deltas, tool_calls deltas, and SSE byte bodies.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::Value;

use super::error::ProviderError;
use super::llm::FragmentStream;
use super::sse::{SseDecoder, SseEvent};
use crate::stream::Fragment;

/// Decode state threaded through the fragment stream.
struct SseFragments {
    body: BoxStream<'static, Result<Bytes, ProviderError>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<Fragment, ProviderError>>,
    /// Set after `[DONE]`, an error, or the end of the body; no more bytes are read.
    finished: bool,
}

impl SseFragments {
    fn absorb(&mut self, event: SseEvent) {
        if self.finished {
            return;
        }
        if event.is_done() {
            self.finished = true;
            return;
        }
        match chunk_to_fragments(&event.data) {
            Ok(fragments) => self.pending.extend(fragments.into_iter().map(Ok)),
            Err(err) => {
                self.pending.push_back(Err(err));
                self.finished = true;
            }
        }
    }
}

/// Turn a raw SSE response body into a fragment stream.
///
/// Fragments decoded before a failure are still delivered, followed by the
/// error as the final item. Nothing is read after `[DONE]`.
pub fn fragments_from_sse<S>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<Bytes, ProviderError>> + Send + 'static,
{
    let state = SseFragments {
        body: body.boxed(),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    for event in st.decoder.push(&chunk) {
                        st.absorb(event);
                    }
                }
                Some(Err(err)) => {
                    st.pending.push_back(Err(err));
                    st.finished = true;
                }
                None => {
                    if let Some(event) = st.decoder.finish() {
                        st.absorb(event);
                    }
                    st.finished = true;
                }
            }
        }
    })
    .boxed()
}

/// Translate one decoded `data:` payload into fragments, in emission order.
///
/// A payload may yield zero fragments (role-only or finish-reason chunks),
/// one, or several (a tool call that starts and carries arguments at once).
pub fn chunk_to_fragments(data: &str) -> Result<Vec<Fragment>, ProviderError> {
    let json: Value = serde_json::from_str(data)
        .map_err(|e| ProviderError::malformed(format!("invalid stream chunk: {}", e)))?;

    if let Some(error) = json.get("error") {
        return Err(ProviderError::from_stream_error(error));
    }

    let mut fragments = Vec::new();
    let Some(delta) = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("delta"))
    else {
        return Ok(fragments);
    };

    if let Some(content) = delta.get("content").and_then(|c| c.as_str())
        && !content.is_empty()
    {
        fragments.push(Fragment::content(content));
    }

    if let Some(call) = delta.get("function_call") {
        push_call_delta(call, &mut fragments);
    }

    if let Some(tool_calls) = delta.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            if let Some(function) = tool_call.get("function") {
                push_call_delta(function, &mut fragments);
            }
        }
    }

    Ok(fragments)
}

/// A `name` opens a new call; any `arguments` text that rides along belongs to it.
fn push_call_delta(call: &Value, fragments: &mut Vec<Fragment>) {
    if let Some(name) = call.get("name").and_then(|n| n.as_str())
        && !name.is_empty()
    {
        fragments.push(Fragment::call_start(name));
    }
    if let Some(arguments) = call.get("arguments").and_then(|a| a.as_str())
        && !arguments.is_empty()
    {
        fragments.push(Fragment::args_delta(arguments));
    }
}

/// Extract the assistant text from a non-streaming completion body.
pub fn completion_text(body: &Value) -> Result<String, ProviderError> {
    if let Some(error) = body.get("error") {
        return Err(ProviderError::from_stream_error(error));
    }
    body.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| ProviderError::malformed("completion has no choices[0].message.content"))
}
