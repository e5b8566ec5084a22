// ABOUTME: Integration tests for stream aggregation through the public API.
// ABOUTME: Covers concatenation, call attribution, observers, anomalies, cancellation, and failures.

use bytes::Bytes;
use futures::stream;
use tokio_util::sync::CancellationToken;

use streamclaw::provider::adapter::fragments_from_sse;
use streamclaw::provider::scripted::{channel_source, scripted_source};
use streamclaw::provider::{ProviderError, ProviderErrorKind};
use streamclaw::stream::{
    AggregationStatus, Anomaly, Fragment, FunctionCallRecord, Phase, StreamAggregator,
};

fn contents(texts: &[&str]) -> Vec<Result<Fragment, ProviderError>> {
    texts.iter().map(|t| Ok(Fragment::content(*t))).collect()
}

/// The full text is the in-order concatenation of every content fragment,
/// including empty, whitespace-only, and multi-byte pieces.
#[tokio::test]
async fn full_text_is_concatenation_of_contents() {
    let pieces = ["Über", " ", "", "naïve ", "café", "\n", "日本語", "!"];
    let outcome = StreamAggregator::new()
        .consume(scripted_source(contents(&pieces)))
        .await
        .unwrap();
    assert_eq!(outcome.status, AggregationStatus::Completed);
    assert_eq!(outcome.state.full_text, pieces.concat());
    assert_eq!(outcome.state.char_count, pieces.concat().chars().count());
    assert_eq!(outcome.state.fragments_seen, pieces.len());
}

/// Each delta belongs to the most recent start; content in between does not
/// disturb attribution.
#[tokio::test]
async fn argument_deltas_attach_to_latest_call() {
    let fragments = vec![
        Ok(Fragment::call_start("get_weather")),
        Ok(Fragment::args_delta("{\"location\":")),
        Ok(Fragment::content("checking ")),
        Ok(Fragment::args_delta("\"Paris\"}")),
        Ok(Fragment::call_start("get_time")),
        Ok(Fragment::call_start("get_news")),
        Ok(Fragment::args_delta("{}")),
    ];
    let state = StreamAggregator::new()
        .consume(scripted_source(fragments))
        .await
        .unwrap()
        .into_state();

    assert_eq!(
        state.calls,
        vec![
            FunctionCallRecord {
                name: "get_weather".into(),
                arguments: "{\"location\":\"Paris\"}".into()
            },
            FunctionCallRecord {
                name: "get_time".into(),
                arguments: String::new()
            },
            FunctionCallRecord {
                name: "get_news".into(),
                arguments: "{}".into()
            },
        ]
    );
    assert_eq!(state.full_text, "checking ");
    assert_eq!(state.calls[0].parse_arguments().unwrap()["location"], "Paris");
    assert!(state.calls[1].parse_arguments().unwrap().as_object().unwrap().is_empty());
}

/// One observation per fragment, each a prefix extension of the previous,
/// with counters that never decrease.
#[tokio::test]
async fn observer_sees_growing_prefixes_once_per_fragment() {
    let fragments = vec![
        Ok(Fragment::content("One. ")),
        Ok(Fragment::call_start("f")),
        Ok(Fragment::content("Two! ")),
        Ok(Fragment::args_delta("{}")),
        Ok(Fragment::content("Three?")),
    ];
    let mut snapshots = Vec::new();
    StreamAggregator::new()
        .consume_with(scripted_source(fragments), |state| {
            snapshots.push(state.clone())
        })
        .await
        .unwrap();

    assert_eq!(snapshots.len(), 5);
    for pair in snapshots.windows(2) {
        assert!(pair[1].full_text.starts_with(&pair[0].full_text));
        assert!(pair[1].word_count >= pair[0].word_count);
        assert!(pair[1].sentence_count >= pair[0].sentence_count);
        assert_eq!(pair[1].fragments_seen, pair[0].fragments_seen + 1);
    }
    assert_eq!(snapshots[4].sentence_count, 3);
}

/// An argument delta before any call is recorded and skipped; the stream
/// keeps going.
#[tokio::test]
async fn orphan_delta_is_recorded_and_skipped() {
    let fragments = vec![
        Ok(Fragment::args_delta("{\"lost\":true}")),
        Ok(Fragment::content("still ")),
        Ok(Fragment::call_start("f")),
        Ok(Fragment::args_delta("{}")),
        Ok(Fragment::content("here")),
    ];
    let state = StreamAggregator::new()
        .consume(scripted_source(fragments))
        .await
        .unwrap()
        .into_state();

    assert_eq!(
        state.anomalies,
        vec![Anomaly::ProtocolViolation {
            fragment_index: 0,
            delta: "{\"lost\":true}".into()
        }]
    );
    assert_eq!(state.full_text, "still here");
    assert_eq!(state.calls[0].arguments, "{}");
}

/// Cancelling after N fragments keeps exactly the first N contents, for
/// every N.
#[tokio::test]
async fn cancel_after_n_keeps_first_n_contents() {
    let pieces = ["a ", "b ", "c ", "d ", "e"];
    for n in 1..=pieces.len() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut seen = 0;
        let outcome = StreamAggregator::with_cancellation(cancel)
            .consume_with(scripted_source(contents(&pieces)), |_| {
                seen += 1;
                if seen == n {
                    trigger.cancel();
                }
            })
            .await
            .unwrap();

        let expected = pieces[..n].concat();
        assert_eq!(outcome.state.full_text, expected, "n = {}", n);
        if n < pieces.len() {
            assert_eq!(outcome.status, AggregationStatus::Cancelled, "n = {}", n);
        }
    }
}

/// Cancellation from outside while the source is idle ends consumption
/// with the text seen so far.
#[tokio::test]
async fn external_cancel_while_waiting() {
    let (tx, source) = channel_source(4);
    let aggregator = StreamAggregator::new();
    let cancel = aggregator.cancellation_token();

    tx.send(Ok(Fragment::content("waiting for more"))).await.unwrap();
    let consumer = tokio::spawn(aggregator.consume(source));
    tokio::task::yield_now().await;
    cancel.cancel();

    let outcome = consumer.await.unwrap().unwrap();
    assert!(outcome.is_cancelled());
    assert_eq!(outcome.phase(), Phase::Cancelled);
    assert!("waiting for more".starts_with(&outcome.state.full_text));
    drop(tx);
}

#[tokio::test]
async fn scenario_hello_world() {
    let state = StreamAggregator::new()
        .consume(scripted_source(contents(&["Hello ", "world", "!"])))
        .await
        .unwrap()
        .into_state();
    assert_eq!(state.full_text, "Hello world!");
    assert_eq!(state.word_count, 2);
    assert_eq!(state.sentence_count, 1);
}

#[tokio::test]
async fn scenario_weather_call() {
    let fragments = vec![
        Ok(Fragment::call_start("get_weather")),
        Ok(Fragment::args_delta("{\"loc\":")),
        Ok(Fragment::args_delta("\"NYC\"}")),
    ];
    let state = StreamAggregator::new()
        .consume(scripted_source(fragments))
        .await
        .unwrap()
        .into_state();
    assert_eq!(
        state.calls,
        vec![FunctionCallRecord {
            name: "get_weather".into(),
            arguments: "{\"loc\":\"NYC\"}".into()
        }]
    );
}

#[tokio::test]
async fn scenario_transport_fault_after_two_fragments() {
    let mut fragments = contents(&["Once upon ", "a time"]);
    fragments.push(Err(ProviderError::transport("connection reset by peer")));
    fragments.push(Ok(Fragment::content(" never seen")));

    let err = StreamAggregator::new()
        .consume(scripted_source(fragments))
        .await
        .unwrap_err();
    assert_eq!(err.partial_state.full_text, "Once upon a time");
    assert_eq!(err.cause.kind, ProviderErrorKind::Transport);
}

/// Raw SSE bytes split at awkward points flow through the adapter into the
/// aggregator and produce the same result as pre-parsed fragments.
#[tokio::test]
async fn sse_body_aggregates_end_to_end() {
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hello \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"world!\"}}]}\n\n",
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{\"function_call\":{\"name\":\"get_weather\",\"arguments\":\"\"}}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"function_call\":{\"arguments\":\"{\\\"loc\\\":\\\"NYC\\\"}\"}}}]}\n\n",
        "data: [DONE]\n\n",
    );
    let chunks: Vec<Result<Bytes, ProviderError>> = body
        .as_bytes()
        .chunks(7)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();

    let state = StreamAggregator::new()
        .consume(fragments_from_sse(stream::iter(chunks)))
        .await
        .unwrap()
        .into_state();
    assert_eq!(state.full_text, "Hello world!");
    assert_eq!(state.word_count, 2);
    assert_eq!(state.calls[0].name, "get_weather");
    assert_eq!(state.calls[0].arguments, "{\"loc\":\"NYC\"}");
}

/// A malformed SSE payload fails the stream with the text collected so far.
#[tokio::test]
async fn malformed_sse_payload_interrupts() {
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
        "data: {not json\n\n",
    );
    let chunks: Vec<Result<Bytes, ProviderError>> = vec![Ok(Bytes::from_static(body.as_bytes()))];

    let err = StreamAggregator::new()
        .consume(fragments_from_sse(stream::iter(chunks)))
        .await
        .unwrap_err();
    assert_eq!(err.partial_state.full_text, "partial");
    assert_eq!(err.cause.kind, ProviderErrorKind::Malformed);
}
