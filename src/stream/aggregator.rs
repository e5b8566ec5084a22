// ABOUTME: StreamAggregator: pulls fragments one at a time and folds them into state.
// ABOUTME: Drives per-fragment observers, cooperative cancellation, and partial-failure reporting.

use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::fragment::Fragment;
use super::state::{AggregationState, Anomaly};
use crate::provider::ProviderError;

/// Lifecycle of one aggregator. `Completed`, `Interrupted` and `Cancelled`
/// are terminal and only reachable from `Consuming`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Consuming,
    Completed,
    Interrupted,
    Cancelled,
}

/// How a successful consumption ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStatus {
    /// The fragment sequence ended normally.
    Completed,
    /// The caller cancelled; the state holds everything applied before that.
    Cancelled,
}

/// Final result of a consumption that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationOutcome {
    pub status: AggregationStatus,
    pub state: AggregationState,
}

impl AggregationOutcome {
    pub fn is_cancelled(&self) -> bool {
        self.status == AggregationStatus::Cancelled
    }

    /// The terminal phase the aggregator ended in.
    pub fn phase(&self) -> Phase {
        match self.status {
            AggregationStatus::Completed => Phase::Completed,
            AggregationStatus::Cancelled => Phase::Cancelled,
        }
    }

    pub fn into_state(self) -> AggregationState {
        self.state
    }
}

/// The fragment source failed mid-sequence. Carries everything collected
/// before the failure so the caller can decide whether it is usable.
#[derive(Debug, thiserror::Error)]
#[error("stream interrupted after {} fragments: {cause}", .partial_state.fragments_seen)]
pub struct StreamInterrupted {
    pub partial_state: AggregationState,
    #[source]
    pub cause: ProviderError,
}

impl StreamInterrupted {
    /// Always [`Phase::Interrupted`].
    pub fn phase(&self) -> Phase {
        Phase::Interrupted
    }
}

/// What the next poll of the source produced.
enum Pulled {
    Fragment(Fragment),
    Failed(ProviderError),
    Exhausted,
    Cancelled,
}

/// Single-use consumer of one fragment stream.
///
/// `consume` takes the aggregator by value, so each stream needs a fresh
/// instance and no state is ever shared between consumptions. The phase it
/// ends in is reported by [`AggregationOutcome::phase`] or
/// [`StreamInterrupted::phase`].
pub struct StreamAggregator {
    phase: Phase,
    cancel: CancellationToken,
}

impl Default for StreamAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAggregator {
    /// Create an aggregator that can only be cancelled through
    /// [`cancellation_token`](Self::cancellation_token).
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// Create an aggregator that stops when `cancel` fires.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            phase: Phase::Idle,
            cancel,
        }
    }

    /// A handle that cancels this aggregator's consumption when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Consume the stream without an observer.
    pub async fn consume<S>(self, fragments: S) -> Result<AggregationOutcome, StreamInterrupted>
    where
        S: Stream<Item = Result<Fragment, ProviderError>>,
    {
        self.consume_with(fragments, |_| {}).await
    }

    /// Consume the stream, calling `on_update` synchronously after every
    /// fragment with a read-only view of the state.
    ///
    /// Cancellation is checked only between fragments: a fragment is either
    /// fully applied and observed, or not applied at all. If cancellation and
    /// a ready fragment race, cancellation wins.
    pub async fn consume_with<S, F>(
        mut self,
        fragments: S,
        mut on_update: F,
    ) -> Result<AggregationOutcome, StreamInterrupted>
    where
        S: Stream<Item = Result<Fragment, ProviderError>>,
        F: FnMut(&AggregationState),
    {
        let mut fragments = std::pin::pin!(fragments);
        let mut state = AggregationState::new();
        self.transition(Phase::Consuming);

        loop {
            let pulled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Pulled::Cancelled,
                next = fragments.next() => match next {
                    Some(Ok(fragment)) => Pulled::Fragment(fragment),
                    Some(Err(cause)) => Pulled::Failed(cause),
                    None => Pulled::Exhausted,
                },
            };

            match pulled {
                Pulled::Fragment(fragment) => {
                    if let Some(Anomaly::ProtocolViolation {
                        fragment_index,
                        delta,
                    }) = state.apply(&fragment)
                    {
                        tracing::warn!(
                            fragment_index,
                            delta_len = delta.len(),
                            "function-call argument delta arrived with no open call; ignoring"
                        );
                    }
                    on_update(&state);
                }
                Pulled::Failed(cause) => {
                    self.transition(Phase::Interrupted);
                    tracing::warn!(
                        fragments = state.fragments_seen,
                        error = %cause,
                        "fragment stream failed"
                    );
                    return Err(StreamInterrupted {
                        partial_state: state,
                        cause,
                    });
                }
                Pulled::Exhausted => {
                    self.transition(Phase::Completed);
                    return Ok(AggregationOutcome {
                        status: AggregationStatus::Completed,
                        state,
                    });
                }
                Pulled::Cancelled => {
                    self.transition(Phase::Cancelled);
                    return Ok(AggregationOutcome {
                        status: AggregationStatus::Cancelled,
                        state,
                    });
                }
            }
        }
    }

    fn transition(&mut self, next: Phase) {
        debug_assert!(
            matches!(
                (self.phase, next),
                (Phase::Idle, Phase::Consuming)
                    | (
                        Phase::Consuming,
                        Phase::Completed | Phase::Interrupted | Phase::Cancelled
                    )
            ),
            "invalid aggregator transition {:?} -> {:?}",
            self.phase,
            next
        );
        tracing::debug!(from = ?self.phase, to = ?next, "aggregator phase change");
        self.phase = next;
    }
}
