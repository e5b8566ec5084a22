// ABOUTME: Aggregation state: the single reducer that folds fragments into a message.
// ABOUTME: Tracks full text, function calls, live counters, and recorded anomalies.

use serde::Serialize;

use super::fragment::{Fragment, FunctionCallRecord};

/// Sentence terminators counted by the live statistics.
const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// A non-fatal irregularity observed while reducing fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// An argument delta arrived while no function call was open.
    ProtocolViolation {
        /// Zero-based position of the offending fragment in the stream.
        fragment_index: usize,
        delta: String,
    },
}

/// Snapshot of the live counters, cheap to copy into a display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LiveStats {
    pub words: usize,
    pub sentences: usize,
    pub characters: usize,
}

/// Accumulator owned by exactly one in-progress consumption.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregationState {
    /// Concatenation of every content fragment seen so far.
    pub full_text: String,
    pub calls: Vec<FunctionCallRecord>,
    pub word_count: usize,
    pub sentence_count: usize,
    pub char_count: usize,
    pub fragments_seen: usize,
    pub anomalies: Vec<Anomaly>,
}

impl AggregationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one fragment.
    ///
    /// Counters are advanced from this fragment's text alone, never by
    /// rescanning `full_text`. A word split across two content fragments is
    /// therefore counted twice; that approximation is accepted.
    ///
    /// Returns the anomaly recorded for this fragment, if any.
    pub fn apply(&mut self, fragment: &Fragment) -> Option<Anomaly> {
        let index = self.fragments_seen;
        self.fragments_seen += 1;

        match fragment {
            Fragment::Content { text } => {
                self.full_text.push_str(text);
                self.word_count += text.split_whitespace().count();
                self.sentence_count += text
                    .chars()
                    .filter(|c| SENTENCE_TERMINATORS.contains(c))
                    .count();
                self.char_count += text.chars().count();
                None
            }
            Fragment::FunctionCallStart { name } => {
                self.calls.push(FunctionCallRecord::new(name.clone()));
                None
            }
            Fragment::FunctionCallArgsDelta { text } => match self.calls.last_mut() {
                Some(call) => {
                    call.arguments.push_str(text);
                    None
                }
                None => {
                    let anomaly = Anomaly::ProtocolViolation {
                        fragment_index: index,
                        delta: text.clone(),
                    };
                    self.anomalies.push(anomaly.clone());
                    Some(anomaly)
                }
            },
        }
    }

    pub fn stats(&self) -> LiveStats {
        LiveStats {
            words: self.word_count,
            sentences: self.sentence_count,
            characters: self.char_count,
        }
    }

    /// True when neither text nor function calls have been collected.
    pub fn is_empty(&self) -> bool {
        self.full_text.is_empty() && self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(fragments: &[Fragment]) -> AggregationState {
        let mut state = AggregationState::new();
        for fragment in fragments {
            state.apply(fragment);
        }
        state
    }

    #[test]
    fn hello_world_counts() {
        let state = fold(&[
            Fragment::content("Hello "),
            Fragment::content("world"),
            Fragment::content("!"),
        ]);
        assert_eq!(state.full_text, "Hello world!");
        assert_eq!(state.word_count, 2);
        assert_eq!(state.sentence_count, 1);
        assert_eq!(state.char_count, 12);
        assert_eq!(state.fragments_seen, 3);
    }

    #[test]
    fn word_split_across_fragments_overcounts_by_one() {
        let state = fold(&[Fragment::content("pro"), Fragment::content("gramming")]);
        assert_eq!(state.full_text, "programming");
        assert_eq!(state.word_count, 2);
    }

    #[test]
    fn counts_every_terminator_in_a_fragment() {
        let state = fold(&[Fragment::content("Really?! Yes. No...")]);
        assert_eq!(state.sentence_count, 6);
    }

    #[test]
    fn char_count_is_unicode_aware() {
        let state = fold(&[Fragment::content("héllo "), Fragment::content("🤖")]);
        assert_eq!(state.char_count, 7);
    }

    #[test]
    fn args_attach_to_latest_call() {
        let state = fold(&[
            Fragment::call_start("first"),
            Fragment::args_delta("{\"a\":"),
            Fragment::args_delta("1}"),
            Fragment::call_start("second"),
            Fragment::args_delta("{}"),
        ]);
        assert_eq!(state.calls.len(), 2);
        assert_eq!(state.calls[0].arguments, "{\"a\":1}");
        assert_eq!(state.calls[1].name, "second");
        assert_eq!(state.calls[1].arguments, "{}");
    }

    #[test]
    fn orphan_delta_is_recorded_and_ignored() {
        let mut state = AggregationState::new();
        let anomaly = state.apply(&Fragment::args_delta("{\"x\":1}"));
        assert_eq!(
            anomaly,
            Some(Anomaly::ProtocolViolation {
                fragment_index: 0,
                delta: "{\"x\":1}".to_string(),
            })
        );
        assert!(state.calls.is_empty());
        assert_eq!(state.anomalies.len(), 1);

        state.apply(&Fragment::content("still here"));
        assert_eq!(state.full_text, "still here");
        assert_eq!(state.fragments_seen, 2);
    }

    #[test]
    fn function_fragments_leave_counters_alone() {
        let state = fold(&[
            Fragment::call_start("get_weather"),
            Fragment::args_delta("{\"loc\": \"N.Y.C\"}"),
        ]);
        assert_eq!(state.stats(), LiveStats::default());
        assert!(state.full_text.is_empty());
        assert!(!state.is_empty());
    }

    #[test]
    fn new_state_is_empty() {
        assert!(AggregationState::new().is_empty());
    }
}
