// ABOUTME: Streaming aggregation: turns a lazy fragment sequence into a full message.
// ABOUTME: Fragment types, the reducer state, and the single-use StreamAggregator.

pub mod aggregator;
pub mod fragment;
pub mod state;

pub use aggregator::*;
pub use fragment::*;
pub use state::*;
