// ABOUTME: Agent module: plain agents, guarded runs, and streaming conversations.
// ABOUTME: Everything here drives a provider through the stream aggregator or a single completion.

pub mod basic;
pub mod conversation;
pub mod guarded;

pub use basic::*;
pub use conversation::*;
pub use guarded::*;
