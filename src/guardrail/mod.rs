// ABOUTME: Guardrail module: text in, boolean tripwire out.
// ABOUTME: Configured checks run as single-shot structured completions.

pub mod check;
pub mod types;

pub use check::*;
pub use types::*;
