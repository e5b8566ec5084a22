// ABOUTME: Session module: chat transcripts on disk.
// ABOUTME: Provides JSONL logging of messages per working directory.

pub mod log;

pub use log::{LogEntry, SessionLogger, read_transcript, workspace_hash};
