// ABOUTME: Library root for streamclaw; re-exports all modules for integration testing.
// ABOUTME: The binary entry point is in main.rs, which uses this crate as a library.

pub mod agent;
pub mod app;
pub mod config;
pub mod guardrail;
pub mod provider;
pub mod session;
pub mod stream;
