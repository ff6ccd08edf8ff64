// Taskweave — Workflow automation engine in Rust
// License: Apache-2.0

pub mod action;
pub mod config;
pub mod logger;
pub mod prompt;
pub mod provider;
pub mod storage;
pub mod template;
pub mod workflow;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
