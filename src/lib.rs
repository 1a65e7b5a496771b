//! Orchestra: a multi-agent coding-session orchestrator. Designer and
//! executor agents run in isolated git worktrees (optionally containers),
//! coordinate through an MCP tool service and a file-backed message queue,
//! and report lifecycle events to a batching monitor over HTTP.

pub mod backends;
pub mod config;
pub mod core;
pub mod hooks;
pub mod mcp;
pub mod messages;
pub mod supervisor;
pub mod workspace;
