//! `AgentProtocol`: the control plane polymorphic over local-terminal and
//! containerized-terminal sessions.

use async_trait::async_trait;
use std::path::Path;

/// Observable status of a terminal-backed agent, as reported by the
/// multiplexer (and, for containerized sessions, gated on the container
/// being up first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AgentStatus {
    pub exists: bool,
    pub windows: u32,
    pub attached: bool,
}

/// Control-plane operations over a running (or not-yet-running) agent
/// terminal. Every operation reports success as a boolean or a
/// `(success, error)` pair rather than propagating across this boundary;
/// callers that need a hard error wrap the result themselves. Implementors
/// never mutate session persistence.
#[async_trait]
pub trait AgentProtocol: Send + Sync {
    /// Ensure a detached terminal session exists, running the agent CLI in
    /// `work_path`. Idempotent: returns `true` if a session already exists.
    async fn start(&self, session_id: &str, work_path: &Path) -> bool;

    /// Report whether the session exists and its window/attach state.
    async fn status(&self, session_id: &str) -> AgentStatus;

    /// Deliver `text` followed by a carriage return to pane 0. Success iff
    /// both underlying commands succeeded.
    async fn send_message(&self, session_id: &str, text: &str) -> bool;

    /// Respawn `target_pane` (in the caller's own terminal) with a command
    /// that re-attaches to `session_id`.
    fn attach_command(&self, session_id: &str) -> Vec<String>;

    /// Kill the terminal session (local) or stop and remove the container
    /// (containerized). Worktree and persisted state are untouched.
    async fn delete(&self, session_id: &str) -> bool;
}
