//! Domain error types with rich context for debugging.

use std::path::PathBuf;
use thiserror::Error;

/// Errors related to session-tree operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session not found by name within a project.
    #[error("Session '{name}' not found in project '{project}'")]
    NotFound {
        /// The project the lookup was scoped to.
        project: String,
        /// The session name that was not found.
        name: String,
    },

    /// A sibling session already uses this name.
    #[error("Session name '{name}' already exists among the children of '{parent}'")]
    NameConflict {
        /// The parent whose children already contain `name`.
        parent: String,
        /// The conflicting name.
        name: String,
    },

    /// The named agent descriptor could not be resolved.
    #[error("Agent descriptor '{agent_type}' could not be resolved; session is stale")]
    StaleAgent {
        /// The unresolvable descriptor name.
        agent_type: String,
    },

    /// Session is in an invalid state for the attempted operation.
    #[error("Session '{name}' is in invalid state for operation '{operation}'")]
    InvalidState {
        /// The session name.
        name: String,
        /// The attempted operation.
        operation: String,
    },

    /// Underlying workspace step failed while preparing or spawning.
    #[error("Workspace operation failed for session '{name}': {source}")]
    WorkspaceFailed {
        /// The session name.
        name: String,
        /// The underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// The agent control plane reported a failure.
    #[error("Backend operation '{operation}' failed for session '{name}': {reason}")]
    BackendFailed {
        /// The session name.
        name: String,
        /// The attempted operation.
        operation: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// Store read/write failed.
    #[error("Store operation failed: {source}")]
    StoreFailed {
        /// The underlying error.
        #[source]
        source: anyhow::Error,
    },
}

/// Errors related to workspace primitives (relocation, worktrees, pairing).
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The stable relocation target already exists and points elsewhere.
    #[error("Cannot relocate .git for '{project}': {target} already exists and points elsewhere")]
    RelocationConflict {
        /// Project basename.
        project: String,
        /// The conflicting relocation target.
        target: PathBuf,
    },

    /// A non-empty directory already occupies the worktree path.
    #[error("Worktree path {path} exists and is non-empty")]
    WorktreePathOccupied {
        /// The occupied path.
        path: PathBuf,
    },

    /// The external `git` binary exited non-zero.
    #[error("git {args:?} failed: {stderr}")]
    GitCommandFailed {
        /// The arguments passed to git.
        args: Vec<String>,
        /// Captured stderr.
        stderr: String,
    },

    /// Pairing preconditions were not satisfied.
    #[error("Cannot {action} pairing for session '{name}': {reason}")]
    PairingPreconditionFailed {
        /// "enable" or "disable".
        action: &'static str,
        /// The session name.
        name: String,
        /// Human-readable reason.
        reason: String,
    },

    /// A step in the pairing swap failed after some steps already completed;
    /// the error carries confirmation that rollback was attempted.
    #[error("Pairing step '{step}' failed for session '{name}', rolled back: {source}")]
    PairingStepFailed {
        /// Which step failed ("rename", "rewrite-gitdir", "symlink").
        step: &'static str,
        /// The session name.
        name: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors related to the agent control plane (terminal / container backends).
#[derive(Debug, Error)]
pub enum BackendError {
    /// A required external tool is missing from PATH.
    #[error("required tool '{tool}' is not installed")]
    ToolMissing {
        /// The missing tool's binary name.
        tool: &'static str,
    },

    /// Command execution failed.
    #[error("command '{command}' failed: {stderr}")]
    CommandFailed {
        /// The command that failed.
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// Resource not found (session / container).
    #[error("resource '{resource}' not found")]
    ResourceNotFound {
        /// The resource identifier.
        resource: String,
    },
}

/// Errors related to the message queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Failed to acquire the advisory file lock within a reasonable time.
    #[error("failed to lock message queue file: {source}")]
    LockFailed {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to read or write the queue file.
    #[error("message queue I/O failed: {source}")]
    Io {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl From<std::io::Error> for QueueError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_not_found_message_contains_name_and_project() {
        let err = SessionError::NotFound {
            project: "/p".to_owned(),
            name: "designer".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("designer"));
        assert!(msg.contains("/p"));
    }

    #[test]
    fn workspace_path_occupied_contains_path() {
        let err = WorkspaceError::WorktreePathOccupied {
            path: PathBuf::from("/w/session"),
        };
        assert!(err.to_string().contains("/w/session"));
    }

    #[test]
    fn backend_tool_missing_names_tool() {
        let err = BackendError::ToolMissing { tool: "tmux" };
        assert!(err.to_string().contains("tmux"));
    }
}
