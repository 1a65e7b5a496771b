//! Path resolution and runtime configuration.
//!
//! Mirrors the home-directory-rooted layout: a single `orchestra_home`
//! directory holds the session store, message queue, shared agent config,
//! per-project worktrees, and logs. The directory is resolved once per
//! process and is overridable via `ORCHESTRA_HOME_DIR` so tests can sandbox
//! it.

use std::path::{Path, PathBuf};

/// Default MCP tool-service port.
pub const DEFAULT_MCP_PORT: u16 = 8765;
/// Default monitor HTTP-service port.
pub const DEFAULT_MONITOR_PORT: u16 = 8081;

/// Get the base directory for Orchestra's state.
///
/// # Panics
///
/// Panics if the home directory cannot be determined and
/// `ORCHESTRA_HOME_DIR` is not set.
#[must_use]
pub fn home_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ORCHESTRA_HOME_DIR") {
        return PathBuf::from(dir);
    }

    #[expect(clippy::expect_used, reason = "home directory is required for operation")]
    dirs::home_dir()
        .expect("Could not find home directory")
        .join(".orchestra")
}

/// Path to the global session store document.
#[must_use]
pub fn sessions_path() -> PathBuf {
    home_dir().join("sessions.json")
}

/// Path to the append-only designer message queue.
#[must_use]
pub fn messages_path() -> PathBuf {
    home_dir().join("messages.jsonl")
}

/// Directory holding static/generated configuration consumed by agent
/// terminals and containers.
#[must_use]
pub fn config_dir() -> PathBuf {
    home_dir().join("config")
}

/// Path to the multiplexer config file written out on first run.
#[must_use]
pub fn tmux_conf_path() -> PathBuf {
    config_dir().join("tmux.conf")
}

/// Directory holding the vendored Dockerfile, built into the container
/// image once on first containerized session.
#[must_use]
pub fn dockerfile_dir() -> PathBuf {
    config_dir().join("docker")
}

const VENDORED_TMUX_CONF: &str = include_str!("../assets/tmux.conf");
const VENDORED_DOCKERFILE: &str = include_str!("../assets/Dockerfile");

/// Write out the vendored `tmux.conf` and `Dockerfile` if they aren't
/// already present. Never overwrites an operator's customized copy.
pub async fn ensure_static_assets() -> anyhow::Result<()> {
    ensure_static_assets_in(&config_dir(), &dockerfile_dir()).await
}

async fn ensure_static_assets_in(config_dir: &Path, dockerfile_dir: &Path) -> anyhow::Result<()> {
    let tmux_conf = config_dir.join("tmux.conf");
    if !tokio::fs::try_exists(&tmux_conf).await.unwrap_or(false) {
        tokio::fs::create_dir_all(config_dir).await?;
        tokio::fs::write(&tmux_conf, VENDORED_TMUX_CONF).await?;
    }

    let dockerfile = dockerfile_dir.join("Dockerfile");
    if !tokio::fs::try_exists(&dockerfile).await.unwrap_or(false) {
        tokio::fs::create_dir_all(dockerfile_dir).await?;
        tokio::fs::write(&dockerfile, VENDORED_DOCKERFILE).await?;
    }

    Ok(())
}

/// Path to the optional custom agent-definition file.
#[must_use]
pub fn agents_yaml_path() -> PathBuf {
    config_dir().join("agents.yaml")
}

/// Shared agent config directory, mounted read/write into every container so
/// a one-time human login persists across sessions.
#[must_use]
pub fn shared_agent_config_dir() -> PathBuf {
    home_dir().join("shared-claude")
}

/// Shared agent JSON config file, mounted alongside the directory above.
#[must_use]
pub fn shared_agent_config_json() -> PathBuf {
    home_dir().join("shared-claude.json")
}

/// Root directory for custom-agent workspaces, one subdirectory per project.
#[must_use]
pub fn subagents_dir() -> PathBuf {
    home_dir().join("subagents")
}

/// Root directory for executor worktrees, one subdirectory per project.
#[must_use]
pub fn worktrees_dir() -> PathBuf {
    home_dir().join("worktrees")
}

/// Worktree path for a given project basename and session id.
#[must_use]
pub fn worktree_path(project_basename: &str, session_id: &str) -> PathBuf {
    worktrees_dir().join(project_basename).join(session_id)
}

/// Custom-agent workspace path for a given project basename and session id.
#[must_use]
pub fn subagent_path(project_basename: &str, session_id: &str) -> PathBuf {
    subagents_dir().join(project_basename).join(session_id)
}

/// Directory holding relocated, stable `.git` targets.
#[must_use]
pub fn repos_dir() -> PathBuf {
    home_dir().join("repos")
}

/// Stable relocation target for a project's `.git` directory.
#[must_use]
pub fn repo_git_path(project_basename: &str) -> PathBuf {
    repos_dir().join(project_basename).join(".git")
}

/// Directory for log files.
#[must_use]
pub fn logs_dir() -> PathBuf {
    home_dir().join("logs")
}

/// Returns the basename of a project path, used as the store/worktree key.
#[must_use]
pub fn project_basename(source_path: &Path) -> String {
    source_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| source_path.to_string_lossy().to_string())
}

/// Resolved network ports for the MCP and monitor HTTP services.
#[derive(Debug, Clone, Copy)]
pub struct Ports {
    pub mcp: u16,
    pub monitor: u16,
}

impl Ports {
    /// Resolve ports from the environment, falling back to the documented
    /// defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            mcp: parse_port_env("ORCHESTRA_MCP_PORT", DEFAULT_MCP_PORT),
            monitor: parse_port_env("ORCHESTRA_MONITOR_PORT", DEFAULT_MONITOR_PORT),
        }
    }
}

fn parse_port_env(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(default)
}

/// Base URL the hook forwarder posts lifecycle events to.
#[must_use]
pub fn monitor_base_url() -> String {
    std::env::var("CLAUDE_MONITOR_BASE")
        .unwrap_or_else(|_| format!("http://127.0.0.1:{DEFAULT_MONITOR_PORT}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // NOTE: tests exercising ORCHESTRA_HOME_DIR/ORCHESTRA_MCP_PORT/ORCHESTRA_MONITOR_PORT
    // overrides are omitted because std::env::set_var/remove_var are unsafe in this
    // edition, which is forbidden crate-wide. home_dir()/Ports::from_env() are thin
    // enough that manual testing covers them.

    #[test]
    fn worktree_path_nests_by_project_then_session() {
        let p = worktree_path("myproj", "myproj-child");
        assert_eq!(p.file_name().unwrap(), "myproj-child");
        assert_eq!(p.parent().unwrap().file_name().unwrap(), "myproj");
    }

    #[test]
    fn parse_port_env_falls_back_to_default_for_missing_key() {
        assert_eq!(parse_port_env("ORCHESTRA_TEST_PORT_KEY_THAT_DOES_NOT_EXIST", 1234), 1234);
    }

    #[tokio::test]
    async fn ensure_static_assets_writes_once_and_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join("config");
        let docker_dir = dir.path().join("config/docker");

        ensure_static_assets_in(&config_dir, &docker_dir).await.unwrap();
        assert!(config_dir.join("tmux.conf").exists());
        assert!(docker_dir.join("Dockerfile").exists());

        tokio::fs::write(config_dir.join("tmux.conf"), "custom").await.unwrap();
        ensure_static_assets_in(&config_dir, &docker_dir).await.unwrap();
        let contents = tokio::fs::read_to_string(config_dir.join("tmux.conf")).await.unwrap();
        assert_eq!(contents, "custom");
    }
}
