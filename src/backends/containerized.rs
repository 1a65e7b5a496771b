//! Containerized terminal `AgentProtocol`: the same tmux command families as
//! [`super::terminal`], run inside the session's container via `docker
//! exec`, so attach/detach works uniformly with the local backend.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::container::{container_name, ContainerBackend};
use super::terminal::{
    build_display_message_args, build_has_session_args, build_kill_session_args,
    build_new_session_args, build_paste_buffer_args, build_send_enter_args, build_set_buffer_args,
    pane0,
};
use super::traits::{AgentProtocol, AgentStatus};

/// Runtime parameters needed to launch a container for a session, resolved
/// by the caller (the [`crate::core::session::Session`] that owns
/// `work_path` and the shared config paths).
#[derive(Debug, Clone)]
pub struct ContainerLaunchParams {
    pub work_path: std::path::PathBuf,
    pub shared_agent_config_dir: std::path::PathBuf,
    pub shared_agent_config_json: std::path::PathBuf,
    pub mcp_port: u16,
    pub monitor_port: u16,
    pub anthropic_api_key: Option<String>,
}

pub struct ContainerizedBackend {
    containers: ContainerBackend,
}

impl ContainerizedBackend {
    #[must_use]
    pub const fn new() -> Self {
        Self { containers: ContainerBackend::new() }
    }

    async fn exec(&self, session_id: &str, tmux_args: &[String]) -> anyhow::Result<std::process::Output> {
        let mut args = vec!["exec".to_owned(), container_name(session_id), "tmux".to_owned()];
        args.extend(tmux_args.iter().cloned());
        Ok(Command::new("docker").args(&args).output().await?)
    }

    /// Launch the container (idempotent) and then start the agent CLI
    /// inside it, once, over `docker exec`.
    pub async fn start_with(&self, session_id: &str, params: &ContainerLaunchParams) -> bool {
        if let Err(e) = crate::config::ensure_static_assets().await {
            tracing::error!(session_id, error = %e, "failed to materialize vendored container assets");
            return false;
        }
        if let Err(e) = self.containers.ensure_image(&crate::config::dockerfile_dir()).await {
            tracing::error!(session_id, error = %e, "failed to build orchestra agent image");
            return false;
        }

        if let Err(e) = self
            .containers
            .ensure_running(
                session_id,
                &params.work_path,
                &params.shared_agent_config_dir,
                &params.shared_agent_config_json,
                params.mcp_port,
                params.monitor_port,
                params.anthropic_api_key.as_deref(),
            )
            .await
        {
            tracing::error!(session_id, error = %e, "failed to ensure container running");
            return false;
        }
        self.start(session_id, Path::new(super::container::CONTAINER_WORK_PATH)).await
    }
}

impl Default for ContainerizedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentProtocol for ContainerizedBackend {
    async fn start(&self, session_id: &str, work_path: &Path) -> bool {
        match self.containers.is_running(session_id).await {
            Ok(true) => {}
            _ => return false,
        }

        if let Ok(out) = self.exec(session_id, &build_has_session_args(session_id)).await {
            if out.status.success() {
                return true;
            }
        }

        let command = vec!["claude".to_owned()];
        let Ok(out) = self.exec(session_id, &build_new_session_args(session_id, work_path, &command)).await
        else {
            return false;
        };
        if !out.status.success() {
            tracing::error!(
                session_id,
                stderr = %String::from_utf8_lossy(&out.stderr),
                "failed to create terminal session inside container"
            );
            return false;
        }

        tokio::time::sleep(Duration::from_millis(400)).await;
        let _ = self.exec(session_id, &build_send_enter_args(&pane0(session_id))).await;
        true
    }

    async fn status(&self, session_id: &str) -> AgentStatus {
        match self.containers.is_running(session_id).await {
            Ok(true) => {}
            _ => return AgentStatus::default(),
        }

        let Ok(has) = self.exec(session_id, &build_has_session_args(session_id)).await else {
            return AgentStatus::default();
        };
        if !has.status.success() {
            return AgentStatus::default();
        }

        let Ok(meta) = self.exec(session_id, &build_display_message_args(session_id)).await else {
            return AgentStatus { exists: true, windows: 1, attached: false };
        };
        let text = String::from_utf8_lossy(&meta.stdout);
        let mut parts = text.split_whitespace();
        let windows = parts.next().and_then(|s| s.parse().ok()).unwrap_or(1);
        let attached = parts.next().is_some_and(|s| s != "0");
        AgentStatus { exists: true, windows, attached }
    }

    async fn send_message(&self, session_id: &str, text: &str) -> bool {
        let pane = pane0(session_id);
        let Ok(set) = self.exec(session_id, &build_set_buffer_args(text)).await else {
            return false;
        };
        if !set.status.success() {
            return false;
        }
        let Ok(paste) = self.exec(session_id, &build_paste_buffer_args(&pane)).await else {
            return false;
        };
        if !paste.status.success() {
            return false;
        }
        let Ok(enter) = self.exec(session_id, &build_send_enter_args(&pane)).await else {
            return false;
        };
        enter.status.success()
    }

    fn attach_command(&self, session_id: &str) -> Vec<String> {
        vec![
            "docker".to_owned(),
            "exec".to_owned(),
            "-it".to_owned(),
            container_name(session_id),
            "tmux".to_owned(),
            "-L".to_owned(),
            super::terminal::SOCKET.to_owned(),
            "attach-session".to_owned(),
            "-t".to_owned(),
            session_id.to_owned(),
        ]
    }

    async fn delete(&self, session_id: &str) -> bool {
        // Killing the session is a courtesy; removing the container is what
        // actually matters, and implicitly kills the inner terminal too.
        let _ = self.exec(session_id, &build_kill_session_args(session_id)).await;
        self.containers.remove(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_command_wraps_tmux_in_docker_exec() {
        let backend = ContainerizedBackend::new();
        let cmd = backend.attach_command("proj-a");
        assert_eq!(cmd[0], "docker");
        assert!(cmd.contains(&"orchestra-proj-a".to_owned()));
        assert!(cmd.contains(&"attach-session".to_owned()));
    }
}
