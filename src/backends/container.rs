//! Docker container lifecycle for containerized agent sessions.
//!
//! Responsible only for the container itself (image, create/reuse, mounts,
//! port forwarding). The terminal multiplexer inside the container is
//! driven separately, via `docker exec`, by [`super::containerized`].

use std::path::{Path, PathBuf};

use tokio::process::Command;

/// Vendored image tag, built once from `assets/Dockerfile`.
pub const IMAGE: &str = "orchestra-agent:latest";

/// Fixed in-container path the worktree (or source directory, for
/// designers) is mounted at.
pub const CONTAINER_WORK_PATH: &str = "/workspace";

/// Fixed in-container path the shared agent-config directory is mounted at,
/// so the one-time human login persists across containers.
pub const CONTAINER_AGENT_CONFIG_PATH: &str = "/home/agent/.claude";

/// Fixed in-container path the shared agent-config JSON file is mounted at,
/// alongside the directory above.
pub const CONTAINER_AGENT_CONFIG_JSON_PATH: &str = "/home/agent/.claude.json";

#[must_use]
pub fn container_name(session_id: &str) -> String {
    format!("orchestra-{session_id}")
}

/// Host UID:GID the container should run as, for correct file ownership on
/// bind-mounted volumes.
#[must_use]
pub fn host_uid_gid() -> (u32, u32) {
    #[cfg(unix)]
    {
        (users::get_current_uid(), users::get_current_gid())
    }
    #[cfg(not(unix))]
    {
        (0, 0)
    }
}

/// Build the `docker run` argument vector for a new detached, no-op
/// keepalive container. The agent CLI is started afterward, inside the
/// container, via the terminal backend.
#[must_use]
pub fn build_run_args(
    session_id: &str,
    work_path: &Path,
    shared_agent_config_dir: &Path,
    shared_agent_config_json: &Path,
    mcp_port: u16,
    monitor_port: u16,
    anthropic_api_key: Option<&str>,
) -> Vec<String> {
    let (uid, gid) = host_uid_gid();
    let mut args = vec![
        "run".to_owned(),
        "-d".to_owned(),
        "--name".to_owned(),
        container_name(session_id),
        "--user".to_owned(),
        format!("{uid}:{gid}"),
        "-v".to_owned(),
        format!("{}:{CONTAINER_WORK_PATH}", work_path.display()),
        "-v".to_owned(),
        format!("{}:{CONTAINER_AGENT_CONFIG_PATH}", shared_agent_config_dir.display()),
        "-v".to_owned(),
        format!("{}:{CONTAINER_AGENT_CONFIG_JSON_PATH}", shared_agent_config_json.display()),
        "-p".to_owned(),
        format!("127.0.0.1:{mcp_port}:{mcp_port}"),
        "-p".to_owned(),
        format!("127.0.0.1:{monitor_port}:{monitor_port}"),
        "-e".to_owned(),
        format!("CLAUDE_MONITOR_BASE=http://localhost:{monitor_port}"),
    ];
    if let Some(key) = anthropic_api_key {
        args.push("-e".to_owned());
        args.push(format!("ANTHROPIC_API_KEY={key}"));
    }
    args.push(IMAGE.to_owned());
    args.push("sleep".to_owned());
    args.push("infinity".to_owned());
    args
}

/// Docker container backend: image build, create/reuse, inspect, stop.
pub struct ContainerBackend;

impl ContainerBackend {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Build the vendored image if it doesn't already exist. Best-effort:
    /// logs on failure, since a stale image still lets existing containers
    /// keep running.
    pub async fn ensure_image(&self, dockerfile_dir: &Path) -> anyhow::Result<()> {
        let inspect = Command::new("docker")
            .args(["image", "inspect", IMAGE])
            .output()
            .await?;
        if inspect.status.success() {
            return Ok(());
        }

        let build = Command::new("docker")
            .args(["build", "-t", IMAGE])
            .arg(dockerfile_dir)
            .output()
            .await?;
        if !build.status.success() {
            anyhow::bail!(
                "docker build failed: {}",
                String::from_utf8_lossy(&build.stderr)
            );
        }
        tracing::info!(image = IMAGE, "Built orchestra agent image");
        Ok(())
    }

    /// `true` if a container with this name is currently running.
    pub async fn is_running(&self, session_id: &str) -> anyhow::Result<bool> {
        let output = Command::new("docker")
            .args(["ps", "--format", "{{.Names}}"])
            .output()
            .await?;
        if !output.status.success() {
            return Ok(false);
        }
        let name = container_name(session_id);
        Ok(String::from_utf8_lossy(&output.stdout).lines().any(|l| l == name))
    }

    /// `true` if a container with this name exists at all (running or
    /// stopped).
    async fn exists(&self, session_id: &str) -> anyhow::Result<bool> {
        let output = Command::new("docker")
            .args(["ps", "-a", "--format", "{{.Names}}"])
            .output()
            .await?;
        if !output.status.success() {
            return Ok(false);
        }
        let name = container_name(session_id);
        Ok(String::from_utf8_lossy(&output.stdout).lines().any(|l| l == name))
    }

    /// Idempotently ensure a running container exists for `session_id`: if
    /// running, reuse; if stopped, remove and recreate; if absent, create.
    pub async fn ensure_running(
        &self,
        session_id: &str,
        work_path: &Path,
        shared_agent_config_dir: &Path,
        shared_agent_config_json: &Path,
        mcp_port: u16,
        monitor_port: u16,
        anthropic_api_key: Option<&str>,
    ) -> anyhow::Result<()> {
        if self.is_running(session_id).await? {
            return Ok(());
        }

        if self.exists(session_id).await? {
            let rm = Command::new("docker")
                .args(["rm", "-f", &container_name(session_id)])
                .output()
                .await?;
            if !rm.status.success() {
                tracing::warn!(
                    session_id,
                    stderr = %String::from_utf8_lossy(&rm.stderr),
                    "failed to remove stopped container before recreating"
                );
            }
        }

        let args = build_run_args(
            session_id,
            work_path,
            shared_agent_config_dir,
            shared_agent_config_json,
            mcp_port,
            monitor_port,
            anthropic_api_key,
        );
        let run = Command::new("docker").args(&args).output().await?;
        if !run.status.success() {
            anyhow::bail!("docker run failed: {}", String::from_utf8_lossy(&run.stderr));
        }
        tracing::info!(session_id, "Started orchestra agent container");
        Ok(())
    }

    /// Stop and remove the container. Implicitly kills the inner terminal
    /// session.
    pub async fn remove(&self, session_id: &str) -> bool {
        let name = container_name(session_id);
        match Command::new("docker").args(["rm", "-f", &name]).output().await {
            Ok(out) => out.status.success(),
            Err(e) => {
                tracing::warn!(session_id, error = %e, "failed to remove container");
                false
            }
        }
    }

    /// Build the `docker exec` prefix used to run a command inside the
    /// container.
    #[must_use]
    pub fn exec_prefix(session_id: &str) -> Vec<String> {
        vec!["exec".to_owned(), container_name(session_id)]
    }
}

impl Default for ContainerBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use]
pub fn shared_agent_config_dir_default(home: &Path) -> PathBuf {
    home.join("agent-config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_name_is_prefixed() {
        assert_eq!(container_name("proj-a"), "orchestra-proj-a");
    }

    #[test]
    fn run_args_bind_ports_to_loopback_only() {
        let args = build_run_args(
            "proj-a",
            Path::new("/work"),
            Path::new("/cfg"),
            Path::new("/cfg.json"),
            8765,
            8081,
            None,
        );
        assert!(args.contains(&"127.0.0.1:8765:8765".to_owned()));
        assert!(args.contains(&"127.0.0.1:8081:8081".to_owned()));
        assert!(!args.iter().any(|a| a.starts_with("0.0.0.0")));
    }

    #[test]
    fn run_args_mount_shared_config_dir_and_json() {
        let args = build_run_args(
            "proj-a",
            Path::new("/work"),
            Path::new("/cfg"),
            Path::new("/cfg.json"),
            8765,
            8081,
            None,
        );
        assert!(args.contains(&format!("/cfg:{CONTAINER_AGENT_CONFIG_PATH}")));
        assert!(args.contains(&format!("/cfg.json:{CONTAINER_AGENT_CONFIG_JSON_PATH}")));
    }

    #[test]
    fn run_args_omit_api_key_flag_when_absent() {
        let args = build_run_args(
            "proj-a",
            Path::new("/work"),
            Path::new("/cfg"),
            Path::new("/cfg.json"),
            8765,
            8081,
            None,
        );
        assert!(!args.iter().any(|a| a.starts_with("ANTHROPIC_API_KEY=")));
    }

    #[test]
    fn run_args_include_api_key_when_present() {
        let args = build_run_args(
            "proj-a",
            Path::new("/work"),
            Path::new("/cfg"),
            Path::new("/cfg.json"),
            8765,
            8081,
            Some("sk-test"),
        );
        assert!(args.iter().any(|a| a == "ANTHROPIC_API_KEY=sk-test"));
    }
}
