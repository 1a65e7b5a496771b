//! Boots the MCP and monitor services, waits for a shutdown signal, then
//! reverses outstanding pairing artifacts and tears everything down.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::backends::terminal::TerminalBackend;
use crate::config;
use crate::core::agent::AgentRegistry;
use crate::core::session::Session;
use crate::core::store;
use crate::hooks::monitor::{LoggingMonitorAgent, MonitorState};
use crate::hooks::MonitorMode;
use crate::mcp::OrchestraMcpServer;

const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Best-effort: walk every session in the store and disable any that is
/// currently paired, restoring the symlink swap. Crash recovery calls this
/// too, since a prior process may have died mid-pairing.
pub async fn reverse_pairing_artifacts(sessions_path: &PathBuf) {
    let doc = store::load_document(sessions_path).await;
    for (project, roots) in doc {
        for root in &roots {
            reverse_in(root).await;
        }
        let _ = project;
    }
}

fn reverse_in(node: &Session) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + '_>> {
    Box::pin(async move {
        if node.paired {
            if let Err(e) =
                crate::workspace::pairing::disable(&node.source_path, &node.work_path, &node.session_id).await
            {
                tracing::warn!(session = node.session_name, error = %e, "failed to reverse pairing on shutdown");
            }
        }
        for child in &node.children {
            reverse_in(child).await;
        }
    })
}

/// Run the supervisor: boot MCP then monitor, then block until ctrl-c,
/// then tear down in reverse order. Returns an error only for pre-flight
/// failures (e.g. the multiplexer is not installed).
pub async fn run() -> anyhow::Result<()> {
    preflight_check().await?;
    config::ensure_static_assets().await?;

    let ports = config::Ports::from_env();
    let registry = AgentRegistry::load(&config::agents_yaml_path()).unwrap_or_default();

    let mcp_server = OrchestraMcpServer::new(config::sessions_path(), config::messages_path(), registry, ports);
    let mcp_ct = crate::mcp::serve(mcp_server, ports.mcp).await?;
    tracing::info!(port = ports.mcp, "MCP service started");

    let monitor_state = MonitorState::new(
        MonitorMode::Session,
        config::sessions_path(),
        config::messages_path(),
        Arc::new(LoggingMonitorAgent),
    );
    let monitor_router = crate::hooks::monitor::router(monitor_state);
    let monitor_addr = format!("0.0.0.0:{}", ports.monitor);
    let listener = tokio::net::TcpListener::bind(&monitor_addr).await?;
    tracing::info!(addr = %monitor_addr, "Monitor service started");
    let monitor_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, monitor_router).await {
            tracing::error!(error = %e, "monitor service exited with error");
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    reverse_pairing_artifacts(&config::sessions_path()).await;

    mcp_ct.cancel();
    monitor_handle.abort();
    let _ = tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, monitor_handle).await;

    TerminalBackend::new().kill_server().await;

    Ok(())
}

async fn preflight_check() -> anyhow::Result<()> {
    let has_tmux = tokio::process::Command::new("tmux")
        .arg("-V")
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !has_tmux {
        return Err(crate::core::errors::BackendError::ToolMissing { tool: "tmux" }.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent::AgentRegistry;
    use std::path::PathBuf;

    #[tokio::test]
    async fn reverse_pairing_artifacts_is_a_no_op_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        reverse_pairing_artifacts(&path).await;
    }

    #[tokio::test]
    async fn reverse_pairing_artifacts_skips_unpaired_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let registry = AgentRegistry::builtin();
        let designer = registry.resolve("designer").unwrap();
        let root = Session::new_root(PathBuf::from("/p"), "designer".to_owned(), designer);
        store::save_session(&path, "/p", vec![root]).await.unwrap();

        reverse_pairing_artifacts(&path).await;
    }
}
