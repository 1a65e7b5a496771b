//! The MCP tool service: `spawn_subagent` and `send_message_to_session`,
//! exposed over SSE and bound to `0.0.0.0:{Mmcp}` (forwarded to loopback on
//! the host when run inside a container).

use std::net::SocketAddr;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ServerCapabilities, ServerInfo};
use rmcp::transport::sse_server::SseServer;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::agent::AgentRegistry;
use crate::core::session::{self, RuntimeContext};
use crate::core::{errors::SessionError, store};
use crate::messages;
use crate::workspace::GitBackend;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SpawnSubagentArgs {
    pub parent_session_name: String,
    pub child_session_name: String,
    pub instructions: String,
    pub source_path: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SendMessageArgs {
    pub session_name: String,
    pub message: String,
    pub source_path: String,
    pub sender_name: String,
}

/// The MCP server. `sessions_path` is injected rather than read from
/// `config::sessions_path()` directly so tests can sandbox it.
#[derive(Clone)]
pub struct OrchestraMcpServer {
    sessions_path: std::path::PathBuf,
    messages_path: std::path::PathBuf,
    registry: std::sync::Arc<AgentRegistry>,
    ports: crate::config::Ports,
    tool_router: ToolRouter<Self>,
}

impl OrchestraMcpServer {
    #[must_use]
    pub fn new(
        sessions_path: std::path::PathBuf,
        messages_path: std::path::PathBuf,
        registry: AgentRegistry,
        ports: crate::config::Ports,
    ) -> Self {
        Self {
            sessions_path,
            messages_path,
            registry: std::sync::Arc::new(registry),
            ports,
            tool_router: Self::tool_router(),
        }
    }

    async fn do_spawn_subagent(&self, args: SpawnSubagentArgs) -> String {
        let mut roots = store::load_sessions(&self.sessions_path, &args.source_path).await;

        let Some(parent) = session::find_session_mut(&mut roots, &args.parent_session_name) else {
            return format!(
                "Error: Parent session '{}' not found in project '{}'",
                args.parent_session_name, args.source_path
            );
        };

        let Some(descriptor) = self.registry.resolve("executor") else {
            return "Error: executor agent descriptor could not be resolved".to_owned();
        };

        let git = GitBackend::new();
        let runtime = RuntimeContext::from_env();
        let result = parent
            .spawn_child(
                &args.child_session_name,
                &args.instructions,
                descriptor,
                &git,
                &self.ports,
                &runtime,
            )
            .await;

        match result {
            Ok(_) => {
                if let Err(e) = store::save_session(&self.sessions_path, &args.source_path, roots).await {
                    return format!("Error: failed to persist session tree: {e}");
                }
                format!(
                    "Successfully spawned child session '{}' under parent '{}'",
                    args.child_session_name, args.parent_session_name
                )
            }
            Err(e) => format!("Error: {e}"),
        }
    }

    async fn do_send_message_to_session(&self, args: SendMessageArgs) -> String {
        let roots = store::load_sessions(&self.sessions_path, &args.source_path).await;

        let Some(target) = session::find_session(&roots, &args.session_name) else {
            return format!(
                "Error: {}",
                SessionError::NotFound {
                    project: args.source_path,
                    name: args.session_name,
                }
            );
        };

        if target.agent_type == "designer" {
            return match messages::append_message(
                &self.messages_path,
                &args.sender_name,
                &args.session_name,
                &args.message,
                &args.source_path,
            )
            .await
            {
                Ok(id) => format!(
                    "Message queued for designer session '{}' (ID: {id})",
                    args.session_name
                ),
                Err(e) => format!("Error: {e}"),
            };
        }

        let payload = format!("[From: {}] {}", args.sender_name, args.message);
        if target.send_message(&payload).await {
            format!("Successfully sent message to session '{}'", args.session_name)
        } else {
            format!("Error: failed to deliver message to session '{}'", args.session_name)
        }
    }
}

#[tool_router]
impl OrchestraMcpServer {
    #[tool(description = "Spawn a new executor subagent under a parent session")]
    async fn spawn_subagent(&self, params: Parameters<SpawnSubagentArgs>) -> Result<String, String> {
        Ok(self.do_spawn_subagent(params.0).await)
    }

    #[tool(description = "Send a message to another session by name")]
    async fn send_message_to_session(&self, params: Parameters<SendMessageArgs>) -> Result<String, String> {
        Ok(self.do_send_message_to_session(params.0).await)
    }
}

#[tool_handler]
impl ServerHandler for OrchestraMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Exposes spawn_subagent and send_message_to_session for orchestrating agent sessions."
                    .to_owned(),
            ),
            ..Default::default()
        }
    }
}

/// Serve the MCP tool service over SSE, bound to `0.0.0.0:{port}`. Returns
/// once bound; the returned cancellation token lets the supervisor stop it.
pub async fn serve(server: OrchestraMcpServer, port: u16) -> anyhow::Result<tokio_util::sync::CancellationToken> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let sse_server = SseServer::serve(addr).await?;
    let ct = sse_server.with_service(move || server.clone());
    tracing::info!(port, "MCP tool service listening");
    Ok(ct)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::Session;
    use std::path::PathBuf;

    fn server(home: &std::path::Path) -> OrchestraMcpServer {
        OrchestraMcpServer::new(
            home.join("sessions.json"),
            home.join("messages.jsonl"),
            AgentRegistry::builtin(),
            crate::config::Ports { mcp: 8765, monitor: 8081 },
        )
    }

    #[tokio::test]
    async fn spawn_under_missing_parent_returns_error_string() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let result = server
            .do_spawn_subagent(SpawnSubagentArgs {
                parent_session_name: "designer".to_owned(),
                child_session_name: "child".to_owned(),
                instructions: "do work".to_owned(),
                source_path: "/p".to_owned(),
            })
            .await;

        assert!(result.starts_with("Error: Parent session 'designer' not found"));
    }

    #[tokio::test]
    async fn send_message_to_missing_target_returns_error_string() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let result = server
            .do_send_message_to_session(SendMessageArgs {
                session_name: "designer".to_owned(),
                message: "hi".to_owned(),
                source_path: "/p".to_owned(),
                sender_name: "child".to_owned(),
            })
            .await;

        assert!(result.starts_with("Error: Session 'designer' not found"));
    }

    #[tokio::test]
    async fn send_message_to_designer_queues_and_reports_id() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let registry = AgentRegistry::builtin();
        let designer = registry.resolve("designer").unwrap();
        let root = Session::new_root(PathBuf::from("/p"), "designer".to_owned(), designer);
        store::save_session(&server.sessions_path, "/p", vec![root]).await.unwrap();

        let result = server
            .do_send_message_to_session(SendMessageArgs {
                session_name: "designer".to_owned(),
                message: "review PR".to_owned(),
                source_path: "/p".to_owned(),
                sender_name: "child".to_owned(),
            })
            .await;

        assert!(result.starts_with("Message queued for designer session 'designer'"));

        let pending = messages::read_pending_messages(&server.messages_path, "designer").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sender, "child");
        assert_eq!(pending[0].message, "review PR");
    }
}
