//! The monitor HTTP service: accepts batched hook events per session,
//! collects them with two timeouts, and hands the combined prompt to a
//! monitor agent client.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{HookEvent, MonitorMode, BATCH_WAIT_TIME, MAX_BATCH_SIZE, MAX_BATCH_WAIT, QUEUE_CAPACITY};
use crate::core::session;
use crate::core::store;
use crate::messages;

/// Abstraction over the supervisory LLM call a batch is handed to, so the
/// consumer loop is testable without a live model behind it.
#[async_trait]
pub trait MonitorAgentClient: Send + Sync {
    async fn send_batch(&self, session_id: &str, prompt: &str) -> anyhow::Result<String>;
}

/// Default client: logs the prompt and returns no reply. A real deployment
/// swaps this for a client backed by the agent CLI's own API.
pub struct LoggingMonitorAgent;

#[async_trait]
impl MonitorAgentClient for LoggingMonitorAgent {
    async fn send_batch(&self, session_id: &str, prompt: &str) -> anyhow::Result<String> {
        tracing::info!(session_id, prompt_len = prompt.len(), "monitor batch (no agent client configured)");
        Ok(String::new())
    }
}

struct SessionQueue {
    sender: mpsc::Sender<HookEvent>,
    source_path: std::sync::Mutex<String>,
}

/// Shared monitor state: one bounded queue and consumer task per
/// (session_id), created lazily on first event.
pub struct MonitorState {
    queues: DashMap<String, SessionQueue>,
    mode: MonitorMode,
    sessions_path: PathBuf,
    messages_path: PathBuf,
    agent_client: Arc<dyn MonitorAgentClient>,
}

impl MonitorState {
    #[must_use]
    pub fn new(
        mode: MonitorMode,
        sessions_path: PathBuf,
        messages_path: PathBuf,
        agent_client: Arc<dyn MonitorAgentClient>,
    ) -> Arc<Self> {
        Arc::new(Self { queues: DashMap::new(), mode, sessions_path, messages_path, agent_client })
    }
}

fn format_batch(events: &[HookEvent]) -> String {
    events
        .iter()
        .map(|e| format!("[{}] {}\n{}", e.received_at.to_rfc3339(), e.event_type, e.payload))
        .collect::<Vec<_>>()
        .join("\n---\n")
}

async fn deliver_reply(state: &MonitorState, session_id: &str, source_path: &str, reply: &str) {
    if reply.is_empty() {
        return;
    }

    match state.mode {
        MonitorMode::Independent => {
            let path = PathBuf::from(source_path).join(".orchestra-monitor.txt");
            if let Err(e) = tokio::fs::write(&path, reply).await {
                tracing::warn!(session_id, error = %e, "failed to write monitor feedback file");
            }
        }
        MonitorMode::Session => {
            let roots = store::load_sessions(&state.sessions_path, source_path).await;
            let Some(node) = session::find_session_by_id(&roots, session_id) else {
                tracing::debug!(session_id, "session mode monitor found no matching session");
                return;
            };
            let Some(parent_name) = &node.parent_session_name else {
                return;
            };
            if let Err(e) =
                messages::append_message(&state.messages_path, session_id, parent_name, reply, source_path).await
            {
                tracing::warn!(session_id, error = %e, "failed to queue monitor feedback message");
            }
        }
    }
}

async fn run_consumer(state: Arc<MonitorState>, session_id: String, mut receiver: mpsc::Receiver<HookEvent>) {
    loop {
        let Some(first) = receiver.recv().await else {
            break;
        };

        let mut batch: VecDeque<HookEvent> = VecDeque::from([first]);
        let batch_start = Instant::now();

        while batch.len() < MAX_BATCH_SIZE && batch_start.elapsed() < MAX_BATCH_WAIT {
            match tokio::time::timeout(BATCH_WAIT_TIME, receiver.recv()).await {
                Ok(Some(event)) => batch.push_back(event),
                Ok(None) => break,
                Err(_elapsed) => break,
            }
        }

        let events: Vec<HookEvent> = batch.into_iter().collect();
        let prompt = format_batch(&events);

        let source_path = state
            .queues
            .get(&session_id)
            .map(|q| q.source_path.lock().expect("lock poisoned").clone())
            .unwrap_or_default();

        match state.agent_client.send_batch(&session_id, &prompt).await {
            Ok(reply) => deliver_reply(&state, &session_id, &source_path, &reply).await,
            Err(e) => tracing::warn!(session_id, error = %e, "monitor agent call failed"),
        }
    }
}

async fn receive_hook(
    AxumPath(session_id): AxumPath<String>,
    State(state): State<Arc<MonitorState>>,
    Json(body): Json<Value>,
) -> Response {
    let Some(source_path) = body.get("source_path").and_then(Value::as_str) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "missing source_path" }))).into_response();
    };

    if !state.queues.contains_key(&session_id) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        state.queues.insert(
            session_id.clone(),
            SessionQueue { sender: tx, source_path: std::sync::Mutex::new(source_path.to_owned()) },
        );
        tokio::spawn(run_consumer(Arc::clone(&state), session_id.clone(), rx));
    }

    if let Some(entry) = state.queues.get(&session_id) {
        *entry.source_path.lock().expect("lock poisoned") = source_path.to_owned();
    }

    let event = HookEvent {
        event_type: body.get("event").and_then(Value::as_str).unwrap_or("unknown").to_owned(),
        received_at: chrono::Utc::now(),
        payload: body,
    };

    let sender = state.queues.get(&session_id).map(|q| q.sender.clone());
    let Some(sender) = sender else {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "queue unavailable" }))).into_response();
    };

    match sender.try_send(event) {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "session_id": session_id, "mode": state.mode.label() })),
        )
            .into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "queue full" }))).into_response(),
    }
}

/// Build the monitor's axum router.
#[must_use]
pub fn router(state: Arc<MonitorState>) -> Router {
    Router::new().route("/hook/{session_id}", post(receive_hook)).with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state(dir: &std::path::Path) -> Arc<MonitorState> {
        MonitorState::new(
            MonitorMode::Independent,
            dir.join("sessions.json"),
            dir.join("messages.jsonl"),
            Arc::new(LoggingMonitorAgent),
        )
    }

    #[tokio::test]
    async fn missing_source_path_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state(dir.path()));
        let req = Request::builder()
            .method("POST")
            .uri("/hook/proj-a")
            .header("content-type", "application/json")
            .body(Body::from(json!({}).to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn accepted_event_returns_ok_with_session_id_and_mode() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state(dir.path()));
        let req = Request::builder()
            .method("POST")
            .uri("/hook/proj-a")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "source_path": "/p", "event": "Stop" }).to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn format_batch_joins_events_with_horizontal_rule() {
        let events = vec![
            HookEvent { event_type: "A".to_owned(), received_at: chrono::Utc::now(), payload: json!({}) },
            HookEvent { event_type: "B".to_owned(), received_at: chrono::Utc::now(), payload: json!({}) },
        ];
        let text = format_batch(&events);
        assert!(text.contains("---"));
        assert!(text.find('A').unwrap() < text.find("---").unwrap());
        assert!(text.find("---").unwrap() < text.find('B').unwrap());
    }
}
