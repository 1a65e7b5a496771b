//! Hook forwarding and the monitor HTTP service.
//!
//! The agent CLI invokes `orchestra-hook` on a configured set of lifecycle
//! events; the forwarder POSTs each one to the monitor, which batches and
//! replies via the monitor agent.

pub mod forwarder;
pub mod monitor;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One in-memory hook event, queued per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEvent {
    pub event_type: String,
    pub received_at: DateTime<Utc>,
    pub payload: Value,
}

/// Bound on the per-session hook queue. Beyond this, `POST /hook/{id}`
/// returns 503 rather than blocking the agent.
pub const QUEUE_CAPACITY: usize = 1000;

/// Stop collecting a batch once it reaches this many events.
pub const MAX_BATCH_SIZE: usize = 10;

/// Stop collecting a batch if the queue goes idle for this long.
pub const BATCH_WAIT_TIME: Duration = Duration::from_secs(10);

/// Stop collecting a batch once it has been open this long, regardless of
/// idle time.
pub const MAX_BATCH_WAIT: Duration = Duration::from_secs(20);

/// Timeout for the forwarder's POST to the monitor.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(2);

/// Env var set inside monitor agent processes to suppress their own hook
/// events from looping back into the monitor that spawned them.
pub const SKIP_FORWARD_ENV: &str = "CLAUDE_MONITOR_SKIP_FORWARD";

/// Which kind of monitor instantiates for a given (session_id, source_path)
/// pair on first event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    /// Loads the Session from the store; may call `send_message_to_session`.
    Session,
    /// Writes guidance to `{source_path}/.orchestra-monitor.txt`.
    Independent,
}

impl MonitorMode {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Independent => "independent",
        }
    }
}
