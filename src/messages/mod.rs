//! The designer inbox: an append-only JSONL file at
//! `{orchestra_home}/messages.jsonl`. Writers take an exclusive advisory
//! lock around a single `write+flush`; readers take a shared lock across
//! the full scan. Malformed lines are skipped rather than aborting the
//! read.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::errors::QueueError;

/// One record in the inbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub target: String,
    pub message: String,
    pub source_path: String,
}

impl Message {
    #[must_use]
    pub fn new(sender: &str, target: &str, message: &str, source_path: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sender: sender.to_owned(),
            target: target.to_owned(),
            message: message.to_owned(),
            source_path: source_path.to_owned(),
        }
    }
}

fn append_blocking(path: &Path, record: &Message) -> Result<(), QueueError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| QueueError::Io { source })?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| QueueError::Io { source })?;

    file.lock_exclusive().map_err(|source| QueueError::LockFailed { source })?;
    let result = (|| -> std::io::Result<()> {
        let mut line = serde_json::to_string(record).expect("Message always serializes");
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.flush()
    })();
    let _ = file.unlock();
    result.map_err(|source| QueueError::Io { source })
}

fn read_all_blocking(path: &Path) -> Result<Vec<Message>, QueueError> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(QueueError::Io { source }),
    };

    file.lock_shared().map_err(|source| QueueError::LockFailed { source })?;
    let reader = BufReader::new(&file);
    let mut messages = Vec::new();
    for line in reader.lines() {
        let Ok(line) = line else { continue };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Message>(&line) {
            Ok(message) => messages.push(message),
            Err(e) => tracing::debug!(error = %e, "skipping malformed message line"),
        }
    }
    let _ = file.unlock();
    Ok(messages)
}

/// Append a message to the inbox and return its assigned id.
pub async fn append_message(
    path: &Path,
    sender: &str,
    target: &str,
    message: &str,
    source_path: &str,
) -> anyhow::Result<Uuid> {
    let record = Message::new(sender, target, message, source_path);
    let id = record.id;
    let path = path.to_owned();
    tokio::task::spawn_blocking(move || append_blocking(&path, &record)).await??;
    Ok(id)
}

/// Read all messages addressed to `target`, in insertion order, skipping
/// malformed lines.
pub async fn read_pending_messages(path: &Path, target: &str) -> anyhow::Result<Vec<Message>> {
    let path = path.to_owned();
    let target = target.to_owned();
    let all = tokio::task::spawn_blocking(move || read_all_blocking(&path)).await??;
    Ok(all.into_iter().filter(|m| m.target == target).collect())
}

/// Default inbox location (`{orchestra_home}/messages.jsonl`).
#[must_use]
pub fn default_path() -> PathBuf {
    crate::config::messages_path()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_then_read_round_trips_for_matching_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.jsonl");

        append_message(&path, "child", "designer", "first", "/p").await.unwrap();
        append_message(&path, "child", "other", "not-mine", "/p").await.unwrap();
        append_message(&path, "child", "designer", "second", "/p").await.unwrap();

        let pending = read_pending_messages(&path, "designer").await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].message, "first");
        assert_eq!(pending[1].message, "second");
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.jsonl");
        tokio::fs::write(&path, b"not json\n").await.unwrap();
        append_message(&path, "child", "designer", "ok", "/p").await.unwrap();

        let pending = read_pending_messages(&path, "designer").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].message, "ok");
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.jsonl");
        let pending = read_pending_messages(&path, "designer").await.unwrap();
        assert!(pending.is_empty());
    }
}
