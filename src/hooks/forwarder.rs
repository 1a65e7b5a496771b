//! The `orchestra-hook` forwarder: reads a JSON payload from stdin, derives
//! a session id, and POSTs it to the monitor. Never fails the calling agent
//! process: network failure is logged, not propagated, and the binary
//! always exits 0.

use std::io::Read;

use serde_json::{json, Value};

use crate::config;

/// Read the hook payload off stdin. An empty or unparseable stdin yields an
/// empty object rather than failing the caller.
fn read_stdin_payload() -> Value {
    let mut buf = String::new();
    if std::io::stdin().read_to_string(&mut buf).is_err() {
        return json!({});
    }
    serde_json::from_str(&buf).unwrap_or_else(|_| json!({}))
}

async fn git_branch(cwd: &str) -> Option<String> {
    let output = tokio::process::Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(cwd)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let branch = String::from_utf8_lossy(&output.stdout).trim().to_owned();
    (!branch.is_empty()).then_some(branch)
}

/// Override order: explicit `session_id` field in the payload > the
/// `ORCHESTRA_SESSION_ID` environment override > the current git branch of
/// the payload's `cwd` > `"unknown"`. `env_override` is threaded in rather
/// than read inline so the override order is testable without mutating
/// process environment.
async fn derive_session_id(payload: &Value, env_override: Option<&str>, cli_session_id: Option<&str>) -> String {
    if let Some(explicit) = payload.get("session_id").and_then(Value::as_str) {
        return explicit.to_owned();
    }
    if let Some(env_override) = env_override {
        if !env_override.is_empty() {
            return env_override.to_owned();
        }
    }
    if let Some(cwd) = payload.get("cwd").and_then(Value::as_str) {
        if let Some(branch) = git_branch(cwd).await {
            return branch;
        }
    }
    cli_session_id.map(ToOwned::to_owned).unwrap_or_else(|| "unknown".to_owned())
}

/// `source_path` comes from the payload's own field if present, else the
/// command's 2nd CLI arg (`{source_path}` in the hook command template).
fn derive_source_path(payload: &Value, cli_source_path: Option<&str>) -> Option<String> {
    if let Some(explicit) = payload.get("source_path").and_then(Value::as_str) {
        return Some(explicit.to_owned());
    }
    cli_source_path.map(ToOwned::to_owned)
}

/// Independent-mode monitor feedback: if `{source_path}/.orchestra-monitor.txt`
/// exists, print it (surfaced to the agent as hook stdout) and delete it so
/// it is shown exactly once.
async fn surface_and_clear_monitor_feedback(source_path: &str) {
    let path = std::path::Path::new(source_path).join(".orchestra-monitor.txt");
    let Ok(contents) = tokio::fs::read_to_string(&path).await else {
        return;
    };
    if !contents.trim().is_empty() {
        println!("[orchestra monitor]\n{}", contents.trim());
    }
    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::warn!(error = %e, path = %path.display(), "failed to remove monitor feedback file");
    }
}

/// Entry point for the `orchestra-hook` binary. `cli_args` are the
/// already-templated `{session_id}` and `{source_path}` arguments supplied
/// by the agent CLI's hook command. Always returns; never panics across
/// this boundary.
pub async fn run(cli_args: &[String]) {
    if std::env::var(super::SKIP_FORWARD_ENV).is_ok() {
        tracing::debug!("skipping hook forward: {} is set", super::SKIP_FORWARD_ENV);
        return;
    }

    let payload = read_stdin_payload();
    let cli_session_id = cli_args.first().map(String::as_str);
    let cli_source_path = cli_args.get(1).map(String::as_str);
    let env_override = std::env::var("ORCHESTRA_SESSION_ID").ok();
    let session_id = derive_session_id(&payload, env_override.as_deref(), cli_session_id).await;
    let source_path = derive_source_path(&payload, cli_source_path);

    if let Some(source_path) = &source_path {
        surface_and_clear_monitor_feedback(source_path).await;
    }

    let event_type = payload
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_owned();

    let body = json!({
        "source_path": source_path,
        "event": event_type,
        "received_at": chrono::Utc::now(),
        "payload": payload,
    });

    let base = config::monitor_base_url();
    let url = format!("{base}/hook/{}", urlencode(&session_id));

    let client = match reqwest::Client::builder().timeout(super::FORWARD_TIMEOUT).build() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "failed to build hook forwarder client");
            return;
        }
    };

    match client.post(&url).json(&body).send().await {
        Ok(resp) if resp.status().is_success() => {
            tracing::debug!(session_id, "forwarded hook event");
        }
        Ok(resp) => {
            tracing::warn!(session_id, status = %resp.status(), "monitor rejected hook event");
        }
        Err(e) => {
            tracing::warn!(session_id, error = %e, "failed to forward hook event");
        }
    }
}

fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // NOTE: the SKIP_FORWARD_ENV early-return in run() is exercised by
    // inspection rather than a test, since asserting it would require
    // unsafe std::env::set_var, forbidden crate-wide.

    #[tokio::test]
    async fn explicit_session_id_field_wins_over_env_and_cli_arg() {
        let payload = json!({ "session_id": "explicit" });
        assert_eq!(derive_session_id(&payload, Some("env-override"), Some("cli-arg")).await, "explicit");
    }

    #[tokio::test]
    async fn env_override_wins_over_cli_arg() {
        let payload = json!({});
        assert_eq!(derive_session_id(&payload, Some("env-override"), Some("cli-arg")).await, "env-override");
    }

    #[tokio::test]
    async fn falls_back_to_cli_arg_when_no_cwd_or_env() {
        let payload = json!({});
        assert_eq!(derive_session_id(&payload, None, Some("cli-arg")).await, "cli-arg");
    }

    #[tokio::test]
    async fn falls_back_to_unknown_with_nothing_available() {
        let payload = json!({});
        assert_eq!(derive_session_id(&payload, None, None).await, "unknown");
    }

    #[test]
    fn urlencode_escapes_reserved_characters() {
        assert_eq!(urlencode("my session"), "my%20session");
        assert_eq!(urlencode("abc-123_.~"), "abc-123_.~");
    }

    #[test]
    fn derive_source_path_prefers_payload_field_over_cli_arg() {
        let payload = json!({ "source_path": "/from/payload" });
        assert_eq!(derive_source_path(&payload, Some("/from/cli")), Some("/from/payload".to_owned()));
    }

    #[test]
    fn derive_source_path_falls_back_to_cli_arg() {
        let payload = json!({});
        assert_eq!(derive_source_path(&payload, Some("/from/cli")), Some("/from/cli".to_owned()));
    }

    #[test]
    fn derive_source_path_is_none_with_nothing_available() {
        let payload = json!({});
        assert_eq!(derive_source_path(&payload, None), None);
    }

    #[tokio::test]
    async fn surface_and_clear_monitor_feedback_deletes_after_reading() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join(".orchestra-monitor.txt");
        tokio::fs::write(&marker, "please rebase on main").await.unwrap();

        surface_and_clear_monitor_feedback(dir.path().to_str().unwrap()).await;

        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn surface_and_clear_monitor_feedback_is_a_no_op_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        surface_and_clear_monitor_feedback(dir.path().to_str().unwrap()).await;
    }
}
