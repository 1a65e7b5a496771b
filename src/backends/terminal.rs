//! Terminal multiplexer backend: tmux commands run against a single
//! dedicated socket, never the user's own tmux socket, so shutdown can kill
//! only the orchestra-owned server.
//!
//! Every command family is a pure function producing an argument vector
//! (exposed for testing); [`TerminalExecutor`] is the only piece that
//! actually shells out.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::traits::{AgentProtocol, AgentStatus};

/// Dedicated multiplexer socket name. Never the user's default socket.
pub const SOCKET: &str = "orchestra";

/// Forced color-capable terminal type for spawned panes.
const TERM: &str = "screen-256color";

fn base_args() -> Vec<String> {
    vec!["-L".to_owned(), SOCKET.to_owned()]
}

/// `tmux -L orchestra new-session -d -s {name} -c {workdir} {command...}`
#[must_use]
pub fn build_new_session_args(name: &str, workdir: &Path, command: &[String]) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        "new-session".to_owned(),
        "-d".to_owned(),
        "-s".to_owned(),
        name.to_owned(),
        "-c".to_owned(),
        workdir.display().to_string(),
    ]);
    args.extend(command.iter().cloned());
    args
}

/// `tmux -L orchestra has-session -t {name}`
#[must_use]
pub fn build_has_session_args(name: &str) -> Vec<String> {
    let mut args = base_args();
    args.extend(["has-session".to_owned(), "-t".to_owned(), name.to_owned()]);
    args
}

/// `tmux -L orchestra display-message -p -t {name} '#{session_windows} #{session_attached}'`
#[must_use]
pub fn build_display_message_args(name: &str) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        "display-message".to_owned(),
        "-p".to_owned(),
        "-t".to_owned(),
        name.to_owned(),
        "#{session_windows} #{session_attached}".to_owned(),
    ]);
    args
}

/// `tmux -L orchestra set-buffer -- {text}`
#[must_use]
pub fn build_set_buffer_args(text: &str) -> Vec<String> {
    let mut args = base_args();
    args.extend(["set-buffer".to_owned(), "--".to_owned(), text.to_owned()]);
    args
}

/// `tmux -L orchestra paste-buffer -t {pane}`
#[must_use]
pub fn build_paste_buffer_args(pane: &str) -> Vec<String> {
    let mut args = base_args();
    args.extend(["paste-buffer".to_owned(), "-t".to_owned(), pane.to_owned()]);
    args
}

/// `tmux -L orchestra send-keys -t {pane} C-m`
#[must_use]
pub fn build_send_enter_args(pane: &str) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        "send-keys".to_owned(),
        "-t".to_owned(),
        pane.to_owned(),
        "C-m".to_owned(),
    ]);
    args
}

/// `tmux -L orchestra send-keys -t {pane} -l -- {text}`
#[must_use]
pub fn build_send_literal_keys_args(pane: &str, text: &str) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        "send-keys".to_owned(),
        "-t".to_owned(),
        pane.to_owned(),
        "-l".to_owned(),
        "--".to_owned(),
        text.to_owned(),
    ]);
    args
}

/// `tmux -L orchestra respawn-pane -k -t {pane} {command...}`
#[must_use]
pub fn build_respawn_pane_args(pane: &str, command: &[String]) -> Vec<String> {
    let mut args = base_args();
    args.extend(["respawn-pane".to_owned(), "-k".to_owned(), "-t".to_owned(), pane.to_owned()]);
    args.extend(command.iter().cloned());
    args
}

/// `tmux -L orchestra kill-session -t {name}`
#[must_use]
pub fn build_kill_session_args(name: &str) -> Vec<String> {
    let mut args = base_args();
    args.extend(["kill-session".to_owned(), "-t".to_owned(), name.to_owned()]);
    args
}

/// `tmux -L orchestra kill-server`
#[must_use]
pub fn build_kill_server_args() -> Vec<String> {
    let mut args = base_args();
    args.push("kill-server".to_owned());
    args
}

/// Escape-key press for dismissing a permission prompt the agent CLI is
/// stuck on.
#[must_use]
pub fn build_send_escape_args(pane: &str) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        "send-keys".to_owned(),
        "-t".to_owned(),
        pane.to_owned(),
        "Escape".to_owned(),
    ]);
    args
}

/// `tmux -L orchestra capture-pane -p -t {pane}`, last `lines` lines.
#[must_use]
pub fn build_capture_pane_args(pane: &str, lines: u32) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        "capture-pane".to_owned(),
        "-p".to_owned(),
        "-S".to_owned(),
        format!("-{lines}"),
        "-t".to_owned(),
        pane.to_owned(),
    ]);
    args
}

/// Pane identifier targeting window 0, pane 0, of a named session.
#[must_use]
pub fn pane0(session_id: &str) -> String {
    format!("{session_id}:0.0")
}

const STUCK_PROMPT_PATTERNS: &[&str] = &[
    "Do you want to proceed?",
    "Do you want to make this edit",
    "(y/n)",
    "Press Enter to continue",
];

/// Heuristically detect whether pane output shows a stuck permission
/// prompt.
#[must_use]
pub fn looks_stuck(pane_output: &str) -> bool {
    let tail: String = pane_output.lines().rev().take(20).collect::<Vec<_>>().join("\n");
    STUCK_PROMPT_PATTERNS.iter().any(|p| tail.contains(p))
}

/// tmux-backed, single-process, single-socket terminal backend.
pub struct TerminalBackend;

impl TerminalBackend {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    async fn run(&self, args: &[String]) -> anyhow::Result<std::process::Output> {
        Ok(Command::new("tmux").args(args).env("TERM", TERM).output().await?)
    }

    /// Kill the dedicated multiplexer server. Only the supervisor should
    /// call this.
    pub async fn kill_server(&self) {
        if let Err(e) = self.run(&build_kill_server_args()).await {
            tracing::warn!(error = %e, "failed to kill orchestra tmux server");
        }
    }

    /// Capture recent pane output and heuristically send Escape if it looks
    /// like a stuck permission prompt. Best-effort.
    pub async fn dismiss_stuck_prompt(&self, session_id: &str) {
        let pane = pane0(session_id);
        let Ok(out) = self.run(&build_capture_pane_args(&pane, 40)).await else {
            return;
        };
        if !out.status.success() {
            return;
        }
        let text = String::from_utf8_lossy(&out.stdout);
        if looks_stuck(&text) {
            let _ = self.run(&build_send_escape_args(&pane)).await;
        }
    }
}

impl Default for TerminalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentProtocol for TerminalBackend {
    async fn start(&self, session_id: &str, work_path: &Path) -> bool {
        if let Ok(out) = self.run(&build_has_session_args(session_id)).await {
            if out.status.success() {
                return true;
            }
        }

        let command = vec!["claude".to_owned()];
        let Ok(out) = self.run(&build_new_session_args(session_id, work_path, &command)).await else {
            return false;
        };
        if !out.status.success() {
            tracing::error!(
                session_id,
                stderr = %String::from_utf8_lossy(&out.stderr),
                "failed to create terminal session"
            );
            return false;
        }

        tokio::time::sleep(Duration::from_millis(400)).await;
        let _ = self.run(&build_send_enter_args(&pane0(session_id))).await;
        true
    }

    async fn status(&self, session_id: &str) -> AgentStatus {
        let Ok(has) = self.run(&build_has_session_args(session_id)).await else {
            return AgentStatus::default();
        };
        if !has.status.success() {
            return AgentStatus::default();
        }

        let Ok(meta) = self.run(&build_display_message_args(session_id)).await else {
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
        let Ok(set) = self.run(&build_set_buffer_args(text)).await else {
            return false;
        };
        if !set.status.success() {
            return false;
        }
        let Ok(paste) = self.run(&build_paste_buffer_args(&pane)).await else {
            return false;
        };
        if !paste.status.success() {
            return false;
        }
        let Ok(enter) = self.run(&build_send_enter_args(&pane)).await else {
            return false;
        };
        enter.status.success()
    }

    fn attach_command(&self, session_id: &str) -> Vec<String> {
        let mut args = vec!["tmux".to_owned()];
        args.extend(base_args());
        args.extend(["attach-session".to_owned(), "-t".to_owned(), session_id.to_owned()]);
        args
    }

    async fn delete(&self, session_id: &str) -> bool {
        match self.run(&build_kill_session_args(session_id)).await {
            Ok(out) => out.status.success(),
            Err(e) => {
                tracing::warn!(session_id, error = %e, "failed to kill terminal session");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn new_session_args_include_socket_workdir_and_command() {
        let args = build_new_session_args("proj-a", &PathBuf::from("/work"), &["claude".to_owned()]);
        assert_eq!(
            args,
            vec!["-L", "orchestra", "new-session", "-d", "-s", "proj-a", "-c", "/work", "claude"]
        );
    }

    #[test]
    fn send_literal_then_enter_are_separate_commands() {
        let literal = build_send_literal_keys_args("s:0.0", "hello\nworld");
        let enter = build_send_enter_args("s:0.0");
        assert!(literal.contains(&"-l".to_owned()));
        assert!(literal.last().unwrap() == "hello\nworld");
        assert!(!enter.contains(&"-l".to_owned()));
        assert_eq!(enter.last().unwrap(), "C-m");
    }

    #[test]
    fn pane0_targets_first_window_and_pane() {
        assert_eq!(pane0("proj-a"), "proj-a:0.0");
    }

    #[test]
    fn kill_server_targets_dedicated_socket_only() {
        let args = build_kill_server_args();
        assert_eq!(args, vec!["-L", "orchestra", "kill-server"]);
    }

    #[test]
    fn looks_stuck_matches_known_prompt_patterns() {
        assert!(looks_stuck("some output\nDo you want to proceed? (y/n)\n"));
        assert!(!looks_stuck("just normal output\n"));
    }

    #[test]
    fn set_buffer_then_paste_then_enter_is_the_message_delivery_sequence() {
        let set = build_set_buffer_args("payload");
        let paste = build_paste_buffer_args("s:0.0");
        let enter = build_send_enter_args("s:0.0");
        assert!(set.contains(&"set-buffer".to_owned()));
        assert!(paste.contains(&"paste-buffer".to_owned()));
        assert_eq!(enter.last().unwrap(), "C-m");
    }
}
