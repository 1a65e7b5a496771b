//! The agent tree: one [`Session`] per designer/executor/custom-agent node,
//! its lifecycle operations, and depth-first lookup helpers over a
//! project's forest of root sessions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::backends::{AgentProtocol, ContainerLaunchParams, ContainerizedBackend, LocalBackend};
use crate::config;
use crate::core::agent::{AgentDescriptor, AgentKind};
use crate::core::errors::SessionError;
use crate::core::templates;
use crate::workspace::{pairing, relocate, GitOperations};

/// Observable lifecycle state, per the state machine in the component
/// design: nascent -> prepared -> running -> stopped -> removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Nascent,
    Prepared,
    Running,
    Stopped,
    Removed,
}

/// A node in the agent tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_name: String,
    pub session_id: String,
    pub agent_type: String,
    pub source_path: PathBuf,
    pub work_path: PathBuf,
    pub parent_session_name: Option<String>,
    pub paired: bool,
    pub use_docker: bool,
    pub state: SessionState,
    pub children: Vec<Session>,
}

/// Runtime parameters a session needs to reach the monitor and container
/// infrastructure; not part of the persisted document.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub mcp_port: u16,
    pub monitor_port: u16,
    pub shared_agent_config_dir: PathBuf,
    pub shared_agent_config_json: PathBuf,
    pub anthropic_api_key: Option<String>,
}

impl RuntimeContext {
    #[must_use]
    pub fn from_env() -> Self {
        let ports = config::Ports::from_env();
        Self {
            mcp_port: ports.mcp,
            monitor_port: ports.monitor,
            shared_agent_config_dir: config::shared_agent_config_dir(),
            shared_agent_config_json: config::shared_agent_config_json(),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
        }
    }
}

impl Session {
    fn work_path_for(descriptor: &AgentDescriptor, source_path: &PathBuf, session_id: &str) -> PathBuf {
        let basename = config::project_basename(source_path);
        match descriptor.kind {
            AgentKind::Designer => source_path.clone(),
            AgentKind::Executor => config::worktree_path(&basename, session_id),
            AgentKind::Custom => config::subagent_path(&basename, session_id),
        }
    }

    /// Construct the root (designer) session for a project.
    #[must_use]
    pub fn new_root(source_path: PathBuf, session_name: String, descriptor: &AgentDescriptor) -> Self {
        let basename = config::project_basename(&source_path);
        let session_id = format!("{basename}-{session_name}");
        let work_path = Self::work_path_for(descriptor, &source_path, &session_id);
        Self {
            session_name,
            session_id,
            agent_type: descriptor.name.clone(),
            source_path,
            work_path,
            parent_session_name: None,
            paired: false,
            use_docker: descriptor.use_docker,
            state: SessionState::Nascent,
            children: Vec::new(),
        }
    }

    /// Construct a child session under `parent`. Callers still need to run
    /// [`Session::prepare`] and [`Session::start`] before it is usable.
    #[must_use]
    pub fn new_child(parent: &Self, session_name: String, descriptor: &AgentDescriptor) -> Self {
        let basename = config::project_basename(&parent.source_path);
        let session_id = format!("{basename}-{session_name}");
        let work_path = Self::work_path_for(descriptor, &parent.source_path, &session_id);
        Self {
            session_name,
            session_id,
            agent_type: descriptor.name.clone(),
            source_path: parent.source_path.clone(),
            work_path,
            parent_session_name: Some(parent.session_name.clone()),
            paired: false,
            use_docker: descriptor.use_docker,
            state: SessionState::Nascent,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_session_name.is_none()
    }

    fn backend(&self) -> Box<dyn AgentProtocol> {
        if self.use_docker {
            Box::new(ContainerizedBackend::new())
        } else {
            Box::new(LocalBackend::new())
        }
    }

    /// Sets `work_path` (already fixed at construction) and performs
    /// agent-type-specific workspace setup: worktree creation for
    /// executors/custom agents, stable `.git` relocation for designers, and
    /// the per-workspace file templates. Idempotent on re-entry.
    pub async fn prepare(
        &mut self,
        descriptor: &AgentDescriptor,
        git: &dyn GitOperations,
        ports: &config::Ports,
    ) -> anyhow::Result<()> {
        match descriptor.kind {
            AgentKind::Designer => {
                relocate::ensure_stable_git(&self.source_path).await?;
            }
            AgentKind::Executor | AgentKind::Custom => {
                let branch_name = self.session_id.clone();
                relocate::ensure_stable_git(&self.source_path).await?;
                git.ensure_worktree(&self.source_path, &self.work_path, &branch_name)
                    .await
                    .map_err(|source| SessionError::WorkspaceFailed {
                        name: self.session_name.clone(),
                        source,
                    })?;
            }
        }

        self.write_workspace_files(descriptor, ports)?;
        self.state = SessionState::Prepared;
        Ok(())
    }

    fn write_workspace_files(&self, descriptor: &AgentDescriptor, ports: &config::Ports) -> anyhow::Result<()> {
        let claude_dir = self.work_path.join(".claude");
        std::fs::create_dir_all(&claude_dir)?;
        std::fs::write(
            claude_dir.join("orchestra.md"),
            templates::orchestra_md(descriptor, &self.session_name, &self.work_path),
        )?;
        std::fs::write(claude_dir.join("CLAUDE.md"), templates::claude_md())?;
        std::fs::write(
            claude_dir.join("settings.json"),
            serde_json::to_string_pretty(&templates::settings_json(
                descriptor,
                self.is_root(),
                &self.session_id,
                &self.source_path,
                ports.mcp,
            ))?,
        )?;

        if matches!(descriptor.kind, AgentKind::Designer) {
            let commands_dir = claude_dir.join("commands");
            std::fs::create_dir_all(&commands_dir)?;
            std::fs::write(commands_dir.join("merge-child.md"), templates::merge_child_md())?;
        }

        let orchestra_dir = self.work_path.join(".orchestra");
        std::fs::create_dir_all(&orchestra_dir)?;
        let project_name = config::project_basename(&self.source_path);
        if !orchestra_dir.join("designer.md").exists() {
            std::fs::write(orchestra_dir.join("designer.md"), templates::designer_md(&project_name))?;
        }

        Ok(())
    }

    /// Ensures prepared, then delegates to the control plane.
    pub async fn start(
        &mut self,
        descriptor: &AgentDescriptor,
        git: &dyn GitOperations,
        ports: &config::Ports,
        runtime: &RuntimeContext,
    ) -> anyhow::Result<bool> {
        if self.state == SessionState::Nascent {
            self.prepare(descriptor, git, ports).await?;
        }

        let ok = if self.use_docker {
            let backend = ContainerizedBackend::new();
            let params = ContainerLaunchParams {
                work_path: self.work_path.clone(),
                shared_agent_config_dir: runtime.shared_agent_config_dir.clone(),
                shared_agent_config_json: runtime.shared_agent_config_json.clone(),
                mcp_port: runtime.mcp_port,
                monitor_port: runtime.monitor_port,
                anthropic_api_key: runtime.anthropic_api_key.clone(),
            };
            backend.start_with(&self.session_id, &params).await
        } else {
            self.backend().start(&self.session_id, &self.work_path).await
        };

        if ok {
            self.state = SessionState::Running;
        }
        Ok(ok)
    }

    /// Constructs a child with the resolved descriptor, prepares and starts
    /// it, writes its instructions file, then appends it to `children`.
    /// Any step failing leaves `children` unchanged.
    pub async fn spawn_child(
        &mut self,
        name: &str,
        instructions: &str,
        descriptor: &AgentDescriptor,
        git: &dyn GitOperations,
        ports: &config::Ports,
        runtime: &RuntimeContext,
    ) -> anyhow::Result<&Session> {
        if self.children.iter().any(|c| c.session_name == name) {
            return Err(SessionError::NameConflict {
                parent: self.session_name.clone(),
                name: name.to_owned(),
            }
            .into());
        }

        let mut child = Self::new_child(self, name.to_owned(), descriptor);
        child.prepare(descriptor, git, ports).await?;
        std::fs::write(child.work_path.join("instructions.md"), templates::instructions_md(instructions))?;
        child.start(descriptor, git, ports, runtime).await?;

        self.children.push(child);
        Ok(self.children.last().expect("just pushed"))
    }

    /// Enable pairing: aliases `source_path` onto this session's worktree.
    /// Local preconditions only; tree-wide exclusivity ("no other session
    /// paired in the project") is checked by the caller against the whole
    /// forest before invoking this.
    pub async fn toggle_pairing(&mut self) -> anyhow::Result<()> {
        if self.is_root() {
            return Err(SessionError::InvalidState {
                name: self.session_name.clone(),
                operation: "toggle_pairing on root session".to_owned(),
            }
            .into());
        }
        if self.work_path == self.source_path {
            return Err(SessionError::InvalidState {
                name: self.session_name.clone(),
                operation: "toggle_pairing with work_path == source_path".to_owned(),
            }
            .into());
        }

        if self.paired {
            pairing::disable(&self.source_path, &self.work_path, &self.session_id).await?;
            self.paired = false;
        } else {
            pairing::enable(&self.source_path, &self.work_path, &self.session_id).await?;
            self.paired = true;
        }
        Ok(())
    }

    /// Control-plane delete, then best-effort worktree/branch removal for
    /// non-designer sessions. Worktree removal is skipped for designers,
    /// whose `work_path` is the user's own project directory.
    pub async fn delete(&mut self, descriptor: &AgentDescriptor, git: &dyn GitOperations) {
        if self.use_docker {
            ContainerizedBackend::new().delete(&self.session_id).await;
        } else {
            self.backend().delete(&self.session_id).await;
        }

        if !matches!(descriptor.kind, AgentKind::Designer) {
            git.remove_worktree(&self.source_path, &self.work_path, &self.session_id).await;
        }

        self.state = SessionState::Removed;
    }

    /// Control-plane passthrough for message delivery.
    pub async fn send_message(&self, text: &str) -> bool {
        if self.use_docker {
            ContainerizedBackend::new().send_message(&self.session_id, text).await
        } else {
            self.backend().send_message(&self.session_id, text).await
        }
    }
}

/// Depth-first, pre-order search for `session_name` across a project's
/// forest of root sessions. First match wins.
#[must_use]
pub fn find_session<'a>(roots: &'a [Session], session_name: &str) -> Option<&'a Session> {
    for root in roots {
        if let Some(found) = find_in(root, session_name) {
            return Some(found);
        }
    }
    None
}

fn find_in<'a>(node: &'a Session, session_name: &str) -> Option<&'a Session> {
    if node.session_name == session_name {
        return Some(node);
    }
    for child in &node.children {
        if let Some(found) = find_in(child, session_name) {
            return Some(found);
        }
    }
    None
}

/// Depth-first, pre-order search by `session_id` rather than `session_name`,
/// used by the monitor to resolve the hooking agent from its container/
/// terminal identifier.
#[must_use]
pub fn find_session_by_id<'a>(roots: &'a [Session], session_id: &str) -> Option<&'a Session> {
    for root in roots {
        if let Some(found) = find_by_id_in(root, session_id) {
            return Some(found);
        }
    }
    None
}

fn find_by_id_in<'a>(node: &'a Session, session_id: &str) -> Option<&'a Session> {
    if node.session_id == session_id {
        return Some(node);
    }
    for child in &node.children {
        if let Some(found) = find_by_id_in(child, session_id) {
            return Some(found);
        }
    }
    None
}

/// Mutable counterpart of [`find_session`].
pub fn find_session_mut<'a>(roots: &'a mut [Session], session_name: &str) -> Option<&'a mut Session> {
    for root in roots {
        if let Some(found) = find_in_mut(root, session_name) {
            return Some(found);
        }
    }
    None
}

fn find_in_mut<'a>(node: &'a mut Session, session_name: &str) -> Option<&'a mut Session> {
    if node.session_name == session_name {
        return Some(node);
    }
    for child in &mut node.children {
        if let Some(found) = find_in_mut(child, session_name) {
            return Some(found);
        }
    }
    None
}

/// Whether any session in the forest already has `paired = true`; used to
/// enforce the project-wide pairing-exclusivity invariant before enabling.
#[must_use]
pub fn any_paired(roots: &[Session]) -> Option<&Session> {
    for root in roots {
        if let Some(found) = any_paired_in(root) {
            return Some(found);
        }
    }
    None
}

fn any_paired_in(node: &Session) -> Option<&Session> {
    if node.paired {
        return Some(node);
    }
    for child in &node.children {
        if let Some(found) = any_paired_in(child) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent::AgentRegistry;

    fn registry() -> AgentRegistry {
        AgentRegistry::builtin()
    }

    #[test]
    fn new_root_uses_source_path_as_work_path() {
        let registry = registry();
        let designer = registry.resolve("designer").unwrap();
        let session = Session::new_root(PathBuf::from("/p"), "designer".to_owned(), designer);
        assert_eq!(session.work_path, session.source_path);
        assert!(session.is_root());
    }

    #[test]
    fn new_child_nests_work_path_under_worktrees() {
        let registry = registry();
        let designer = registry.resolve("designer").unwrap();
        let executor = registry.resolve("executor").unwrap();
        let parent = Session::new_root(PathBuf::from("/p"), "designer".to_owned(), designer);
        let child = Session::new_child(&parent, "child".to_owned(), executor);
        assert_eq!(child.parent_session_name.as_deref(), Some("designer"));
        assert!(child.work_path.to_string_lossy().contains("worktrees"));
        assert_ne!(child.work_path, child.source_path);
    }

    #[test]
    fn find_session_is_depth_first_pre_order() {
        let registry = registry();
        let designer = registry.resolve("designer").unwrap();
        let executor = registry.resolve("executor").unwrap();
        let mut root = Session::new_root(PathBuf::from("/p"), "designer".to_owned(), designer);
        let mut child = Session::new_child(&root, "a".to_owned(), executor);
        let grandchild = Session::new_child(&child, "b".to_owned(), executor);
        child.children.push(grandchild);
        root.children.push(child);
        let roots = vec![root];

        assert!(find_session(&roots, "a").is_some());
        assert!(find_session(&roots, "b").is_some());
        assert!(find_session(&roots, "missing").is_none());
    }

    #[test]
    fn any_paired_finds_the_single_paired_session() {
        let registry = registry();
        let designer = registry.resolve("designer").unwrap();
        let executor = registry.resolve("executor").unwrap();
        let mut root = Session::new_root(PathBuf::from("/p"), "designer".to_owned(), designer);
        let mut child = Session::new_child(&root, "a".to_owned(), executor);
        child.paired = true;
        root.children.push(child);

        assert_eq!(any_paired(std::slice::from_ref(&root)).unwrap().session_name, "a");
    }
}
