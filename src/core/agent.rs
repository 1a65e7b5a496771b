//! Agent descriptors and the registry that resolves them by name.
//!
//! The original system modeled agents as duck-typed Python objects looked up
//! by string key. Here that becomes a tagged `AgentDescriptor` plus a
//! registry: two built-in descriptors (`designer`, `executor`) are always
//! present, and `config/agents.yaml` may add further named descriptors for
//! custom agent roles (reviewer, tester, ...). A session whose stored
//! `agent_type` no longer resolves against the registry is a *stale* agent:
//! it loads fine for display purposes but refuses to start.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Which workspace-preparation strategy a descriptor uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentKind {
    /// Root agent; works directly in the project's source directory.
    Designer,
    /// Child agent; works inside a private git worktree.
    Executor,
    /// Named custom agent; works under a per-project subagents directory.
    Custom,
}

/// Immutable configuration for one agent role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Registry key; also the value stored as a session's `agent_type`.
    pub name: String,
    /// Workspace-preparation strategy.
    pub kind: AgentKind,
    /// System-prompt text merged into the per-session `.claude/orchestra.md`.
    pub prompt: String,
    /// Whether sessions of this type run inside a container.
    pub use_docker: bool,
    /// Additional `mcpServers` entries merged into `settings.json`, beyond
    /// the always-present `orchestra-mcp` entry.
    #[serde(default)]
    pub mcp_config: serde_json::Map<String, serde_json::Value>,
    /// Tool-name patterns allowed without prompting.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

impl AgentDescriptor {
    fn designer() -> Self {
        Self {
            name: "designer".to_owned(),
            kind: AgentKind::Designer,
            prompt: "You are the designer agent. You own the project's source directory \
                     and may spawn executor children to carry out isolated units of work."
                .to_owned(),
            use_docker: false,
            mcp_config: serde_json::Map::new(),
            allowed_tools: vec!["*".to_owned()],
        }
    }

    fn executor() -> Self {
        Self {
            name: "executor".to_owned(),
            kind: AgentKind::Executor,
            prompt: "You are an executor agent working inside an isolated git worktree on \
                     your own branch. Report back to your parent session when done."
                .to_owned(),
            use_docker: false,
            mcp_config: serde_json::Map::new(),
            allowed_tools: vec!["*".to_owned()],
        }
    }
}

/// Definitions loaded from `config/agents.yaml`.
#[derive(Debug, Default, Deserialize)]
struct AgentsFile {
    #[serde(default)]
    agents: Vec<AgentDescriptor>,
}

/// Registry of resolvable agent descriptors, keyed by name.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    descriptors: HashMap<String, AgentDescriptor>,
}

impl AgentRegistry {
    /// Build a registry containing only the two built-in descriptors.
    #[must_use]
    pub fn builtin() -> Self {
        let mut descriptors = HashMap::new();
        descriptors.insert("designer".to_owned(), AgentDescriptor::designer());
        descriptors.insert("executor".to_owned(), AgentDescriptor::executor());
        Self { descriptors }
    }

    /// Load the built-in descriptors plus any custom ones defined in
    /// `path`. Missing or unreadable files fall back to the built-ins
    /// only; a malformed file is an error so misconfiguration is not
    /// silently swallowed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut registry = Self::builtin();

        let Ok(contents) = std::fs::read_to_string(path) else {
            return Ok(registry);
        };

        let file: AgentsFile = serde_yaml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;

        for descriptor in file.agents {
            registry.descriptors.insert(descriptor.name.clone(), descriptor);
        }

        Ok(registry)
    }

    /// Resolve a descriptor by name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&AgentDescriptor> {
        self.descriptors.get(name)
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_resolves_designer_and_executor() {
        let registry = AgentRegistry::builtin();
        assert_eq!(registry.resolve("designer").unwrap().kind, AgentKind::Designer);
        assert_eq!(registry.resolve("executor").unwrap().kind, AgentKind::Executor);
    }

    #[test]
    fn unresolvable_name_is_stale() {
        let registry = AgentRegistry::builtin();
        assert!(registry.resolve("reviewer").is_none());
    }

    #[test]
    fn load_missing_file_falls_back_to_builtins() {
        let registry = AgentRegistry::load(Path::new("/nonexistent/agents.yaml")).unwrap();
        assert!(registry.resolve("designer").is_some());
    }

    #[test]
    fn load_custom_descriptor_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.yaml");
        std::fs::write(
            &path,
            r"
agents:
  - name: reviewer
    kind: Custom
    prompt: Review the diff for correctness.
    use_docker: false
    allowed_tools: ['Read', 'Grep']
",
        )
        .unwrap();

        let registry = AgentRegistry::load(&path).unwrap();
        let reviewer = registry.resolve("reviewer").unwrap();
        assert_eq!(reviewer.kind, AgentKind::Custom);
        assert_eq!(reviewer.allowed_tools, vec!["Read", "Grep"]);
        // Built-ins remain available alongside custom entries.
        assert!(registry.resolve("designer").is_some());
    }
}
