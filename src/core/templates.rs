//! Per-workspace file templates written by [`super::session::Session::prepare`]
//! and `spawn_child`.

use std::path::Path;

use serde_json::{json, Value};

use super::agent::AgentDescriptor;

/// `.claude/orchestra.md`: per-session system prompt.
#[must_use]
pub fn orchestra_md(descriptor: &AgentDescriptor, session_name: &str, work_path: &Path) -> String {
    format!(
        "# Orchestra session: {session_name}\n\n\
         work_path: {}\n\n\
         {}\n",
        work_path.display(),
        descriptor.prompt
    )
}

/// `.claude/CLAUDE.md`: imports `orchestra.md`.
#[must_use]
pub fn claude_md() -> String {
    "@.claude/orchestra.md\n".to_owned()
}

/// `instructions.md`: child-only, holds the literal spawn instructions.
#[must_use]
pub fn instructions_md(instructions: &str) -> String {
    format!("{instructions}\n")
}

/// `.claude/commands/merge-child.md`: designer-only slash command for
/// merging a finished executor's branch back in.
#[must_use]
pub fn merge_child_md() -> String {
    "Merge the named child session's branch into the current branch, \
     then report whether the merge was clean or had conflicts.\n"
        .to_owned()
}

/// `.orchestra/designer.md`: templated project-level spec file, present for
/// every session so executors can read the same brief as the designer.
#[must_use]
pub fn designer_md(project_name: &str) -> String {
    format!("# {project_name}\n\nSee the root designer session for the current task brief.\n")
}

fn hook_command(session_id: &str, source_path: &Path) -> Value {
    json!({
        "type": "command",
        "command": format!("orchestra-hook {session_id} {}", source_path.display())
    })
}

/// `.claude/settings.json`: permissions, MCP servers, and (for non-root
/// agents) hook commands.
#[must_use]
pub fn settings_json(
    descriptor: &AgentDescriptor,
    is_root: bool,
    session_id: &str,
    source_path: &Path,
    mcp_port: u16,
) -> Value {
    let mut mcp_servers = serde_json::Map::new();
    mcp_servers.insert(
        "orchestra-mcp".to_owned(),
        json!({ "url": format!("http://127.0.0.1:{mcp_port}"), "type": "http" }),
    );
    for (name, value) in &descriptor.mcp_config {
        mcp_servers.insert(name.clone(), value.clone());
    }

    let allow: Vec<Value> = descriptor.allowed_tools.iter().map(|t| json!(t)).collect();

    let mut settings = json!({
        "permissions": {
            "defaultMode": if is_root { "requireApproval" } else { "bypassPermissions" },
            "allow": allow,
        },
        "mcpServers": Value::Object(mcp_servers),
    });

    if !is_root {
        settings["hooks"] = json!({
            "PostToolUse": [{ "matcher": "*", "hooks": [hook_command(session_id, source_path)] }],
            "UserPromptSubmit": [{ "hooks": [hook_command(session_id, source_path)] }],
            "Stop": [{ "hooks": [hook_command(session_id, source_path)] }],
        });
    }

    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent::AgentRegistry;

    #[test]
    fn root_settings_has_no_hooks_block() {
        let registry = AgentRegistry::builtin();
        let designer = registry.resolve("designer").unwrap();
        let settings = settings_json(designer, true, "proj-designer", Path::new("/p"), 8765);
        assert!(settings.get("hooks").is_none());
        assert_eq!(settings["permissions"]["defaultMode"], "requireApproval");
    }

    #[test]
    fn child_settings_includes_hook_commands() {
        let registry = AgentRegistry::builtin();
        let executor = registry.resolve("executor").unwrap();
        let settings = settings_json(executor, false, "proj-child", Path::new("/p"), 8765);
        assert!(settings["hooks"]["PostToolUse"].is_array());
        assert_eq!(settings["permissions"]["defaultMode"], "bypassPermissions");
    }

    #[test]
    fn hook_commands_substitute_real_session_id_and_source_path() {
        let registry = AgentRegistry::builtin();
        let executor = registry.resolve("executor").unwrap();
        let settings = settings_json(executor, false, "proj-child", Path::new("/work/proj"), 8765);
        let command = settings["hooks"]["Stop"][0]["hooks"][0]["command"].as_str().unwrap();
        assert_eq!(command, "orchestra-hook proj-child /work/proj");
        assert!(!command.contains('{'));
    }

    #[test]
    fn mcp_servers_always_include_orchestra_mcp() {
        let registry = AgentRegistry::builtin();
        let designer = registry.resolve("designer").unwrap();
        let settings = settings_json(designer, true, "proj-designer", Path::new("/p"), 8765);
        assert_eq!(settings["mcpServers"]["orchestra-mcp"]["type"], "http");
    }
}
