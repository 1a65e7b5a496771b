//! Git worktree creation for executor and custom-agent sessions.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::core::errors::WorkspaceError;

/// Abstraction over the worktree-creation git plumbing, so tests can swap in
/// a fake implementation without shelling out.
#[async_trait]
pub trait GitOperations: Send + Sync {
    /// Idempotently create (or adopt an existing) worktree at `work_path`
    /// tracking `branch_name`, branching from `source_path`.
    async fn ensure_worktree(
        &self,
        source_path: &Path,
        work_path: &Path,
        branch_name: &str,
    ) -> anyhow::Result<()>;

    /// Remove a worktree and its branch. Best-effort: failures are logged,
    /// not propagated, matching the Session layer's "best-effort" delete
    /// contract.
    async fn remove_worktree(&self, source_path: &Path, work_path: &Path, branch_name: &str);
}

/// Real `git` CLI-backed implementation.
pub struct GitBackend;

impl GitBackend {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for GitBackend {
    fn default() -> Self {
        Self::new()
    }
}

async fn branch_exists(source_path: &Path, branch_name: &str) -> anyhow::Result<bool> {
    let output = Command::new("git")
        .current_dir(source_path)
        .args(["show-ref", "--verify", "--quiet"])
        .arg(format!("refs/heads/{branch_name}"))
        .output()
        .await?;
    Ok(output.status.success())
}

fn non_empty_dir(path: &Path) -> bool {
    path.is_dir()
        && std::fs::read_dir(path)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
}

#[async_trait]
impl GitOperations for GitBackend {
    async fn ensure_worktree(
        &self,
        source_path: &Path,
        work_path: &Path,
        branch_name: &str,
    ) -> anyhow::Result<()> {
        if non_empty_dir(work_path) {
            tracing::debug!(worktree = %work_path.display(), "Worktree already present, treating as existing");
            return Ok(());
        }

        if let Some(parent) = work_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args: Vec<String> = if branch_exists(source_path, branch_name).await? {
            vec![
                "worktree".to_owned(),
                "add".to_owned(),
                work_path.display().to_string(),
                branch_name.to_owned(),
            ]
        } else {
            vec![
                "worktree".to_owned(),
                "add".to_owned(),
                "-b".to_owned(),
                branch_name.to_owned(),
                work_path.display().to_string(),
            ]
        };

        let output = Command::new("git")
            .current_dir(source_path)
            .args(&args)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            tracing::error!(
                source = %source_path.display(),
                worktree = %work_path.display(),
                branch = branch_name,
                stderr = %stderr,
                "git worktree add failed"
            );
            return Err(WorkspaceError::GitCommandFailed { args, stderr }.into());
        }

        tracing::info!(
            worktree = %work_path.display(),
            branch = branch_name,
            "Created git worktree"
        );
        Ok(())
    }

    async fn remove_worktree(&self, source_path: &Path, work_path: &Path, branch_name: &str) {
        let output = Command::new("git")
            .current_dir(source_path)
            .args(["worktree", "remove", "--force"])
            .arg(work_path)
            .output()
            .await;

        match output {
            Ok(out) if !out.status.success() => {
                tracing::warn!(
                    worktree = %work_path.display(),
                    stderr = %String::from_utf8_lossy(&out.stderr),
                    "git worktree remove failed, attempting directory removal"
                );
                if work_path.exists() {
                    let _ = tokio::fs::remove_dir_all(work_path).await;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to invoke git worktree remove");
            }
            Ok(_) => {}
        }

        let branch_delete = Command::new("git")
            .current_dir(source_path)
            .args(["branch", "-D", branch_name])
            .output()
            .await;
        if let Ok(out) = branch_delete {
            if !out.status.success() {
                tracing::warn!(
                    branch = branch_name,
                    stderr = %String::from_utf8_lossy(&out.stderr),
                    "failed to delete branch after worktree removal"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo(dir: &Path) {
        std::process::Command::new("git")
            .arg("init")
            .arg("-q")
            .current_dir(dir)
            .status()
            .unwrap();
        std::process::Command::new("git")
            .args(["config", "user.email", "test@example.com"])
            .current_dir(dir)
            .status()
            .unwrap();
        std::process::Command::new("git")
            .args(["config", "user.name", "Test"])
            .current_dir(dir)
            .status()
            .unwrap();
        std::fs::write(dir.join("README.md"), "hi").unwrap();
        std::process::Command::new("git")
            .args(["add", "."])
            .current_dir(dir)
            .status()
            .unwrap();
        std::process::Command::new("git")
            .args(["commit", "-q", "-m", "init"])
            .current_dir(dir)
            .status()
            .unwrap();
    }

    #[tokio::test]
    async fn ensure_worktree_creates_new_branch() {
        let repo = tempfile::tempdir().unwrap();
        init_repo(repo.path());
        let work = tempfile::tempdir().unwrap();
        let work_path = work.path().join("child");

        let backend = GitBackend::new();
        backend
            .ensure_worktree(repo.path(), &work_path, "feature/child")
            .await
            .unwrap();

        assert!(work_path.join(".git").exists());
    }

    #[tokio::test]
    async fn ensure_worktree_is_idempotent_on_nonempty_dir() {
        let repo = tempfile::tempdir().unwrap();
        init_repo(repo.path());
        let work = tempfile::tempdir().unwrap();
        let work_path = work.path().join("child");
        tokio::fs::create_dir_all(&work_path).await.unwrap();
        tokio::fs::write(work_path.join("marker"), "x").await.unwrap();

        let backend = GitBackend::new();
        backend
            .ensure_worktree(repo.path(), &work_path, "feature/child")
            .await
            .unwrap();

        // No .git was created since the directory was already treated as existing.
        assert!(!work_path.join(".git").exists());
    }

    #[tokio::test]
    async fn remove_worktree_deletes_directory_and_branch() {
        let repo = tempfile::tempdir().unwrap();
        init_repo(repo.path());
        let work = tempfile::tempdir().unwrap();
        let work_path = work.path().join("child");

        let backend = GitBackend::new();
        backend.ensure_worktree(repo.path(), &work_path, "feature/child").await.unwrap();
        assert!(work_path.exists());

        backend.remove_worktree(repo.path(), &work_path, "feature/child").await;

        assert!(!work_path.exists());
        assert!(!branch_exists(repo.path(), "feature/child").await.unwrap());
    }
}
