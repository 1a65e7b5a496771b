//! Stable `.git` relocation.
//!
//! Pairing rewrites a worktree's `.git` file to point at
//! `{backup}/.git/worktrees/{id}`. For that path to stay valid across
//! repeated pair/unpair cycles, the real `.git` directory must live
//! somewhere that never moves — so on first use we relocate it out of
//! `source_path` into `orchestra_home/repos/{basename}/.git` and leave a
//! symlink behind.

use std::path::{Path, PathBuf};

use crate::config;
use crate::core::errors::WorkspaceError;

/// Ensure `source_path/.git` is a symlink into the stable repos directory,
/// relocating a real directory there on first encounter. Idempotent.
pub async fn ensure_stable_git(source_path: &Path) -> anyhow::Result<PathBuf> {
    let basename = config::project_basename(source_path);
    let target = config::repo_git_path(&basename);
    ensure_stable_git_at(source_path, &basename, &target).await
}

/// Same as [`ensure_stable_git`] with the relocation target resolved by the
/// caller, so callers (and tests) don't need a process-wide home directory.
async fn ensure_stable_git_at(source_path: &Path, basename: &str, target: &Path) -> anyhow::Result<PathBuf> {
    let git_path = source_path.join(".git");

    let meta = tokio::fs::symlink_metadata(&git_path).await?;

    if meta.file_type().is_symlink() {
        let current_target = tokio::fs::read_link(&git_path).await?;
        let resolved = if current_target.is_absolute() {
            current_target
        } else {
            source_path.join(current_target)
        };
        if resolved != target {
            return Err(WorkspaceError::RelocationConflict {
                project: basename.to_owned(),
                target: resolved,
            }
            .into());
        }
        return Ok(target.to_path_buf());
    }

    if !meta.is_dir() {
        anyhow::bail!(".git at {} is neither a directory nor a symlink", git_path.display());
    }

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    if tokio::fs::try_exists(&target).await? {
        return Err(WorkspaceError::RelocationConflict {
            project: basename.to_owned(),
            target: target.to_path_buf(),
        }
        .into());
    }

    tokio::fs::rename(&git_path, target).await?;

    #[cfg(unix)]
    tokio::fs::symlink(target, &git_path).await?;

    tracing::info!(
        source = %source_path.display(),
        target = %target.display(),
        "Relocated .git to stable repos directory"
    );

    Ok(target.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn relocates_real_git_dir_and_leaves_symlink() {
        let home = tempfile::tempdir().unwrap();
        let target_path = home.path().join("repos").join("proj").join(".git");

        let project = tempfile::tempdir().unwrap();
        let git_dir = project.path().join(".git");
        tokio::fs::create_dir_all(&git_dir).await.unwrap();
        tokio::fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n")
            .await
            .unwrap();

        let target = ensure_stable_git_at(project.path(), "proj", &target_path).await.unwrap();
        assert!(target.join("HEAD").exists());

        let relinked_meta = tokio::fs::symlink_metadata(project.path().join(".git"))
            .await
            .unwrap();
        assert!(relinked_meta.file_type().is_symlink());

        // Idempotent: calling again on the now-symlinked project succeeds
        // and returns the same target.
        let target2 = ensure_stable_git_at(project.path(), "proj", &target_path).await.unwrap();
        assert_eq!(target, target2);
    }
}
