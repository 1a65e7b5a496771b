//! Pairing swap: aliasing a project's `source_path` onto one executor's
//! worktree via a symlink, backing up the original directory.
//!
//! Precondition checks that depend on the session tree (not root, no other
//! session in the project already paired) live in [`crate::core::session`];
//! this module only knows about filesystem state and performs the three
//! reversible steps described in the workspace primitives.

use std::path::{Path, PathBuf};

use crate::core::errors::WorkspaceError;

fn backup_path(source_path: &Path) -> PathBuf {
    let mut name = source_path.as_os_str().to_os_string();
    name.push(".backup");
    PathBuf::from(name)
}

/// Where the pre-pairing `.git` file contents are stashed inside the backup
/// directory, so disabling restores the worktree's original gitdir pointer
/// byte-for-byte rather than reconstructing a guessed value.
fn stashed_gitdir_path(backup: &Path) -> PathBuf {
    backup.join(".orchestra-pairing-gitdir")
}

/// Enable pairing: `source_path` becomes a symlink to `work_path`, and the
/// original `source_path` contents move to `{source_path}.backup`.
///
/// `work_path/.git` is rewritten to point at a `worktrees/{session_id}`
/// entry inside the relocated backup's `.git`, per the default git-worktree
/// layout (see the design note on relocated-suffix repositories).
pub async fn enable(source_path: &Path, work_path: &Path, session_id: &str) -> anyhow::Result<()> {
    let backup = backup_path(source_path);

    if tokio::fs::try_exists(&backup).await? {
        return Err(WorkspaceError::PairingPreconditionFailed {
            action: "enable",
            name: session_id.to_owned(),
            reason: format!("backup {} already exists", backup.display()),
        }
        .into());
    }

    let original_gitdir = tokio::fs::read_to_string(work_path.join(".git")).await.ok();

    // Step (a): rename source_path -> backup.
    tokio::fs::rename(source_path, &backup)
        .await
        .map_err(|source| WorkspaceError::PairingStepFailed {
            step: "rename",
            name: session_id.to_owned(),
            source,
        })?;

    // Stash the pre-pairing gitdir pointer inside the backup so `disable`
    // can restore it exactly, rather than guessing the original layout.
    if let Some(original) = &original_gitdir {
        let _ = tokio::fs::write(stashed_gitdir_path(&backup), original).await;
    }

    let resolved_backup = match tokio::fs::canonicalize(&backup).await {
        Ok(p) => p,
        Err(source) => {
            let _ = tokio::fs::rename(&backup, source_path).await;
            return Err(WorkspaceError::PairingStepFailed {
                step: "rename",
                name: session_id.to_owned(),
                source,
            }
            .into());
        }
    };

    // Step (b): rewrite worktree/.git to point into the backup's .git.
    let new_gitdir = format!(
        "gitdir: {}/.git/worktrees/{session_id}\n",
        resolved_backup.display()
    );
    if let Err(source) = tokio::fs::write(work_path.join(".git"), &new_gitdir).await {
        let _ = tokio::fs::rename(&backup, source_path).await;
        return Err(WorkspaceError::PairingStepFailed {
            step: "rewrite-gitdir",
            name: session_id.to_owned(),
            source,
        }
        .into());
    }

    // Step (c): symlink source_path -> work_path.
    #[cfg(unix)]
    if let Err(source) = tokio::fs::symlink(work_path, source_path).await {
        if let Some(original) = original_gitdir {
            let _ = tokio::fs::write(work_path.join(".git"), original).await;
        }
        let _ = tokio::fs::rename(&backup, source_path).await;
        return Err(WorkspaceError::PairingStepFailed {
            step: "symlink",
            name: session_id.to_owned(),
            source,
        }
        .into());
    }

    tracing::info!(
        source = %source_path.display(),
        work = %work_path.display(),
        "Pairing enabled"
    );
    Ok(())
}

/// Disable pairing: reverses [`enable`] in the opposite order. Requires
/// `source_path` to currently be a symlink and `{source_path}.backup` to
/// exist; the worktree's `.git` rewrite is left to the caller to validate
/// beforehand if it cares about the exact gitdir contents.
pub async fn disable(source_path: &Path, work_path: &Path, session_id: &str) -> anyhow::Result<()> {
    let backup = backup_path(source_path);

    let meta = tokio::fs::symlink_metadata(source_path).await.map_err(|source| {
        WorkspaceError::PairingStepFailed {
            step: "symlink",
            name: session_id.to_owned(),
            source,
        }
    })?;
    if !meta.file_type().is_symlink() {
        return Err(WorkspaceError::PairingPreconditionFailed {
            action: "disable",
            name: session_id.to_owned(),
            reason: format!("{} is not a symlink", source_path.display()),
        }
        .into());
    }
    if !tokio::fs::try_exists(&backup).await? {
        return Err(WorkspaceError::PairingPreconditionFailed {
            action: "disable",
            name: session_id.to_owned(),
            reason: format!("backup {} does not exist", backup.display()),
        }
        .into());
    }

    // Step (c) reversed: remove the symlink.
    tokio::fs::remove_file(source_path)
        .await
        .map_err(|source| WorkspaceError::PairingStepFailed {
            step: "symlink",
            name: session_id.to_owned(),
            source,
        })?;

    // Step (b) reversed: restore the exact pre-pairing gitdir pointer that
    // was stashed in the backup during `enable`, if any was captured.
    let stash = stashed_gitdir_path(&backup);
    if let Ok(original) = tokio::fs::read_to_string(&stash).await {
        let _ = tokio::fs::write(work_path.join(".git"), original).await;
        let _ = tokio::fs::remove_file(&stash).await;
    }

    // Step (a) reversed: rename backup back to source_path.
    tokio::fs::rename(&backup, source_path)
        .await
        .map_err(|source| WorkspaceError::PairingStepFailed {
            step: "rename",
            name: session_id.to_owned(),
            source,
        })?;

    tracing::info!(
        source = %source_path.display(),
        work = %work_path.display(),
        "Pairing disabled"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    async fn setup_pair(root: &Path) -> (PathBuf, PathBuf) {
        let source = root.join("project");
        let work = root.join("worktree");
        tokio::fs::create_dir_all(&source).await.unwrap();
        tokio::fs::create_dir_all(work.join(".git").parent().unwrap()).await.unwrap();
        tokio::fs::create_dir_all(&work).await.unwrap();
        tokio::fs::write(work.join(".git"), "gitdir: ../../.git/worktrees/child\n")
            .await
            .unwrap();
        (source, work)
    }

    #[tokio::test]
    async fn enable_then_disable_restores_original_layout() {
        let root = tempfile::tempdir().unwrap();
        let (source, work) = setup_pair(root.path()).await;

        enable(&source, &work, "proj-child").await.unwrap();

        let meta = tokio::fs::symlink_metadata(&source).await.unwrap();
        assert!(meta.file_type().is_symlink());
        assert!(tokio::fs::try_exists(root.path().join("project.backup")).await.unwrap());

        let gitdir_contents = tokio::fs::read_to_string(work.join(".git")).await.unwrap();
        let re_ok = gitdir_contents.starts_with("gitdir: ")
            && gitdir_contents
                .trim_end()
                .ends_with(".git/worktrees/proj-child");
        assert!(re_ok, "unexpected gitdir contents: {gitdir_contents}");

        disable(&source, &work, "proj-child").await.unwrap();

        let meta = tokio::fs::symlink_metadata(&source).await.unwrap();
        assert!(meta.is_dir() && !meta.file_type().is_symlink());
        assert!(!tokio::fs::try_exists(root.path().join("project.backup")).await.unwrap());
    }

    #[tokio::test]
    async fn enable_fails_if_backup_already_exists() {
        let root = tempfile::tempdir().unwrap();
        let (source, work) = setup_pair(root.path()).await;
        tokio::fs::create_dir_all(root.path().join("project.backup")).await.unwrap();

        let result = enable(&source, &work, "proj-child").await;
        assert!(result.is_err());
        // source_path must be untouched on precondition failure.
        assert!(source.is_dir());
    }
}
