//! The global session store: a single JSON document, keyed by absolute
//! project path, rewritten atomically on every mutation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::session::{self, Session};

/// The full on-disk document: project absolute path -> ordered roots.
pub type StoreDocument = HashMap<String, Vec<Session>>;

/// Read the store document. A missing or malformed file is treated as an
/// empty document rather than an error, per the corrupt-persistence policy.
pub async fn load_document(path: &Path) -> StoreDocument {
    let Ok(bytes) = tokio::fs::read(path).await else {
        return StoreDocument::new();
    };
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "sessions.json is malformed, treating as empty");
        StoreDocument::new()
    })
}

/// Write the full document atomically: serialize to a temp file in the same
/// directory, then rename over the target.
pub async fn save_document(path: &Path, doc: &StoreDocument) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Load the roots for one project, `[]` if the project has no entry.
pub async fn load_sessions(path: &Path, project: &str) -> Vec<Session> {
    load_document(path).await.remove(project).unwrap_or_default()
}

/// Replace a project's roots in the document and rewrite the whole document
/// atomically.
pub async fn save_session(path: &Path, project: &str, roots: Vec<Session>) -> anyhow::Result<()> {
    let mut doc = load_document(path).await;
    if roots.is_empty() {
        doc.remove(project);
    } else {
        doc.insert(project.to_owned(), roots);
    }
    save_document(path, &doc).await
}

/// Depth-first, pre-order lookup of `session_name` within one project.
pub async fn find_session(path: &Path, project: &str, session_name: &str) -> Option<Session> {
    let roots = load_sessions(path, project).await;
    session::find_session(&roots, session_name).cloned()
}

/// Default store location (`{orchestra_home}/sessions.json`).
#[must_use]
pub fn default_path() -> PathBuf {
    crate::config::sessions_path()
}
