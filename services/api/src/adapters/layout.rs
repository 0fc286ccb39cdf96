//! services/api/src/adapters/layout.rs
//!
//! Where everything lives under `DATA_DIR`:
//!
//! ```text
//! users/<username>/notebooks/index.json
//! users/<username>/notebooks/<notebook-id>/metadata.json
//!                                         files_raw/  files_extracted/
//!                                         vectors/index.sqlite
//!                                         chat/messages.jsonl
//!                                         artifacts/{reports,quizzes,podcasts}/
//! ```

use std::path::{Path, PathBuf};
use studypod_core::domain::{ArtifactKind, NotebookScope};
use studypod_core::ports::{PortError, PortResult};
use studypod_core::security::validate_path;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn notebooks_dir(&self, username: &str) -> PathBuf {
        self.root.join("users").join(username).join("notebooks")
    }

    pub fn index_file(&self, username: &str) -> PathBuf {
        self.notebooks_dir(username).join("index.json")
    }

    pub fn notebook_dir(&self, username: &str, notebook_id: Uuid) -> PathBuf {
        self.notebooks_dir(username).join(notebook_id.to_string())
    }

    pub fn scope_dir(&self, scope: &NotebookScope) -> PathBuf {
        self.notebook_dir(&scope.username, scope.notebook_id)
    }

    pub fn metadata_file(&self, scope: &NotebookScope) -> PathBuf {
        self.scope_dir(scope).join("metadata.json")
    }

    pub fn raw_dir(&self, scope: &NotebookScope) -> PathBuf {
        self.scope_dir(scope).join("files_raw")
    }

    pub fn extracted_dir(&self, scope: &NotebookScope) -> PathBuf {
        self.scope_dir(scope).join("files_extracted")
    }

    pub fn vectors_dir(&self, scope: &NotebookScope) -> PathBuf {
        self.scope_dir(scope).join("vectors")
    }

    pub fn chat_file(&self, scope: &NotebookScope) -> PathBuf {
        self.scope_dir(scope).join("chat").join("messages.jsonl")
    }

    pub fn artifact_dir(&self, scope: &NotebookScope, kind: ArtifactKind) -> PathBuf {
        self.scope_dir(scope).join("artifacts").join(kind.dir_name())
    }
}

/// Joins `name` onto `dir` (creating `dir`) and refuses anything that
/// resolves outside of it.
pub async fn contained(dir: &Path, name: &str) -> PortResult<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    validate_path(&path, dir)?;
    Ok(path)
}

/// Writes through a temporary sibling and renames it into place, so readers
/// never observe a half-written file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> PortResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| PortError::Storage(format!("{:?} has no parent directory", path)))?;
    tokio::fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}
