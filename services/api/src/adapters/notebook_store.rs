//! services/api/src/adapters/notebook_store.rs
//!
//! Notebooks on disk: a per-user `index.json` listing the notebooks, and one
//! `metadata.json` per notebook holding its sources. The metadata file is the
//! source of truth; the index only exists to enumerate a user's notebooks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use studypod_core::domain::{Notebook, NotebookScope, SourceRef};
use studypod_core::ports::{NotebookStore, PortError, PortResult};
use studypod_core::security::{generate_notebook_id, sanitize_notebook_name};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::layout::{contained, write_atomic, DataLayout};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    id: Uuid,
    title: String,
    created_at: DateTime<Utc>,
}

/// Serialises read-modify-write cycles within this process. Separate
/// processes sharing a data directory are still last-writer-wins.
pub struct FsNotebookStore {
    layout: DataLayout,
    write_lock: Mutex<()>,
}

impl FsNotebookStore {
    pub fn new(layout: DataLayout) -> Self {
        Self {
            layout,
            write_lock: Mutex::new(()),
        }
    }

    async fn read_index(&self, username: &str) -> PortResult<Vec<IndexEntry>> {
        match tokio::fs::read(self.layout.index_file(username)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_index(&self, username: &str, entries: &[IndexEntry]) -> PortResult<()> {
        write_json(&self.layout.index_file(username), entries).await
    }

    async fn read_metadata(&self, scope: &NotebookScope) -> PortResult<Notebook> {
        match tokio::fs::read(self.layout.metadata_file(scope)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PortError::NotFound(format!("notebook {}", scope.notebook_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Loads the metadata, applies `change` and writes it back under the lock.
    async fn update<F>(&self, scope: &NotebookScope, change: F) -> PortResult<Notebook>
    where
        F: FnOnce(&mut Notebook) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut notebook = self.read_metadata(scope).await?;
        change(&mut notebook);
        notebook.updated_at = Utc::now();
        write_json(&self.layout.metadata_file(scope), &notebook).await?;
        Ok(notebook)
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> PortResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes).await
}

#[async_trait]
impl NotebookStore for FsNotebookStore {
    async fn create_notebook(&self, username: &str, title: &str) -> PortResult<Notebook> {
        let title = sanitize_notebook_name(title)?;
        let _guard = self.write_lock.lock().await;

        let mut index = self.read_index(username).await?;
        if index.iter().any(|e| e.title.eq_ignore_ascii_case(&title)) {
            return Err(PortError::Conflict(format!(
                "a notebook named '{}' already exists",
                title
            )));
        }

        let now = Utc::now();
        let notebook = Notebook {
            id: generate_notebook_id(),
            owner: username.to_string(),
            title,
            created_at: now,
            updated_at: now,
            sources: Vec::new(),
        };
        let scope = notebook.scope();

        write_json(&self.layout.metadata_file(&scope), &notebook).await?;
        index.push(IndexEntry {
            id: notebook.id,
            title: notebook.title.clone(),
            created_at: now,
        });
        self.write_index(username, &index).await?;

        info!(scope = %scope, title = %notebook.title, "Notebook created");
        Ok(notebook)
    }

    async fn list_notebooks(&self, username: &str) -> PortResult<Vec<Notebook>> {
        let index = self.read_index(username).await?;
        let mut notebooks = Vec::with_capacity(index.len());
        for entry in index {
            let scope = NotebookScope::new(username, entry.id);
            match self.read_metadata(&scope).await {
                Ok(notebook) => notebooks.push(notebook),
                Err(e) => warn!(scope = %scope, error = %e, "Skipping notebook with unreadable metadata"),
            }
        }
        notebooks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notebooks)
    }

    async fn get_notebook(&self, scope: &NotebookScope) -> PortResult<Notebook> {
        self.read_metadata(scope).await
    }

    async fn delete_notebook(&self, scope: &NotebookScope) -> PortResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut index = self.read_index(&scope.username).await?;
        let before = index.len();
        index.retain(|e| e.id != scope.notebook_id);
        let listed = index.len() != before;

        let dir = self.layout.scope_dir(scope);
        let on_disk = tokio::fs::try_exists(&dir).await.unwrap_or(false);
        if !listed && !on_disk {
            return Err(PortError::NotFound(format!("notebook {}", scope.notebook_id)));
        }

        if listed {
            self.write_index(&scope.username, &index).await?;
        }
        if on_disk {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        info!(scope = %scope, "Notebook deleted");
        Ok(())
    }

    async fn record_source(&self, scope: &NotebookScope, source: SourceRef) -> PortResult<Notebook> {
        self.update(scope, move |notebook| {
            notebook.sources.retain(|s| s.source_id != source.source_id);
            notebook.sources.push(source);
        })
        .await
    }

    async fn remove_source(&self, scope: &NotebookScope, source_id: &str) -> PortResult<Notebook> {
        self.update(scope, |notebook| {
            notebook.sources.retain(|s| s.source_id != source_id);
        })
        .await
    }

    async fn touch(&self, scope: &NotebookScope) -> PortResult<()> {
        self.update(scope, |_| {}).await.map(|_| ())
    }

    async fn save_raw_file(&self, scope: &NotebookScope, file_name: &str, data: &[u8]) -> PortResult<()> {
        let path = contained(&self.layout.raw_dir(scope), file_name).await?;
        write_atomic(&path, data).await
    }

    async fn save_extracted_text(&self, scope: &NotebookScope, name: &str, text: &str) -> PortResult<()> {
        let path = contained(&self.layout.extracted_dir(scope), name).await?;
        write_atomic(&path, text.as_bytes()).await
    }
}
