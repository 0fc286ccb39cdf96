//! services/api/src/adapters/artifact_store.rs
//!
//! Generated artifacts as plain files under `artifacts/<kind>/`, each with a
//! `<filename>.meta.json` sidecar recording when and how it was generated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use studypod_core::domain::{ArtifactContent, ArtifactKind, ArtifactRecord, NotebookScope};
use studypod_core::ports::{ArtifactStore, PortError, PortResult};
use studypod_core::security::sanitize_filename;
use tracing::{info, warn};

use crate::adapters::layout::{contained, write_atomic, DataLayout};

const SIDECAR_SUFFIX: &str = ".meta.json";

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    created_at: DateTime<Utc>,
    #[serde(default)]
    parameters: serde_json::Value,
}

pub struct FsArtifactStore {
    layout: DataLayout,
}

impl FsArtifactStore {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    /// Sanitises `filename`, checks the extension against `kind` and returns
    /// the contained path together with the clean name.
    async fn resolve(&self, scope: &NotebookScope, kind: ArtifactKind, filename: &str) -> PortResult<(PathBuf, String)> {
        let name = sanitize_filename(filename)?;
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if name.ends_with(SIDECAR_SUFFIX) || !kind.allowed_extensions().contains(&ext.as_str()) {
            return Err(PortError::InvalidInput(format!(
                "'{}' is not a valid {} file name",
                name,
                kind.dir_name()
            )));
        }
        let path = contained(&self.layout.artifact_dir(scope, kind), &name).await?;
        Ok((path, name))
    }

    async fn record_for(&self, kind: ArtifactKind, path: &Path, filename: String) -> PortResult<ArtifactRecord> {
        let metadata = tokio::fs::metadata(path).await?;
        let sidecar = read_sidecar(&sidecar_path(path)).await;
        let created_at = match &sidecar {
            Some(s) => s.created_at,
            None => metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now()),
        };
        Ok(ArtifactRecord {
            kind,
            filename,
            created_at,
            size_bytes: metadata.len(),
            parameters: sidecar.map(|s| s.parameters).unwrap_or(serde_json::Value::Null),
        })
    }
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(SIDECAR_SUFFIX);
    path.with_file_name(name)
}

async fn read_sidecar(path: &Path) -> Option<Sidecar> {
    let bytes = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(sidecar) => Some(sidecar),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable artifact metadata");
            None
        }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn save(
        &self,
        scope: &NotebookScope,
        kind: ArtifactKind,
        filename: &str,
        content: ArtifactContent,
        parameters: serde_json::Value,
    ) -> PortResult<ArtifactRecord> {
        let (path, name) = self.resolve(scope, kind, filename).await?;
        let bytes = match content {
            ArtifactContent::Text(text) => text.into_bytes(),
            ArtifactContent::Audio(bytes) => bytes,
        };
        write_atomic(&path, &bytes).await?;

        let sidecar = Sidecar {
            created_at: Utc::now(),
            parameters,
        };
        write_atomic(&sidecar_path(&path), &serde_json::to_vec_pretty(&sidecar)?).await?;

        info!(scope = %scope, kind = kind.dir_name(), filename = %name, bytes = bytes.len(), "Artifact saved");
        Ok(ArtifactRecord {
            kind,
            filename: name,
            created_at: sidecar.created_at,
            size_bytes: bytes.len() as u64,
            parameters: sidecar.parameters,
        })
    }

    async fn list(&self, scope: &NotebookScope, kind: Option<ArtifactKind>) -> PortResult<Vec<ArtifactRecord>> {
        let kinds: Vec<ArtifactKind> = match kind {
            Some(kind) => vec![kind],
            None => ArtifactKind::ALL.to_vec(),
        };

        let mut records = Vec::new();
        for kind in kinds {
            let dir = self.layout.artifact_dir(scope, kind);
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let filename = entry.file_name().to_string_lossy().into_owned();
                if filename.starts_with('.') || filename.ends_with(SIDECAR_SUFFIX) {
                    continue;
                }
                if !entry.file_type().await?.is_file() {
                    continue;
                }
                records.push(self.record_for(kind, &entry.path(), filename).await?);
            }
        }

        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        Ok(records)
    }

    async fn get_text(&self, scope: &NotebookScope, kind: ArtifactKind, filename: &str) -> PortResult<String> {
        let bytes = self.get_bytes(scope, kind, filename).await?;
        String::from_utf8(bytes)
            .map_err(|_| PortError::InvalidInput(format!("'{}' is not a text artifact", filename)))
    }

    async fn get_bytes(&self, scope: &NotebookScope, kind: ArtifactKind, filename: &str) -> PortResult<Vec<u8>> {
        let (path, name) = self.resolve(scope, kind, filename).await?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PortError::NotFound(format!("artifact {}/{}", kind.dir_name(), name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, scope: &NotebookScope, kind: ArtifactKind, filename: &str) -> PortResult<bool> {
        let (path, name) = self.resolve(scope, kind, filename).await?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = tokio::fs::remove_file(sidecar_path(&path)).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(filename = %name, error = %e, "Could not remove artifact metadata");
            }
        }
        info!(scope = %scope, kind = kind.dir_name(), filename = %name, "Artifact deleted");
        Ok(true)
    }
}
