//! crates/studypod_core/src/ingestion.rs
//!
//! Upload → extract → chunk → embed → index, once per source.

use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::chunker::chunk_text;
use crate::config::RagConfig;
use crate::domain::{DocumentChunk, FileType, Notebook, NotebookScope, SourceKind, SourceRef};
use crate::ports::{EmbeddingService, NotebookStore, PortError, PortResult, TextExtractor, VectorIndex};
use crate::security::sanitize_filename;

const UNTITLED_NOTEBOOK: &str = "Untitled notebook";

/// What a successful ingestion produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub source_id: String,
    pub source_name: String,
    pub kind: SourceKind,
    pub chunks: usize,
    pub extracted_chars: usize,
}

#[derive(Clone)]
pub struct IngestionPipeline {
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn EmbeddingService>,
    index: Arc<dyn VectorIndex>,
    notebooks: Arc<dyn NotebookStore>,
    config: Arc<RagConfig>,
}

impl IngestionPipeline {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn EmbeddingService>,
        index: Arc<dyn VectorIndex>,
        notebooks: Arc<dyn NotebookStore>,
        config: Arc<RagConfig>,
    ) -> Self {
        Self {
            extractor,
            embedder,
            index,
            notebooks,
            config,
        }
    }

    /// Ingests an uploaded file. Re-uploading a file with the same name replaces
    /// the previous version's chunks. Nothing is written until the text has
    /// been extracted and embedded, so a failed upload leaves an earlier
    /// version of the file untouched.
    #[instrument(skip_all, fields(scope = %scope, file_name = %file_name, size = data.len()))]
    pub async fn ingest_file(&self, scope: &NotebookScope, file_name: &str, data: &[u8]) -> PortResult<IngestReport> {
        self.notebooks.get_notebook(scope).await?;

        let file_type = self.check_upload(file_name, data)?;
        let name = sanitize_filename(file_name)?;
        let text = self.extractor.extract(file_type, data).await?;
        self.index_text(scope, &name, &name, SourceKind::File, &text, Some(data))
            .await
    }

    /// Creates a notebook for a first upload and ingests the file into it.
    /// The title defaults to the file name without its extension. If the
    /// ingestion fails the new notebook is removed again.
    #[instrument(skip_all, fields(username = %username, file_name = %file_name, size = data.len()))]
    pub async fn ingest_first_upload(
        &self,
        username: &str,
        title: Option<&str>,
        file_name: &str,
        data: &[u8],
    ) -> PortResult<(Notebook, IngestReport)> {
        self.check_upload(file_name, data)?;
        let title = match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => title.to_string(),
            None => default_title(file_name),
        };

        let notebook = self.notebooks.create_notebook(username, &title).await?;
        let scope = notebook.scope();
        match self.ingest_file(&scope, file_name, data).await {
            Ok(report) => Ok((self.notebooks.get_notebook(&scope).await?, report)),
            Err(e) => {
                warn!(scope = %scope, error = %e, "First upload failed, removing its notebook");
                if let Err(cleanup) = self.index.drop_notebook(&scope).await {
                    warn!(error = %cleanup, "Could not drop the index of the abandoned notebook");
                }
                if let Err(cleanup) = self.notebooks.delete_notebook(&scope).await {
                    warn!(error = %cleanup, "Could not delete the abandoned notebook");
                }
                Err(e)
            }
        }
    }

    /// Supported extension and size limit.
    fn check_upload(&self, file_name: &str, data: &[u8]) -> PortResult<FileType> {
        let file_type = FileType::from_file_name(file_name).ok_or_else(|| {
            PortError::InvalidInput(format!(
                "unsupported file type '{}': expected .pdf, .pptx or .txt",
                file_name
            ))
        })?;
        if data.len() as u64 > self.config.max_upload_bytes {
            return Err(PortError::InvalidInput(format!(
                "file is {} bytes, the limit is {} bytes",
                data.len(),
                self.config.max_upload_bytes
            )));
        }
        Ok(file_type)
    }

    /// Fetches a web page and ingests its text. The URL is the source id.
    #[instrument(skip_all, fields(scope = %scope, url = %url))]
    pub async fn ingest_url(&self, scope: &NotebookScope, url: &str) -> PortResult<IngestReport> {
        self.notebooks.get_notebook(scope).await?;

        let url = validate_url(url)?;
        let text = self.extractor.extract_url(url).await?;
        let stored_name = sanitize_filename(&url.replace(['/', '\\'], "_"))?;
        self.index_text(scope, url, &stored_name, SourceKind::Url, &text, None)
            .await
    }

    /// Deletes a source's chunks and its entry on the notebook.
    #[instrument(skip_all, fields(scope = %scope, source_id = %source_id))]
    pub async fn remove_source(&self, scope: &NotebookScope, source_id: &str) -> PortResult<usize> {
        let notebook = self.notebooks.get_notebook(scope).await?;
        if !notebook.sources.iter().any(|s| s.source_id == source_id) {
            return Err(PortError::NotFound(format!("source '{}'", source_id)));
        }

        let removed = self.index.delete_source(scope, source_id).await?;
        self.notebooks.remove_source(scope, source_id).await?;
        info!(removed, "Source removed");
        Ok(removed)
    }

    async fn index_text(
        &self,
        scope: &NotebookScope,
        source_id: &str,
        stored_name: &str,
        kind: SourceKind,
        text: &str,
        raw: Option<&[u8]>,
    ) -> PortResult<IngestReport> {
        if text.trim().is_empty() {
            return Err(PortError::Extraction(format!(
                "No text could be extracted from '{}'",
                source_id
            )));
        }

        let pieces = chunk_text(text, &self.config)?;
        let texts: Vec<String> = pieces.iter().map(|p| p.text.clone()).collect();
        let embeddings = self.embed_with_retry(&texts).await?;
        if embeddings.len() != pieces.len() {
            return Err(PortError::Embedding(format!(
                "expected {} embeddings, got {}",
                pieces.len(),
                embeddings.len()
            )));
        }

        let source_name = match kind {
            SourceKind::File => stored_name.to_string(),
            SourceKind::Url => source_id.to_string(),
        };
        let chunks: Vec<DocumentChunk> = pieces
            .into_iter()
            .zip(embeddings)
            .map(|(piece, embedding)| DocumentChunk {
                chunk_id: DocumentChunk::make_id(source_id, piece.index),
                source_id: source_id.to_string(),
                source_name: source_name.clone(),
                chunk_index: piece.index,
                text: piece.text,
                embedding,
            })
            .collect();
        let chunk_count = chunks.len();

        if let Some(raw) = raw {
            self.notebooks.save_raw_file(scope, stored_name, raw).await?;
        }
        self.notebooks
            .save_extracted_text(scope, &format!("{}.txt", stored_name), text)
            .await?;
        self.index.replace_source(scope, source_id, chunks).await?;

        let extracted_chars = text.chars().count();
        self.notebooks
            .record_source(
                scope,
                SourceRef {
                    source_id: source_id.to_string(),
                    name: source_name.clone(),
                    kind,
                    chunk_count,
                    extracted_chars,
                    added_at: Utc::now(),
                },
            )
            .await?;

        info!(source_id, chunk_count, extracted_chars, "Source ingested");
        Ok(IngestReport {
            source_id: source_id.to_string(),
            source_name,
            kind,
            chunks: chunk_count,
            extracted_chars,
        })
    }

    /// One retry for the whole batch; a second failure aborts the ingestion.
    async fn embed_with_retry(&self, texts: &[String]) -> PortResult<Vec<Vec<f32>>> {
        match self.embedder.embed_batch(texts).await {
            Ok(vectors) => Ok(vectors),
            Err(first) => {
                warn!(error = %first, batch = texts.len(), "Embedding batch failed, retrying once");
                self.embedder
                    .embed_batch(texts)
                    .await
                    .map_err(|e| match e {
                        PortError::Embedding(_) => e,
                        other => PortError::Embedding(other.to_string()),
                    })
            }
        }
    }
}

fn default_title(file_name: &str) -> String {
    let stem = Path::new(file_name.trim())
        .file_stem()
        .map(|s| s.to_string_lossy().replace(['_', '-', '.'], " "))
        .unwrap_or_default();
    if stem.trim().is_empty() {
        UNTITLED_NOTEBOOK.to_string()
    } else {
        stem.trim().to_string()
    }
}

fn validate_url(url: &str) -> PortResult<&str> {
    let url = url.trim();
    let lower = url.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .ok_or_else(|| PortError::InvalidInput(format!("'{}' is not an http(s) URL", url)))?;
    if rest.is_empty() || rest.starts_with('/') || rest.contains(char::is_whitespace) {
        return Err(PortError::InvalidInput(format!("'{}' has no host", url)));
    }
    Ok(url)
}
