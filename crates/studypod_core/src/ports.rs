//! crates/studypod_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the vector database, the LLM provider, the speech engine
//! and the on-disk layout.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::domain::{
    ArtifactContent, ArtifactKind, ArtifactRecord, ChatMessage, ChatTurn, DocumentChunk,
    FileType, LlmResponse, Notebook, NotebookScope, RetrievedChunk, SourceRef,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
///
/// The variants mirror the failure taxonomy the rest of the application reacts to:
/// transient LLM failures are retried, fatal ones are surfaced immediately.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Text extraction failed: {0}")]
    Extraction(String),
    #[error("Embedding failed: {0}")]
    Embedding(String),
    #[error("Rate limited by the LLM provider: {0}")]
    RateLimited(String),
    #[error("LLM request timed out: {0}")]
    Timeout(String),
    #[error("LLM provider error: {0}")]
    ServerError(String),
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("All language models are unavailable: {0}")]
    LlmUnavailable(String),
    #[error("LLM request rejected: {0}")]
    LlmFatal(String),
    #[error("Speech synthesis failed: {0}")]
    Speech(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// Whether an LLM call that failed with this error is worth repeating.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::RateLimited(_) | PortError::Timeout(_) | PortError::ServerError(_)
        )
    }
}

impl From<std::io::Error> for PortError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => PortError::NotFound(e.to_string()),
            _ => PortError::Storage(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for PortError {
    fn from(e: serde_json::Error) -> Self {
        PortError::Storage(format!("JSON encoding error: {}", e))
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// An incremental sequence of text fragments produced by a streaming LLM call.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, PortError>> + Send>>;

//=========================================================================================
// Model Ports (Traits)
//=========================================================================================

/// A hosted chat-completion model.
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Runs one completion against `model` and returns the full text.
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> PortResult<LlmResponse>;

    /// Opens a streaming completion against `model`.
    async fn complete_stream(&self, model: &str, messages: &[ChatMessage]) -> PortResult<TextStream>;
}

/// Maps text to a fixed-length vector. Identical input gives identical output.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> PortResult<Vec<f32>>;

    /// Embeds several texts. Default implementation calls `embed` sequentially.
    async fn embed_batch(&self, texts: &[String]) -> PortResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize;
}

#[async_trait]
pub trait TextToSpeechService: Send + Sync {
    /// Generates audio data from a string of text in the given voice
    /// (`None` picks the adapter's configured default).
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> PortResult<Vec<u8>>;
}

/// Per-file-type conversion of raw uploads into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, file_type: FileType, data: &[u8]) -> PortResult<String>;

    /// Fetches a web page and returns its main textual content.
    async fn extract_url(&self, url: &str) -> PortResult<String>;
}

//=========================================================================================
// Storage Ports (Traits)
//=========================================================================================

/// Nearest-neighbour index over a notebook's chunks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Replaces every chunk of `source_id` with `chunks` as one unit.
    async fn replace_source(
        &self,
        scope: &NotebookScope,
        source_id: &str,
        chunks: Vec<DocumentChunk>,
    ) -> PortResult<()>;

    /// Returns up to `k` chunks ordered by descending similarity.
    async fn query(
        &self,
        scope: &NotebookScope,
        vector: &[f32],
        k: usize,
    ) -> PortResult<Vec<RetrievedChunk>>;

    /// Every chunk of the notebook, ordered by source and chunk index.
    /// `score` carries no meaning here and is left at 0.
    async fn all_chunks(&self, scope: &NotebookScope) -> PortResult<Vec<RetrievedChunk>>;

    /// Removes a source's chunks, returning how many were deleted.
    async fn delete_source(&self, scope: &NotebookScope, source_id: &str) -> PortResult<usize>;

    async fn list_sources(&self, scope: &NotebookScope) -> PortResult<Vec<String>>;

    async fn count(&self, scope: &NotebookScope) -> PortResult<usize>;

    /// Drops the whole index of a notebook. Dropping a missing index is not an error.
    async fn drop_notebook(&self, scope: &NotebookScope) -> PortResult<()>;
}

#[async_trait]
pub trait NotebookStore: Send + Sync {
    async fn create_notebook(&self, username: &str, title: &str) -> PortResult<Notebook>;

    /// All of a user's notebooks, newest first.
    async fn list_notebooks(&self, username: &str) -> PortResult<Vec<Notebook>>;

    async fn get_notebook(&self, scope: &NotebookScope) -> PortResult<Notebook>;

    /// Deletes the notebook and everything stored beneath it.
    async fn delete_notebook(&self, scope: &NotebookScope) -> PortResult<()>;

    /// Adds or replaces a source entry and bumps `updated_at`.
    async fn record_source(&self, scope: &NotebookScope, source: SourceRef) -> PortResult<Notebook>;

    async fn remove_source(&self, scope: &NotebookScope, source_id: &str) -> PortResult<Notebook>;

    /// Bumps `updated_at`.
    async fn touch(&self, scope: &NotebookScope) -> PortResult<()>;

    async fn save_raw_file(&self, scope: &NotebookScope, file_name: &str, data: &[u8]) -> PortResult<()>;

    async fn save_extracted_text(&self, scope: &NotebookScope, name: &str, text: &str) -> PortResult<()>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Appends a turn; the store stamps it with the current time.
    async fn append(&self, scope: &NotebookScope, turn: ChatTurn) -> PortResult<ChatTurn>;

    async fn history(&self, scope: &NotebookScope) -> PortResult<Vec<ChatTurn>>;

    /// The last `window` turns, oldest first.
    async fn recent(&self, scope: &NotebookScope, window: usize) -> PortResult<Vec<ChatTurn>> {
        let history = self.history(scope).await?;
        let skip = history.len().saturating_sub(window);
        Ok(history.into_iter().skip(skip).collect())
    }

    /// Empties the log and returns how many turns were removed.
    async fn clear(&self, scope: &NotebookScope) -> PortResult<usize>;
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn save(
        &self,
        scope: &NotebookScope,
        kind: ArtifactKind,
        filename: &str,
        content: ArtifactContent,
        parameters: serde_json::Value,
    ) -> PortResult<ArtifactRecord>;

    async fn list(&self, scope: &NotebookScope, kind: Option<ArtifactKind>) -> PortResult<Vec<ArtifactRecord>>;

    async fn get_text(&self, scope: &NotebookScope, kind: ArtifactKind, filename: &str) -> PortResult<String>;

    async fn get_bytes(&self, scope: &NotebookScope, kind: ArtifactKind, filename: &str) -> PortResult<Vec<u8>>;

    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, scope: &NotebookScope, kind: ArtifactKind, filename: &str) -> PortResult<bool>;
}
