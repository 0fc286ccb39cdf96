//! crates/studypod_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs know nothing about the file layout or the wire format they are
//! eventually persisted in; serde derives exist so adapters can pick a format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Scoping
//=========================================================================================

/// Every entity lives inside exactly one `(username, notebook)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotebookScope {
    pub username: String,
    pub notebook_id: Uuid,
}

impl NotebookScope {
    pub fn new(username: impl Into<String>, notebook_id: Uuid) -> Self {
        Self {
            username: username.into(),
            notebook_id,
        }
    }
}

impl fmt::Display for NotebookScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.username, self.notebook_id)
    }
}

//=========================================================================================
// Notebooks and Sources
//=========================================================================================

/// The top-level container for a user's documents, chat and artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    pub id: Uuid,
    pub owner: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

impl Notebook {
    pub fn scope(&self) -> NotebookScope {
        NotebookScope::new(self.owner.clone(), self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    File,
    Url,
}

/// A document that has been ingested into a notebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Sanitised file name for uploads, the URL itself for web pages.
    pub source_id: String,
    pub name: String,
    pub kind: SourceKind,
    pub chunk_count: usize,
    pub extracted_chars: usize,
    pub added_at: DateTime<Utc>,
}

/// File types accepted by the upload path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    Pptx,
    Txt,
}

impl FileType {
    /// Resolves the file type from a file name's extension (case-insensitive).
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "pptx" => Some(Self::Pptx),
            "txt" => Some(Self::Txt),
            _ => None,
        }
    }
}

//=========================================================================================
// Chunks and Retrieval
//=========================================================================================

/// A chunk of extracted text together with its embedding, ready for the index.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub source_id: String,
    pub source_name: String,
    pub chunk_index: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

impl DocumentChunk {
    /// Chunk ids are derived from the source so re-ingestion overwrites them.
    pub fn make_id(source_id: &str, chunk_index: usize) -> String {
        format!("{}#{}", source_id, chunk_index)
    }
}

/// A chunk returned by a nearest-neighbour lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub source_id: String,
    pub source_name: String,
    pub chunk_index: usize,
    pub text: String,
    /// Cosine similarity against the query vector, higher is closer.
    pub score: f32,
}

/// A passage the assistant was shown when it answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    pub source_name: String,
    pub chunk_index: usize,
    pub chunk_text: String,
    /// Similarity mapped into `[0, 1]`.
    pub relevance_score: f32,
    /// Whether the answer text carries this passage's `[n]` marker.
    #[serde(default)]
    pub referenced: bool,
}

impl From<&RetrievedChunk> for Citation {
    fn from(chunk: &RetrievedChunk) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            source_name: chunk.source_name.clone(),
            chunk_index: chunk.chunk_index,
            chunk_text: chunk.text.clone(),
            relevance_score: chunk.score.clamp(0.0, 1.0),
            referenced: false,
        }
    }
}

/// The four ways the engine can pick context passages for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    #[default]
    Naive,
    Hyde,
    Reranking,
    MultiQuery,
}

impl RetrievalStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::Hyde => "hyde",
            Self::Reranking => "reranking",
            Self::MultiQuery => "multi_query",
        }
    }

    /// Parses a strategy name; anything unrecognised means `Naive`.
    pub fn parse_lenient(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }
}

impl FromStr for RetrievalStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "naive" => Ok(Self::Naive),
            "hyde" => Ok(Self::Hyde),
            "reranking" | "rerank" => Ok(Self::Reranking),
            "multi_query" | "multiquery" => Ok(Self::MultiQuery),
            other => Err(format!("unknown retrieval strategy '{}'", other)),
        }
    }
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//=========================================================================================
// Chat
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Wall-clock measurements for one answered question.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TurnTiming {
    pub retrieval_ms: f64,
    pub generation_ms: f64,
    pub total_ms: f64,
}

/// A single message in a notebook's chat log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<RetrievalStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<TurnTiming>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            citations: Vec::new(),
            strategy: None,
            model: None,
            timing: None,
        }
    }

    pub fn assistant(content: impl Into<String>, citations: Vec<Citation>) -> Self {
        Self {
            role: ChatRole::Assistant,
            citations,
            ..Self::user(content)
        }
    }
}

//=========================================================================================
// LLM Messages
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One message of a chat-completion prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&ChatTurn> for ChatMessage {
    fn from(turn: &ChatTurn) -> Self {
        match turn.role {
            ChatRole::User => Self::user(turn.content.clone()),
            ChatRole::Assistant => Self::assistant(turn.content.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete (non-streamed) LLM answer.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub text: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub fallback_used: bool,
}

//=========================================================================================
// Artifacts
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Report,
    Quiz,
    Podcast,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [Self::Report, Self::Quiz, Self::Podcast];

    /// Name of the sub-directory the artifact lives in.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Report => "reports",
            Self::Quiz => "quizzes",
            Self::Podcast => "podcasts",
        }
    }

    /// File extensions an artifact of this kind may be stored under.
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Report | Self::Quiz => &["md"],
            Self::Podcast => &["md", "mp3"],
        }
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "report" | "reports" => Ok(Self::Report),
            "quiz" | "quizzes" => Ok(Self::Quiz),
            "podcast" | "podcasts" => Ok(Self::Podcast),
            other => Err(format!("unknown artifact type '{}'", other)),
        }
    }
}

/// Metadata describing a stored artifact file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub kind: ArtifactKind,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Payload handed to the artifact store.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactContent {
    Text(String),
    Audio(Vec<u8>),
}
