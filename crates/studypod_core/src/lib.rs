pub mod artifacts;
pub mod chunker;
pub mod config;
pub mod domain;
pub mod ingestion;
pub mod llm;
pub mod ports;
pub mod rag;
pub mod security;
pub mod similarity;

#[cfg(test)]
pub(crate) mod testing;

pub use artifacts::{ArtifactGenerator, GeneratedArtifact};
pub use config::RagConfig;
pub use domain::{
    ArtifactContent, ArtifactKind, ArtifactRecord, ChatRole, ChatTurn, Citation, Notebook,
    NotebookScope, RetrievalStrategy, SourceKind, SourceRef, TurnTiming,
};
pub use ingestion::{IngestReport, IngestionPipeline};
pub use llm::LlmClient;
pub use ports::{
    ArtifactStore, ChatStore, EmbeddingService, LlmService, NotebookStore, PortError, PortResult,
    TextExtractor, TextToSpeechService, VectorIndex,
};
pub use rag::{RagAnswer, RagEngine, RagStream};
