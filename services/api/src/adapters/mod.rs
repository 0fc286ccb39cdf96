pub mod artifact_store;
pub mod chat_store;
pub mod embedder;
pub mod extractors;
pub mod layout;
pub mod llm;
pub mod notebook_store;
pub mod tts;
pub mod vector_index;

pub use artifact_store::FsArtifactStore;
pub use chat_store::JsonlChatStore;
pub use embedder::FastEmbedAdapter;
pub use extractors::DocumentExtractor;
pub use layout::DataLayout;
pub use llm::OpenAiChatAdapter;
pub use notebook_store::FsNotebookStore;
pub use tts::OpenAiTtsAdapter;
pub use vector_index::SqliteVectorIndex;
