//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-connection chat session.

use crate::config::Config;
use crate::error::ApiError;
use std::sync::Arc;
use studypod_core::domain::{Notebook, NotebookScope};
use studypod_core::ports::{
    ArtifactStore, ChatStore, EmbeddingService, LlmService, NotebookStore, TextExtractor,
    TextToSpeechService, VectorIndex,
};
use studypod_core::{ArtifactGenerator, IngestionPipeline, LlmClient, RagEngine};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

//=========================================================================================
// Services (the adapters chosen at startup)
//=========================================================================================

/// One implementation per port. `tts` is absent when no speech key is configured.
pub struct Services {
    pub llm: Arc<dyn LlmService>,
    pub embedder: Arc<dyn EmbeddingService>,
    pub extractor: Arc<dyn TextExtractor>,
    pub tts: Option<Arc<dyn TextToSpeechService>>,
    pub index: Arc<dyn VectorIndex>,
    pub notebooks: Arc<dyn NotebookStore>,
    pub chats: Arc<dyn ChatStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
}

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub notebooks: Arc<dyn NotebookStore>,
    pub chats: Arc<dyn ChatStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub index: Arc<dyn VectorIndex>,
    pub engine: RagEngine,
    pub pipeline: IngestionPipeline,
    pub generator: ArtifactGenerator,
}

impl AppState {
    /// Wires the core components on top of the given adapters.
    pub fn new(config: Arc<Config>, services: Services) -> Self {
        let rag = config.rag.clone();
        let llm = LlmClient::new(services.llm, rag.clone());
        let engine = RagEngine::new(services.index.clone(), services.embedder.clone(), llm, rag.clone());
        let pipeline = IngestionPipeline::new(
            services.extractor,
            services.embedder,
            services.index.clone(),
            services.notebooks.clone(),
            rag.clone(),
        );
        let generator = ArtifactGenerator::new(engine.clone(), services.artifacts.clone(), services.tts, rag);

        Self {
            config,
            notebooks: services.notebooks,
            chats: services.chats,
            artifacts: services.artifacts,
            index: services.index,
            engine,
            pipeline,
            generator,
        }
    }

    /// Resolves a notebook owned by `username`, failing with 404 otherwise.
    pub async fn notebook(&self, username: &str, notebook_id: Uuid) -> Result<Notebook, ApiError> {
        let scope = NotebookScope::new(username, notebook_id);
        Ok(self.notebooks.get_notebook(&scope).await?)
    }
}

//=========================================================================================
// ChatSession (Specific to One WebSocket Connection)
//=========================================================================================

/// The state of a single streaming-chat connection.
pub struct ChatSession {
    pub scope: NotebookScope,
    /// Cancels the answer currently being streamed, if any.
    pub cancellation_token: CancellationToken,
    pub answer_task: Option<JoinHandle<()>>,
}

impl ChatSession {
    pub fn new(scope: NotebookScope) -> Self {
        Self {
            scope,
            cancellation_token: CancellationToken::new(),
            answer_task: None,
        }
    }

    /// Whether an answer is still being generated.
    pub fn is_answering(&self) -> bool {
        self.answer_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Cancels the running answer and hands out a fresh token for the next one.
    pub fn reset_token(&mut self) -> CancellationToken {
        self.cancellation_token.cancel();
        self.cancellation_token = CancellationToken::new();
        self.cancellation_token.clone()
    }
}
