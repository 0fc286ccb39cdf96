//! services/api/src/adapters/embedder.rs
//!
//! Local sentence embeddings (all-MiniLM-L6-v2 through fastembed). The model is
//! downloaded into the cache directory on first use and runs on the blocking pool.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Arc;
use studypod_core::ports::{EmbeddingService, PortError, PortResult};
use tracing::info;

const DIMENSIONS: usize = 384;
const BATCH_SIZE: usize = 32;

#[derive(Clone)]
pub struct FastEmbedAdapter {
    model: Arc<TextEmbedding>,
}

impl FastEmbedAdapter {
    /// Loads the model, which is slow the first time. Call once at startup.
    pub async fn load(cache_dir: PathBuf) -> PortResult<Self> {
        info!(cache_dir = %cache_dir.display(), "Loading embedding model");
        let model = tokio::task::spawn_blocking(move || {
            TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                    .with_cache_dir(cache_dir)
                    .with_show_download_progress(false),
            )
        })
        .await
        .map_err(|e| PortError::Embedding(e.to_string()))?
        .map_err(|e| PortError::Embedding(format!("could not load embedding model: {}", e)))?;

        Ok(Self {
            model: Arc::new(model),
        })
    }

    async fn run(&self, texts: Vec<String>) -> PortResult<Vec<Vec<f32>>> {
        let model = self.model.clone();
        tokio::task::spawn_blocking(move || model.embed(texts, Some(BATCH_SIZE)))
            .await
            .map_err(|e| PortError::Embedding(e.to_string()))?
            .map_err(|e| PortError::Embedding(e.to_string()))
    }
}

#[async_trait]
impl EmbeddingService for FastEmbedAdapter {
    async fn embed(&self, text: &str) -> PortResult<Vec<f32>> {
        self.run(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PortError::Embedding("model returned no vector".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> PortResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run(texts.to_vec()).await
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}
