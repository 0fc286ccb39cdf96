//! crates/studypod_core/src/config.rs
//!
//! The immutable settings shared by every core component. Built once at startup
//! (see the api service's `Config::from_env`) and passed around as `Arc<RagConfig>`.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RagConfig {
    // --- Chunking ---
    /// Window size in characters.
    pub chunk_size: usize,
    /// Characters shared by neighbouring chunks.
    pub chunk_overlap: usize,

    // --- Retrieval ---
    pub top_k: usize,
    /// Reranking pulls `top_k * rerank_candidate_factor` candidates before scoring.
    pub rerank_candidate_factor: usize,
    /// Paraphrases requested by the multi-query strategy.
    pub multi_query_variants: usize,
    /// Chat turns replayed to the model with each question.
    pub history_window: usize,
    /// Characters of notebook text one artifact prompt may carry. Larger
    /// notebooks are condensed batch by batch until they fit.
    pub artifact_context_chars: usize,

    // --- LLM ---
    pub primary_model: String,
    pub fallback_model: String,
    /// Retries after the first failed attempt, per model.
    pub llm_max_retries: u32,
    pub llm_backoff_base: Duration,
    pub llm_backoff_max: Duration,

    // --- Ingestion ---
    pub max_upload_bytes: u64,

    // --- Speech ---
    pub podcast_voice: Option<String>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 5,
            rerank_candidate_factor: 2,
            multi_query_variants: 3,
            history_window: 6,
            artifact_context_chars: 24_000,
            primary_model: "llama-3.1-70b-versatile".to_string(),
            fallback_model: "llama-3.1-8b-instant".to_string(),
            llm_max_retries: 3,
            llm_backoff_base: Duration::from_millis(500),
            llm_backoff_max: Duration::from_secs(8),
            max_upload_bytes: 50 * 1024 * 1024,
            podcast_voice: None,
        }
    }
}

impl RagConfig {
    /// Delay before retry number `attempt` (1-based): base, 2x base, 4x base ... capped.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.llm_backoff_base
            .saturating_mul(factor)
            .min(self.llm_backoff_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let config = RagConfig {
            llm_backoff_base: Duration::from_millis(100),
            llm_backoff_max: Duration::from_millis(350),
            ..RagConfig::default()
        };
        assert_eq!(config.backoff_for(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for(2), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(350));
        assert_eq!(config.backoff_for(30), Duration::from_millis(350));
    }
}
