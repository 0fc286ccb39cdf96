//! crates/studypod_core/src/chunker.rs
//!
//! Splits extracted text into overlapping windows for embedding.

use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

use crate::config::RagConfig;
use crate::ports::{PortError, PortResult};

/// A span of extracted text, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    /// Byte offset of the chunk inside the source text.
    pub offset: usize,
    pub text: String,
}

/// Splits `text` into chunks of at most `chunk_size` characters that share up to
/// `chunk_overlap` characters with their neighbours. The splitter prefers
/// paragraph, sentence and word boundaries before cutting mid-word, and the same
/// input always produces the same chunks.
pub fn chunk_text(text: &str, config: &RagConfig) -> PortResult<Vec<TextChunk>> {
    if config.chunk_size == 0 || config.chunk_overlap >= config.chunk_size {
        return Err(PortError::InvalidInput(format!(
            "chunk overlap ({}) must be smaller than chunk size ({})",
            config.chunk_overlap, config.chunk_size
        )));
    }

    let chunk_config = ChunkConfig::new(config.chunk_size)
        .with_overlap(config.chunk_overlap)
        .map_err(|e| PortError::InvalidInput(e.to_string()))?;
    let splitter = TextSplitter::new(chunk_config);

    let chunks: Vec<TextChunk> = splitter
        .chunk_indices(text)
        .filter(|(_, chunk)| !chunk.trim().is_empty())
        .enumerate()
        .map(|(index, (offset, chunk))| TextChunk {
            index,
            offset,
            text: chunk.to_string(),
        })
        .collect();

    debug!(
        input_len = text.len(),
        chunk_count = chunks.len(),
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        "Text chunked"
    );

    Ok(chunks)
}
