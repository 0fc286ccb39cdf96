//! In-memory implementations of every port, used by the core unit tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::config::RagConfig;
use crate::domain::{
    ArtifactContent, ArtifactKind, ArtifactRecord, ChatMessage, DocumentChunk, FileType,
    LlmResponse, MessageRole, Notebook, NotebookScope, RetrievedChunk, SourceRef,
};
use crate::ports::{
    ArtifactStore, EmbeddingService, LlmService, NotebookStore, PortError, PortResult,
    TextExtractor, TextStream, TextToSpeechService, VectorIndex,
};
use crate::similarity::cosine_similarity;

pub fn test_config() -> RagConfig {
    RagConfig {
        primary_model: "primary-model".to_string(),
        fallback_model: "fallback-model".to_string(),
        llm_backoff_base: Duration::ZERO,
        llm_backoff_max: Duration::ZERO,
        ..RagConfig::default()
    }
}

pub fn test_scope() -> NotebookScope {
    NotebookScope::new("alice", Uuid::new_v4())
}

//=========================================================================================
// LLM
//=========================================================================================

type Responder = Box<dyn Fn(&[ChatMessage]) -> String + Send + Sync>;

/// Replays scripted results first, then answers through the responder.
pub struct FakeLlm {
    script: Mutex<VecDeque<PortResult<String>>>,
    responder: Responder,
    calls: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl FakeLlm {
    pub fn new() -> Self {
        Self::with_responder(|_| "This is the answer [1].".to_string())
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> String + Send + Sync + 'static,
    {
        Self {
            script: Mutex::new(VecDeque::new()),
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_ok(&self, text: &str) {
        self.script.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn push_err(&self, err: PortError) {
        self.script.lock().unwrap().push_back(Err(err));
    }

    pub fn models_called(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn calls(&self) -> Vec<(String, Vec<ChatMessage>)> {
        self.calls.lock().unwrap().clone()
    }

    fn next(&self, model: &str, messages: &[ChatMessage]) -> PortResult<String> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), messages.to_vec()));
        match self.script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok((self.responder)(messages)),
        }
    }
}

#[async_trait]
impl LlmService for FakeLlm {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> PortResult<LlmResponse> {
        let text = self.next(model, messages)?;
        Ok(LlmResponse {
            text,
            model: model.to_string(),
            usage: None,
            fallback_used: false,
        })
    }

    async fn complete_stream(&self, model: &str, messages: &[ChatMessage]) -> PortResult<TextStream> {
        let text = self.next(model, messages)?;
        let fragments: Vec<PortResult<String>> = text
            .split(' ')
            .enumerate()
            .map(|(i, word)| Ok(if i == 0 { word.to_string() } else { format!(" {}", word) }))
            .collect();
        Ok(Box::pin(futures::stream::iter(fragments)))
    }
}

/// Text of the last user message of a prompt.
pub fn last_user_message(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

//=========================================================================================
// Embeddings
//=========================================================================================

/// Deterministic bag-of-words embedder: every lower-cased word is hashed into
/// one of `dims` buckets, so texts sharing words end up close together.
pub struct HashEmbedder {
    dims: usize,
    fail_next: AtomicUsize,
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            dims: 256,
            fail_next: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_next(&self, times: usize) {
        self.fail_next.store(times, Ordering::SeqCst);
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in word.to_lowercase().bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            v[(hash % self.dims as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl EmbeddingService for HashEmbedder {
    async fn embed(&self, text: &str) -> PortResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(PortError::Embedding("model not loaded".to_string()));
        }
        Ok(self.vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

//=========================================================================================
// Vector index
//=========================================================================================

#[derive(Default)]
pub struct MemoryIndex {
    chunks: Mutex<HashMap<NotebookScope, Vec<DocumentChunk>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self, scope: &NotebookScope) -> Vec<DocumentChunk> {
        self.chunks.lock().unwrap().get(scope).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn replace_source(
        &self,
        scope: &NotebookScope,
        source_id: &str,
        chunks: Vec<DocumentChunk>,
    ) -> PortResult<()> {
        let mut all = self.chunks.lock().unwrap();
        let entry = all.entry(scope.clone()).or_default();
        entry.retain(|c| c.source_id != source_id);
        entry.extend(chunks);
        Ok(())
    }

    async fn query(&self, scope: &NotebookScope, vector: &[f32], k: usize) -> PortResult<Vec<RetrievedChunk>> {
        let all = self.chunks.lock().unwrap();
        let mut hits: Vec<RetrievedChunk> = all
            .get(scope)
            .map(|chunks| {
                chunks
                    .iter()
                    .map(|c| RetrievedChunk {
                        chunk_id: c.chunk_id.clone(),
                        source_id: c.source_id.clone(),
                        source_name: c.source_name.clone(),
                        chunk_index: c.chunk_index,
                        text: c.text.clone(),
                        score: cosine_similarity(vector, &c.embedding),
                    })
                    .collect()
            })
            .unwrap_or_default();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn all_chunks(&self, scope: &NotebookScope) -> PortResult<Vec<RetrievedChunk>> {
        let mut chunks: Vec<RetrievedChunk> = self
            .chunks(scope)
            .into_iter()
            .map(|c| RetrievedChunk {
                chunk_id: c.chunk_id,
                source_id: c.source_id,
                source_name: c.source_name,
                chunk_index: c.chunk_index,
                text: c.text,
                score: 0.0,
            })
            .collect();
        chunks.sort_by(|a, b| {
            a.source_id
                .cmp(&b.source_id)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        Ok(chunks)
    }

    async fn delete_source(&self, scope: &NotebookScope, source_id: &str) -> PortResult<usize> {
        let mut all = self.chunks.lock().unwrap();
        let Some(entry) = all.get_mut(scope) else {
            return Ok(0);
        };
        let before = entry.len();
        entry.retain(|c| c.source_id != source_id);
        Ok(before - entry.len())
    }

    async fn list_sources(&self, scope: &NotebookScope) -> PortResult<Vec<String>> {
        let mut sources: Vec<String> = self
            .chunks(scope)
            .into_iter()
            .map(|c| c.source_id)
            .collect();
        sources.sort();
        sources.dedup();
        Ok(sources)
    }

    async fn count(&self, scope: &NotebookScope) -> PortResult<usize> {
        Ok(self.chunks(scope).len())
    }

    async fn drop_notebook(&self, scope: &NotebookScope) -> PortResult<()> {
        self.chunks.lock().unwrap().remove(scope);
        Ok(())
    }
}

//=========================================================================================
// Notebooks
//=========================================================================================

#[derive(Default)]
pub struct MemoryNotebookStore {
    notebooks: Mutex<HashMap<NotebookScope, Notebook>>,
    pub raw_files: Mutex<HashMap<String, Vec<u8>>>,
    pub extracted: Mutex<HashMap<String, String>>,
}

impl MemoryNotebookStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotebookStore for MemoryNotebookStore {
    async fn create_notebook(&self, username: &str, title: &str) -> PortResult<Notebook> {
        let now = Utc::now();
        let notebook = Notebook {
            id: Uuid::new_v4(),
            owner: username.to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
            sources: Vec::new(),
        };
        self.notebooks
            .lock()
            .unwrap()
            .insert(notebook.scope(), notebook.clone());
        Ok(notebook)
    }

    async fn list_notebooks(&self, username: &str) -> PortResult<Vec<Notebook>> {
        let mut list: Vec<Notebook> = self
            .notebooks
            .lock()
            .unwrap()
            .values()
            .filter(|n| n.owner == username)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn get_notebook(&self, scope: &NotebookScope) -> PortResult<Notebook> {
        self.notebooks
            .lock()
            .unwrap()
            .get(scope)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("notebook {}", scope)))
    }

    async fn delete_notebook(&self, scope: &NotebookScope) -> PortResult<()> {
        self.notebooks
            .lock()
            .unwrap()
            .remove(scope)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(format!("notebook {}", scope)))
    }

    async fn record_source(&self, scope: &NotebookScope, source: SourceRef) -> PortResult<Notebook> {
        let mut notebooks = self.notebooks.lock().unwrap();
        let notebook = notebooks
            .get_mut(scope)
            .ok_or_else(|| PortError::NotFound(format!("notebook {}", scope)))?;
        notebook.sources.retain(|s| s.source_id != source.source_id);
        notebook.sources.push(source);
        notebook.updated_at = Utc::now();
        Ok(notebook.clone())
    }

    async fn remove_source(&self, scope: &NotebookScope, source_id: &str) -> PortResult<Notebook> {
        let mut notebooks = self.notebooks.lock().unwrap();
        let notebook = notebooks
            .get_mut(scope)
            .ok_or_else(|| PortError::NotFound(format!("notebook {}", scope)))?;
        notebook.sources.retain(|s| s.source_id != source_id);
        notebook.updated_at = Utc::now();
        Ok(notebook.clone())
    }

    async fn touch(&self, scope: &NotebookScope) -> PortResult<()> {
        if let Some(notebook) = self.notebooks.lock().unwrap().get_mut(scope) {
            notebook.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn save_raw_file(&self, _scope: &NotebookScope, file_name: &str, data: &[u8]) -> PortResult<()> {
        self.raw_files
            .lock()
            .unwrap()
            .insert(file_name.to_string(), data.to_vec());
        Ok(())
    }

    async fn save_extracted_text(&self, _scope: &NotebookScope, name: &str, text: &str) -> PortResult<()> {
        self.extracted
            .lock()
            .unwrap()
            .insert(name.to_string(), text.to_string());
        Ok(())
    }
}

//=========================================================================================
// Extraction and speech
//=========================================================================================

/// Treats every upload as UTF-8 text; URLs resolve through a fixed page map.
#[derive(Default)]
pub struct FakeExtractor {
    pub pages: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl TextExtractor for FakeExtractor {
    async fn extract(&self, _file_type: FileType, data: &[u8]) -> PortResult<String> {
        Ok(String::from_utf8_lossy(data).into_owned())
    }

    async fn extract_url(&self, url: &str) -> PortResult<String> {
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| PortError::Extraction(format!("could not fetch {}", url)))
    }
}

/// "Synthesises" a segment by echoing its text back as bytes. Segments
/// containing `fail_containing` fail at once; the others take `delay`.
#[derive(Default)]
pub struct FakeTts {
    pub segments: Mutex<Vec<(String, Option<String>)>>,
    pub fail_containing: Option<String>,
    pub delay: Duration,
}

#[async_trait]
impl TextToSpeechService for FakeTts {
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> PortResult<Vec<u8>> {
        if let Some(marker) = &self.fail_containing {
            if text.contains(marker.as_str()) {
                return Err(PortError::Speech("voice rejected the segment".to_string()));
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.segments
            .lock()
            .unwrap()
            .push((text.to_string(), voice.map(str::to_string)));
        Ok(text.as_bytes().to_vec())
    }
}

//=========================================================================================
// Artifacts
//=========================================================================================

#[derive(Default)]
pub struct MemoryArtifactStore {
    items: Mutex<Vec<(NotebookScope, ArtifactRecord, ArtifactContent)>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn save(
        &self,
        scope: &NotebookScope,
        kind: ArtifactKind,
        filename: &str,
        content: ArtifactContent,
        parameters: serde_json::Value,
    ) -> PortResult<ArtifactRecord> {
        let size_bytes = match &content {
            ArtifactContent::Text(text) => text.len() as u64,
            ArtifactContent::Audio(bytes) => bytes.len() as u64,
        };
        let record = ArtifactRecord {
            kind,
            filename: filename.to_string(),
            created_at: Utc::now(),
            size_bytes,
            parameters,
        };
        self.items
            .lock()
            .unwrap()
            .push((scope.clone(), record.clone(), content));
        Ok(record)
    }

    async fn list(&self, scope: &NotebookScope, kind: Option<ArtifactKind>) -> PortResult<Vec<ArtifactRecord>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, r, _)| s == scope && kind.map_or(true, |k| r.kind == k))
            .map(|(_, r, _)| r.clone())
            .collect())
    }

    async fn get_text(&self, scope: &NotebookScope, kind: ArtifactKind, filename: &str) -> PortResult<String> {
        match self.get_bytes(scope, kind, filename).await {
            Ok(bytes) => String::from_utf8(bytes).map_err(|e| PortError::Storage(e.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn get_bytes(&self, scope: &NotebookScope, kind: ArtifactKind, filename: &str) -> PortResult<Vec<u8>> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|(s, r, _)| s == scope && r.kind == kind && r.filename == filename)
            .map(|(_, _, content)| match content {
                ArtifactContent::Text(text) => text.as_bytes().to_vec(),
                ArtifactContent::Audio(bytes) => bytes.clone(),
            })
            .ok_or_else(|| PortError::NotFound(filename.to_string()))
    }

    async fn delete(&self, scope: &NotebookScope, kind: ArtifactKind, filename: &str) -> PortResult<bool> {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|(s, r, _)| !(s == scope && r.kind == kind && r.filename == filename));
        Ok(items.len() != before)
    }
}
