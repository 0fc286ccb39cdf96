//! crates/studypod_core/src/rag.rs
//!
//! The retrieval-augmented query engine. Every strategy converges on an ordered
//! list of passages which is turned into a single grounded prompt.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::RagConfig;
use crate::domain::{ChatMessage, ChatTurn, Citation, NotebookScope, RetrievalStrategy, RetrievedChunk};
use crate::llm::LlmClient;
use crate::ports::{EmbeddingService, PortError, PortResult, TextStream, VectorIndex};

const SYSTEM_INSTRUCTIONS: &str = "You are StudyPod, a study assistant. Answer the user's question \
using only the numbered context passages provided. Cite the passages you rely on inline with \
their numbers in square brackets, for example [1] or [2][3]. If the passages do not contain the \
answer, say so plainly instead of guessing.";

const NO_CONTEXT_NOTICE: &str = "No context found: the notebook's sources contain no passages \
relevant to this question. Tell the user their documents do not cover it and do not invent citations.";

/// A complete answer with the passages it was grounded on.
#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub strategy: RetrievalStrategy,
    pub chunks_considered: usize,
    pub model: String,
    pub fallback_used: bool,
    pub retrieval_ms: f64,
    pub generation_ms: f64,
}

/// A streamed answer. Citations are known before the first fragment arrives;
/// their `referenced` flags are filled in by `mark_referenced` once the text is complete.
pub struct RagStream {
    pub citations: Vec<Citation>,
    pub strategy: RetrievalStrategy,
    pub model: String,
    pub fallback_used: bool,
    pub retrieval_ms: f64,
    pub fragments: TextStream,
}

#[derive(Clone)]
pub struct RagEngine {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingService>,
    llm: LlmClient,
    config: Arc<RagConfig>,
}

impl RagEngine {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingService>,
        llm: LlmClient,
        config: Arc<RagConfig>,
    ) -> Self {
        Self {
            index,
            embedder,
            llm,
            config,
        }
    }

    pub fn llm(&self) -> &LlmClient {
        &self.llm
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Answers `question` in one piece.
    #[instrument(skip_all, fields(scope = %scope, strategy = %strategy))]
    pub async fn answer(
        &self,
        scope: &NotebookScope,
        question: &str,
        strategy: RetrievalStrategy,
        history: &[ChatTurn],
    ) -> PortResult<RagAnswer> {
        let question = validate_question(question)?;

        let started = Instant::now();
        let chunks = self.retrieve(scope, question, strategy, self.config.top_k).await?;
        let retrieval_ms = elapsed_ms(started);

        let prompt = self.build_prompt(question, &chunks, history);
        let started = Instant::now();
        let response = self.llm.complete(&prompt).await?;
        let generation_ms = elapsed_ms(started);

        let mut citations: Vec<Citation> = chunks.iter().map(Citation::from).collect();
        mark_referenced(&mut citations, &response.text);

        info!(
            chunks = chunks.len(),
            model = %response.model,
            fallback_used = response.fallback_used,
            retrieval_ms,
            generation_ms,
            "Question answered"
        );

        Ok(RagAnswer {
            answer: response.text,
            citations,
            strategy,
            chunks_considered: chunks.len(),
            model: response.model,
            fallback_used: response.fallback_used,
            retrieval_ms,
            generation_ms,
        })
    }

    /// Retrieves context, then opens a streaming completion. Dropping the
    /// returned stream abandons the generation.
    #[instrument(skip_all, fields(scope = %scope, strategy = %strategy))]
    pub async fn answer_stream(
        &self,
        scope: &NotebookScope,
        question: &str,
        strategy: RetrievalStrategy,
        history: &[ChatTurn],
    ) -> PortResult<RagStream> {
        let question = validate_question(question)?;

        let started = Instant::now();
        let chunks = self.retrieve(scope, question, strategy, self.config.top_k).await?;
        let retrieval_ms = elapsed_ms(started);

        let prompt = self.build_prompt(question, &chunks, history);
        let stream = self.llm.stream(&prompt).await?;

        Ok(RagStream {
            citations: chunks.iter().map(Citation::from).collect(),
            strategy,
            model: stream.model,
            fallback_used: stream.fallback_used,
            retrieval_ms,
            fragments: stream.fragments,
        })
    }

    /// Picks up to `k` passages for `query` with the given strategy.
    pub async fn retrieve(
        &self,
        scope: &NotebookScope,
        query: &str,
        strategy: RetrievalStrategy,
        k: usize,
    ) -> PortResult<Vec<RetrievedChunk>> {
        if k == 0 || self.index.count(scope).await? == 0 {
            debug!(scope = %scope, "Index empty, skipping retrieval");
            return Ok(Vec::new());
        }

        let chunks = match strategy {
            RetrievalStrategy::Naive => self.retrieve_naive(scope, query, k).await?,
            RetrievalStrategy::Hyde => self.retrieve_hyde(scope, query, k).await?,
            RetrievalStrategy::Reranking => self.retrieve_reranked(scope, query, k).await?,
            RetrievalStrategy::MultiQuery => self.retrieve_multi_query(scope, query, k).await?,
        };
        debug!(strategy = %strategy, retrieved = chunks.len(), "Retrieval finished");
        Ok(chunks)
    }

    async fn retrieve_naive(&self, scope: &NotebookScope, query: &str, k: usize) -> PortResult<Vec<RetrievedChunk>> {
        let vector = self.embedder.embed(query).await?;
        self.index.query(scope, &vector, k).await
    }

    /// Embeds a hypothetical answer instead of the question itself.
    async fn retrieve_hyde(&self, scope: &NotebookScope, query: &str, k: usize) -> PortResult<Vec<RetrievedChunk>> {
        let prompt = [
            ChatMessage::system(
                "Write a short, factual passage (one paragraph) that would answer the question \
                 as if it were taken from a textbook. Reply with the passage only.",
            ),
            ChatMessage::user(query),
        ];

        let hypothetical = match self.llm.complete(&prompt).await {
            Ok(response) if !response.text.trim().is_empty() => response.text,
            Ok(_) => {
                warn!("Hypothetical passage was empty, using the question");
                query.to_string()
            }
            Err(e) => {
                warn!(error = %e, "Hypothetical passage generation failed, using the question");
                query.to_string()
            }
        };

        let vector = self.embedder.embed(&hypothetical).await?;
        self.index.query(scope, &vector, k).await
    }

    /// Over-fetches by similarity, then lets the LLM score relevance.
    async fn retrieve_reranked(&self, scope: &NotebookScope, query: &str, k: usize) -> PortResult<Vec<RetrievedChunk>> {
        let pool = k * self.config.rerank_candidate_factor.max(1);
        let mut candidates = self.retrieve_naive(scope, query, pool).await?;
        if candidates.len() <= 1 {
            return Ok(candidates);
        }

        let mut listing = String::new();
        for (i, chunk) in candidates.iter().enumerate() {
            listing.push_str(&format!("[{}] {}\n\n", i + 1, chunk.text));
        }
        let prompt = [
            ChatMessage::system(format!(
                "Rate how relevant each numbered passage is to the question on a scale from 0 \
                 (irrelevant) to 10 (directly answers it). Reply with only a JSON array of {} \
                 numbers, one per passage, in passage order.",
                candidates.len()
            )),
            ChatMessage::user(format!("Question: {}\n\nPassages:\n\n{}", query, listing)),
        ];

        let scores = match self.llm.complete(&prompt).await {
            Ok(response) => parse_scores(&response.text, candidates.len()),
            Err(e) => {
                warn!(error = %e, "Reranking call failed, keeping similarity order");
                None
            }
        };

        match scores {
            Some(scores) => {
                let mut scored: Vec<(f32, RetrievedChunk)> = scores.into_iter().zip(candidates).collect();
                // Stable, so equal scores keep their similarity order.
                scored.sort_by(|a, b| b.0.total_cmp(&a.0));
                candidates = scored.into_iter().map(|(_, chunk)| chunk).collect();
            }
            None => warn!("Could not read relevance scores, keeping similarity order"),
        }

        candidates.truncate(k);
        Ok(candidates)
    }

    /// Retrieves for the question and for LLM paraphrases of it, merging by chunk.
    async fn retrieve_multi_query(&self, scope: &NotebookScope, query: &str, k: usize) -> PortResult<Vec<RetrievedChunk>> {
        let wanted = self.config.multi_query_variants;
        let prompt = [
            ChatMessage::system(format!(
                "Rewrite the user's question in {} different ways that could match different \
                 wordings in the source documents. Reply with only a JSON array of strings.",
                wanted
            )),
            ChatMessage::user(query),
        ];

        let mut queries = vec![query.to_string()];
        match self.llm.complete(&prompt).await {
            Ok(response) => {
                for variant in parse_variants(&response.text).into_iter().take(wanted) {
                    if !queries.iter().any(|q| q.eq_ignore_ascii_case(&variant)) {
                        queries.push(variant);
                    }
                }
            }
            Err(e) => warn!(error = %e, "Query variant generation failed, using the question only"),
        }
        debug!(queries = queries.len(), "Multi-query variants ready");

        let mut best: HashMap<String, RetrievedChunk> = HashMap::new();
        for q in &queries {
            for chunk in self.retrieve_naive(scope, q, k).await? {
                match best.get(&chunk.chunk_id) {
                    Some(existing) if existing.score >= chunk.score => {}
                    _ => {
                        best.insert(chunk.chunk_id.clone(), chunk);
                    }
                }
            }
        }

        let mut merged: Vec<RetrievedChunk> = best.into_values().collect();
        merged.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
        merged.truncate(k);
        Ok(merged)
    }

    /// System instructions and numbered passages, then the recent conversation,
    /// then the question.
    pub fn build_prompt(&self, question: &str, chunks: &[RetrievedChunk], history: &[ChatTurn]) -> Vec<ChatMessage> {
        let mut system = String::from(SYSTEM_INSTRUCTIONS);
        system.push_str("\n\n");
        if chunks.is_empty() {
            system.push_str(NO_CONTEXT_NOTICE);
        } else {
            system.push_str("Context passages:\n");
            for (i, chunk) in chunks.iter().enumerate() {
                system.push_str(&format!(
                    "\n[{}] (source: {}, chunk {})\n{}\n",
                    i + 1,
                    chunk.source_name,
                    chunk.chunk_index,
                    chunk.text
                ));
            }
        }

        let skip = history.len().saturating_sub(self.config.history_window);
        let mut messages = Vec::with_capacity(history.len() - skip + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(history.iter().skip(skip).map(ChatMessage::from));
        messages.push(ChatMessage::user(question));
        messages
    }
}

fn validate_question(question: &str) -> PortResult<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(PortError::InvalidInput("question must not be empty".to_string()));
    }
    Ok(trimmed)
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[(\d+(?:\s*,\s*\d+)*)\]").expect("citation marker pattern is valid"))
}

/// Sets `referenced` on every citation whose `[n]` marker appears in `answer`.
/// Markers are 1-based positions in the citation list.
pub fn mark_referenced(citations: &mut [Citation], answer: &str) {
    for caps in marker_pattern().captures_iter(answer) {
        for number in caps[1].split(',') {
            if let Ok(n) = number.trim().parse::<usize>() {
                if let Some(citation) = n.checked_sub(1).and_then(|i| citations.get_mut(i)) {
                    citation.referenced = true;
                }
            }
        }
    }
}

/// The outermost JSON array in a model reply, if any.
fn json_array_slice(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_scores(text: &str, expected: usize) -> Option<Vec<f32>> {
    let scores: Vec<f32> = serde_json::from_str(json_array_slice(text)?).ok()?;
    (scores.len() == expected && scores.iter().all(|s| s.is_finite())).then_some(scores)
}

fn parse_variants(text: &str) -> Vec<String> {
    let from_json = json_array_slice(text).and_then(|slice| serde_json::from_str::<Vec<String>>(slice).ok());
    let variants = match from_json {
        Some(list) => list,
        None => text
            .lines()
            .map(|line| {
                line.trim()
                    .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*'))
                    .trim()
                    .trim_matches('"')
                    .to_string()
            })
            .collect(),
    };
    variants
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DocumentChunk, MessageRole};
    use crate::testing::{last_user_message, test_config, test_scope, FakeLlm, HashEmbedder, MemoryIndex};
    use futures::StreamExt;
    use std::collections::HashSet;

    struct Fixture {
        engine: RagEngine,
        llm: Arc<FakeLlm>,
        index: Arc<MemoryIndex>,
        scope: NotebookScope,
    }

    async fn fixture(llm: FakeLlm, k: usize, texts: &[&str]) -> Fixture {
        let config = Arc::new(RagConfig {
            top_k: k,
            ..test_config()
        });
        let llm = Arc::new(llm);
        let index = Arc::new(MemoryIndex::new());
        let embedder = Arc::new(HashEmbedder::new());
        let scope = test_scope();

        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, text)| DocumentChunk {
                chunk_id: DocumentChunk::make_id("demo.txt", i),
                source_id: "demo.txt".to_string(),
                source_name: "demo.txt".to_string(),
                chunk_index: i,
                text: text.to_string(),
                embedding: embedder.vector(text),
            })
            .collect();
        index.replace_source(&scope, "demo.txt", chunks).await.unwrap();

        let engine = RagEngine::new(
            index.clone(),
            embedder,
            LlmClient::new(llm.clone(), config.clone()),
            config,
        );
        Fixture { engine, llm, index, scope }
    }

    const DEMO: [&str; 3] = [
        "Photosynthesis converts sunlight water and carbon dioxide into glucose in plant leaves.",
        "Chlorophyll in the leaves absorbs sunlight, powering photosynthesis.",
        "The French Revolution began in 1789 with the storming of the Bastille.",
    ];

    /// Answers strategy prompts sensibly and everything else with a cited answer.
    fn smart_llm() -> FakeLlm {
        FakeLlm::with_responder(|messages| {
            let system = &messages[0].content;
            if system.starts_with("Write a short, factual passage") {
                "Photosynthesis in plant leaves uses sunlight and chlorophyll.".to_string()
            } else if system.starts_with("Rate how relevant") {
                let passages = last_user_message(messages).matches("\n[").count();
                let scores: Vec<String> = (0..passages).map(|i| i.to_string()).collect();
                format!("[{}]", scores.join(", "))
            } else if system.starts_with("Rewrite the user's question") {
                r#"["How do leaves use sunlight?", "What does chlorophyll do?", "What is photosynthesis?"]"#
                    .to_string()
            } else {
                "Plants make glucose from sunlight [1], using chlorophyll [2].".to_string()
            }
        })
    }

    #[tokio::test]
    async fn demo_naive_answer_cites_both_passages_verbatim() {
        let f = fixture(smart_llm(), 2, &DEMO).await;
        let answer = f
            .engine
            .answer(&f.scope, "How does photosynthesis use sunlight?", RetrievalStrategy::Naive, &[])
            .await
            .unwrap();

        assert_eq!(answer.citations.len(), 2);
        assert!(answer.citations.iter().all(|c| c.source_name == "demo.txt"));
        assert!(answer.citations.iter().all(|c| c.referenced));
        assert_eq!(answer.chunks_considered, 2);

        let calls = f.llm.calls();
        let system = &calls.last().unwrap().1[0].content;
        for citation in &answer.citations {
            assert!(system.contains(&citation.chunk_text));
        }
        assert!(!system.contains("Bastille"));
    }

    #[tokio::test]
    async fn main_topic_question_cites_two_chunks_of_the_demo_document() {
        let f = fixture(smart_llm(), 2, &DEMO).await;
        let answer = f
            .engine
            .answer(&f.scope, "What is the main topic?", RetrievalStrategy::Naive, &[])
            .await
            .unwrap();

        assert_eq!(answer.citations.len(), 2);
        assert!(answer.citations.iter().all(|c| c.source_name == "demo.txt"));
        let ids: HashSet<&str> = answer.citations.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(answer.citations.iter().all(|c| DEMO.contains(&c.chunk_text.as_str())));

        let calls = f.llm.calls();
        let system = &calls.last().unwrap().1[0].content;
        for citation in &answer.citations {
            assert!(system.contains(&citation.chunk_text));
        }
    }

    #[tokio::test]
    async fn hyde_returns_passages_for_populated_notebook() {
        let f = fixture(smart_llm(), 2, &DEMO).await;
        let chunks = f
            .engine
            .retrieve(&f.scope, "Why are leaves green?", RetrievalStrategy::Hyde, 2)
            .await
            .unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks[0].text.contains("hlorophyll") || chunks[0].text.contains("Photosynthesis"));
    }

    #[tokio::test]
    async fn hyde_falls_back_to_question_when_generation_fails() {
        let llm = FakeLlm::new();
        llm.push_err(PortError::LlmFatal("bad request".into()));
        let f = fixture(llm, 2, &DEMO).await;
        let chunks = f
            .engine
            .retrieve(&f.scope, "storming of the Bastille", RetrievalStrategy::Hyde, 1)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("Bastille"));
    }

    #[tokio::test]
    async fn empty_index_still_answers_with_no_context_notice() {
        let f = fixture(smart_llm(), 2, &[]).await;
        for strategy in [RetrievalStrategy::Naive, RetrievalStrategy::Hyde] {
            let chunks = f.engine.retrieve(&f.scope, "anything?", strategy, 2).await.unwrap();
            assert!(chunks.is_empty());
        }

        let answer = f
            .engine
            .answer(&f.scope, "What is in my notes?", RetrievalStrategy::Naive, &[])
            .await
            .unwrap();
        assert!(answer.citations.is_empty());
        let calls = f.llm.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1[0].content.contains("No context found"));
    }

    #[tokio::test]
    async fn reranking_reorders_by_llm_score() {
        let f = fixture(smart_llm(), 2, &DEMO).await;
        let naive = f
            .engine
            .retrieve(&f.scope, "photosynthesis sunlight leaves", RetrievalStrategy::Naive, 3)
            .await
            .unwrap();
        let reranked = f
            .engine
            .retrieve(&f.scope, "photosynthesis sunlight leaves", RetrievalStrategy::Reranking, 2)
            .await
            .unwrap();

        // The fake scores passages 0, 1, 2, ... so the last candidate wins.
        assert_eq!(reranked.len(), 2);
        assert_eq!(reranked[0].chunk_id, naive[2].chunk_id);
        assert_eq!(reranked[1].chunk_id, naive[1].chunk_id);
    }

    #[tokio::test]
    async fn reranking_keeps_similarity_order_on_garbage_scores() {
        let llm = FakeLlm::new();
        llm.push_ok("these passages all look fine to me");
        let f = fixture(llm, 2, &DEMO).await;
        let reranked = f
            .engine
            .retrieve(&f.scope, "photosynthesis sunlight leaves", RetrievalStrategy::Reranking, 2)
            .await
            .unwrap();
        let naive = f
            .engine
            .retrieve(&f.scope, "photosynthesis sunlight leaves", RetrievalStrategy::Naive, 2)
            .await
            .unwrap();
        assert_eq!(reranked, naive);
    }

    #[tokio::test]
    async fn multi_query_merges_without_duplicates() {
        let f = fixture(smart_llm(), 2, &DEMO).await;
        let merged = f
            .engine
            .retrieve(&f.scope, "Explain photosynthesis", RetrievalStrategy::MultiQuery, 2)
            .await
            .unwrap();
        assert!(merged.len() <= 2);
        let ids: HashSet<&str> = merged.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids.len(), merged.len());
        for pair in merged.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn history_is_windowed_between_context_and_question() {
        let f = fixture(smart_llm(), 2, &DEMO).await;
        let history: Vec<ChatTurn> = (0..10)
            .map(|i| {
                if i % 2 == 0 {
                    ChatTurn::user(format!("question {}", i))
                } else {
                    ChatTurn::assistant(format!("answer {}", i), Vec::new())
                }
            })
            .collect();
        let prompt = f.engine.build_prompt("latest?", &[], &history);

        assert_eq!(prompt.len(), 1 + 6 + 1);
        assert_eq!(prompt[0].role, MessageRole::System);
        assert_eq!(prompt[1].content, "question 4");
        assert_eq!(prompt[6].content, "answer 9");
        assert_eq!(prompt[7], ChatMessage::user("latest?"));
    }

    #[tokio::test]
    async fn stream_delivers_citations_then_fragments() {
        let f = fixture(smart_llm(), 2, &DEMO).await;
        let stream = f
            .engine
            .answer_stream(&f.scope, "How does photosynthesis work?", RetrievalStrategy::Naive, &[])
            .await
            .unwrap();
        assert_eq!(stream.citations.len(), 2);
        assert_eq!(stream.model, "primary-model");

        let text: String = stream
            .fragments
            .map(|f| f.unwrap())
            .collect::<Vec<_>>()
            .await
            .concat();
        assert_eq!(text, "Plants make glucose from sunlight [1], using chlorophyll [2].");
    }

    #[tokio::test]
    async fn deleted_notebook_retrieves_nothing() {
        let f = fixture(smart_llm(), 2, &DEMO).await;
        f.index.drop_notebook(&f.scope).await.unwrap();
        let chunks = f
            .engine
            .retrieve(&f.scope, "photosynthesis", RetrievalStrategy::Naive, 2)
            .await
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let f = fixture(smart_llm(), 2, &DEMO).await;
        let err = f
            .engine
            .answer(&f.scope, "   ", RetrievalStrategy::Naive, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::InvalidInput(_)));
        assert!(f.llm.calls().is_empty());
    }

    #[test]
    fn markers_flag_referenced_citations() {
        let chunk = RetrievedChunk {
            chunk_id: "a#0".into(),
            source_id: "a".into(),
            source_name: "a".into(),
            chunk_index: 0,
            text: "t".into(),
            score: 0.5,
        };
        let mut citations = vec![Citation::from(&chunk); 4];
        mark_referenced(&mut citations, "See [1] and [3, 4]. Not [9] or [0].");
        let flags: Vec<bool> = citations.iter().map(|c| c.referenced).collect();
        assert_eq!(flags, vec![true, false, true, true]);
    }

    #[test]
    fn variant_parsing_accepts_json_and_lists() {
        assert_eq!(
            parse_variants("Sure! [\"a b\", \"c\"]"),
            vec!["a b".to_string(), "c".to_string()]
        );
        assert_eq!(
            parse_variants("1. first way\n2) second way\n- third way\n\n"),
            vec!["first way", "second way", "third way"]
        );
    }

    #[test]
    fn score_parsing_checks_length() {
        assert_eq!(parse_scores("[1, 2.5, 3]", 3), Some(vec![1.0, 2.5, 3.0]));
        assert_eq!(parse_scores("[1, 2]", 3), None);
        assert_eq!(parse_scores("no idea", 1), None);
    }
}
