//! crates/studypod_core/src/artifacts.rs
//!
//! Derivative documents built from a notebook's sources: a study report, a quiz
//! with answer key, and a two-host podcast (transcript plus synthesised audio).
//!
//! Every artifact sees the whole notebook. When its text exceeds
//! `artifact_context_chars`, it is condensed map-reduce style: batches that fit
//! the budget are summarised independently and the summaries replace the
//! passages, round after round, until the material fits.

use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::config::RagConfig;
use crate::domain::{ArtifactContent, ArtifactKind, ArtifactRecord, ChatMessage, NotebookScope};
use crate::ports::{ArtifactStore, PortError, PortResult, TextToSpeechService};
use crate::rag::RagEngine;

/// Longest text handed to the speech service in one request.
pub const TTS_SEGMENT_CHARS: usize = 4000;
pub const MAX_QUIZ_QUESTIONS: usize = 50;

/// Condensing rounds before over-long material is cut to the budget instead.
const MAX_CONDENSE_ROUNDS: usize = 3;
/// Summaries requested from the model at the same time.
const CONDENSE_CONCURRENCY: usize = 4;
const CONDENSE_INSTRUCTIONS: &str = "You condense study material.";

/// Result of one generation run.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedArtifact {
    pub kind: ArtifactKind,
    /// Every file written; a podcast yields a transcript and an audio file.
    pub files: Vec<ArtifactRecord>,
    pub content: String,
    pub model: String,
    pub fallback_used: bool,
    /// Chunks of the notebook the artifact was built from (all of them).
    pub chunks_covered: usize,
    /// Summarisation rounds needed to fit the context budget, 0 if none.
    pub condense_rounds: usize,
}

/// A block of source text shown to the model under one number.
#[derive(Debug, Clone)]
struct Passage {
    source: String,
    text: String,
}

/// The notebook, ready to be placed in a prompt.
struct Material {
    passages: Vec<Passage>,
    chunks_covered: usize,
    condense_rounds: usize,
}

#[derive(Clone)]
pub struct ArtifactGenerator {
    engine: RagEngine,
    store: Arc<dyn ArtifactStore>,
    tts: Option<Arc<dyn TextToSpeechService>>,
    config: Arc<RagConfig>,
}

impl ArtifactGenerator {
    pub fn new(
        engine: RagEngine,
        store: Arc<dyn ArtifactStore>,
        tts: Option<Arc<dyn TextToSpeechService>>,
        config: Arc<RagConfig>,
    ) -> Self {
        Self {
            engine,
            store,
            tts,
            config,
        }
    }

    #[instrument(skip_all, fields(scope = %scope))]
    pub async fn generate_report(&self, scope: &NotebookScope) -> PortResult<GeneratedArtifact> {
        let material = self.gather(scope).await?;
        let prompt = [
            ChatMessage::system(
                "You write study reports in Markdown. Using only the numbered passages, produce a \
                 report with a title, an overview paragraph, one section per major topic with \
                 headings, and a closing 'Key takeaways' list. Reference passages inline as [n].",
            ),
            ChatMessage::user(format_passages(&material.passages)),
        ];
        let response = self.engine.llm().complete(&prompt).await?;

        let filename = format!("report_{}.md", timestamp());
        let record = self
            .store
            .save(
                scope,
                ArtifactKind::Report,
                &filename,
                ArtifactContent::Text(response.text.clone()),
                json!({
                    "chunks": material.chunks_covered,
                    "condense_rounds": material.condense_rounds,
                    "model": response.model,
                }),
            )
            .await?;
        info!(filename = %record.filename, "Report generated");

        Ok(GeneratedArtifact {
            kind: ArtifactKind::Report,
            files: vec![record],
            content: response.text,
            model: response.model,
            fallback_used: response.fallback_used,
            chunks_covered: material.chunks_covered,
            condense_rounds: material.condense_rounds,
        })
    }

    #[instrument(skip_all, fields(scope = %scope, num_questions = num_questions))]
    pub async fn generate_quiz(&self, scope: &NotebookScope, num_questions: usize) -> PortResult<GeneratedArtifact> {
        if num_questions == 0 || num_questions > MAX_QUIZ_QUESTIONS {
            return Err(PortError::InvalidInput(format!(
                "a quiz has between 1 and {} questions, got {}",
                MAX_QUIZ_QUESTIONS, num_questions
            )));
        }
        let material = self.gather(scope).await?;
        let prompt = [
            ChatMessage::system(format!(
                "You write quizzes in Markdown. Using only the numbered passages, write exactly {} \
                 numbered questions mixing multiple choice (options A-D), true/false and short \
                 answer. After all questions add a section '## Answer key' giving each answer with \
                 a one-sentence explanation and the passage [n] it comes from.",
                num_questions
            )),
            ChatMessage::user(format_passages(&material.passages)),
        ];
        let response = self.engine.llm().complete(&prompt).await?;

        let filename = format!("quiz_{}.md", timestamp());
        let record = self
            .store
            .save(
                scope,
                ArtifactKind::Quiz,
                &filename,
                ArtifactContent::Text(response.text.clone()),
                json!({
                    "num_questions": num_questions,
                    "chunks": material.chunks_covered,
                    "condense_rounds": material.condense_rounds,
                    "model": response.model,
                }),
            )
            .await?;
        info!(filename = %record.filename, "Quiz generated");

        Ok(GeneratedArtifact {
            kind: ArtifactKind::Quiz,
            files: vec![record],
            content: response.text,
            model: response.model,
            fallback_used: response.fallback_used,
            chunks_covered: material.chunks_covered,
            condense_rounds: material.condense_rounds,
        })
    }

    /// Writes a conversational script, then synthesises it segment by segment
    /// in parallel and stitches the audio back together in script order.
    /// The first failed segment cancels the ones still running.
    #[instrument(skip_all, fields(scope = %scope))]
    pub async fn generate_podcast(&self, scope: &NotebookScope) -> PortResult<GeneratedArtifact> {
        let tts = self
            .tts
            .clone()
            .ok_or_else(|| PortError::Speech("text-to-speech is not configured".to_string()))?;

        let material = self.gather(scope).await?;
        let prompt = [
            ChatMessage::system(
                "You write podcast scripts. Using only the numbered passages, write a lively \
                 conversation between two hosts, Alex and Sam, explaining the material to a \
                 student. Prefix every line with the speaker's name followed by a colon. Keep it \
                 under 1500 words and do not include stage directions or citations.",
            ),
            ChatMessage::user(format_passages(&material.passages)),
        ];
        let response = self.engine.llm().complete(&prompt).await?;
        let script = response.text.trim().to_string();
        if script.is_empty() {
            return Err(PortError::Unexpected("the model returned an empty script".to_string()));
        }

        let segments = split_segments(&script, TTS_SEGMENT_CHARS);
        let tts_start = Instant::now();
        info!(segments = segments.len(), "Synthesising podcast audio in parallel");

        let mut tasks = JoinSet::new();
        for (i, segment) in segments.iter().cloned().enumerate() {
            let tts = tts.clone();
            let voice = self.config.podcast_voice.clone();
            tasks.spawn(async move { (i, tts.synthesize(&segment, voice.as_deref()).await) });
        }

        let mut parts: Vec<Option<Vec<u8>>> = vec![None; segments.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((i, Ok(bytes))) => parts[i] = Some(bytes),
                Ok((i, Err(e))) => {
                    error!(segment = i + 1, error = %e, "Speech synthesis failed");
                    tasks.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    error!(error = %e, "Speech task failed to join");
                    tasks.abort_all();
                    return Err(PortError::Unexpected(e.to_string()));
                }
            }
        }
        let audio: Vec<u8> = parts.into_iter().flatten().flatten().collect();
        info!(elapsed = ?tts_start.elapsed(), bytes = audio.len(), "Podcast audio ready");

        let stem = format!("podcast_{}", timestamp());
        let parameters = json!({
            "chunks": material.chunks_covered,
            "condense_rounds": material.condense_rounds,
            "segments": segments.len(),
            "voice": self.config.podcast_voice,
            "model": response.model,
        });
        let transcript = self
            .store
            .save(
                scope,
                ArtifactKind::Podcast,
                &format!("{}.md", stem),
                ArtifactContent::Text(script.clone()),
                parameters.clone(),
            )
            .await?;
        let audio_record = self
            .store
            .save(
                scope,
                ArtifactKind::Podcast,
                &format!("{}.mp3", stem),
                ArtifactContent::Audio(audio),
                parameters,
            )
            .await?;

        Ok(GeneratedArtifact {
            kind: ArtifactKind::Podcast,
            files: vec![transcript, audio_record],
            content: script,
            model: response.model,
            fallback_used: response.fallback_used,
            chunks_covered: material.chunks_covered,
            condense_rounds: material.condense_rounds,
        })
    }

    /// Every chunk of the notebook in document order, condensed until it fits
    /// the context budget.
    async fn gather(&self, scope: &NotebookScope) -> PortResult<Material> {
        let chunks = self.engine.index().all_chunks(scope).await?;
        if chunks.is_empty() {
            return Err(PortError::InvalidInput("notebook has no sources".to_string()));
        }
        let chunks_covered = chunks.len();
        let mut passages: Vec<Passage> = chunks
            .into_iter()
            .map(|c| Passage {
                source: c.source_name,
                text: c.text,
            })
            .collect();

        let budget = self.config.artifact_context_chars.max(1);
        let mut condense_rounds = 0;
        while total_chars(&passages) > budget {
            if condense_rounds == MAX_CONDENSE_ROUNDS {
                warn!(
                    chars = total_chars(&passages),
                    budget, "Notebook still too long after condensing, truncating"
                );
                truncate_to_budget(&mut passages, budget);
                break;
            }
            condense_rounds += 1;
            passages = self.condense(passages, budget).await?;
            info!(
                round = condense_rounds,
                passages = passages.len(),
                chars = total_chars(&passages),
                "Notebook condensed"
            );
        }

        Ok(Material {
            passages,
            chunks_covered,
            condense_rounds,
        })
    }

    /// The map step: each batch that fits the budget becomes one summary,
    /// sized so that all summaries together fit it too.
    async fn condense(&self, passages: Vec<Passage>, budget: usize) -> PortResult<Vec<Passage>> {
        let batches = batch_passages(passages, budget);
        let max_words = (budget / batches.len() / 6).max(40);

        let summaries: Vec<Option<Passage>> = futures::stream::iter(batches)
            .map(|batch| self.summarise(batch, max_words))
            .buffered(CONDENSE_CONCURRENCY)
            .try_collect()
            .await?;
        let summaries: Vec<Passage> = summaries.into_iter().flatten().collect();
        if summaries.is_empty() {
            return Err(PortError::Unexpected(
                "the model returned only empty summaries".to_string(),
            ));
        }
        Ok(summaries)
    }

    async fn summarise(&self, batch: Vec<Passage>, max_words: usize) -> PortResult<Option<Passage>> {
        let mut sources: Vec<&str> = Vec::new();
        for passage in &batch {
            if !sources.contains(&passage.source.as_str()) {
                sources.push(&passage.source);
            }
        }
        let prompt = [
            ChatMessage::system(format!(
                "{} Summarise the numbered passages in at most {} words. Keep every definition, \
                 key fact, figure and conclusion, and say which source each point comes from. \
                 Write plain prose without citations.",
                CONDENSE_INSTRUCTIONS, max_words
            )),
            ChatMessage::user(format_passages(&batch)),
        ];
        let response = self.engine.llm().complete(&prompt).await?;
        let text = response.text.trim();
        if text.is_empty() {
            warn!(sources = ?sources, "Empty summary dropped");
            return Ok(None);
        }
        Ok(Some(Passage {
            source: format!("summary of {}", sources.join(", ")),
            text: text.to_string(),
        }))
    }
}

fn total_chars(passages: &[Passage]) -> usize {
    passages.iter().map(|p| p.text.chars().count()).sum()
}

/// Groups consecutive passages so that no group exceeds `budget` characters.
/// A passage longer than the budget forms a group of its own.
fn batch_passages(passages: Vec<Passage>, budget: usize) -> Vec<Vec<Passage>> {
    let mut batches = Vec::new();
    let mut current: Vec<Passage> = Vec::new();
    let mut current_chars = 0;
    for passage in passages {
        let chars = passage.text.chars().count();
        if !current.is_empty() && current_chars + chars > budget {
            batches.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current_chars += chars;
        current.push(passage);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn truncate_to_budget(passages: &mut Vec<Passage>, budget: usize) {
    let mut used = 0;
    let mut keep = 0;
    for passage in passages.iter_mut() {
        let remaining = budget.saturating_sub(used);
        if remaining == 0 {
            break;
        }
        let chars = passage.text.chars().count();
        if chars > remaining {
            passage.text = passage.text.chars().take(remaining).collect();
        }
        used += chars.min(remaining);
        keep += 1;
    }
    passages.truncate(keep);
}

fn format_passages(passages: &[Passage]) -> String {
    let mut out = String::from("Passages:\n");
    for (i, passage) in passages.iter().enumerate() {
        out.push_str(&format!(
            "\n[{}] (source: {})\n{}\n",
            i + 1,
            passage.source,
            passage.text
        ));
    }
    out
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string()
}

/// Packs whole lines into segments of at most `max_chars` characters.
/// A single line longer than that is broken at word boundaries.
pub fn split_segments(text: &str, max_chars: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.chars().count() <= max_chars {
            append_line(line, &mut current, &mut segments, max_chars);
            continue;
        }
        let mut piece = String::new();
        for word in line.split_whitespace() {
            for part in split_long_word(word, max_chars) {
                if !piece.is_empty() && piece.chars().count() + 1 + part.chars().count() > max_chars {
                    append_line(&piece, &mut current, &mut segments, max_chars);
                    piece.clear();
                }
                if !piece.is_empty() {
                    piece.push(' ');
                }
                piece.push_str(&part);
            }
        }
        if !piece.is_empty() {
            append_line(&piece, &mut current, &mut segments, max_chars);
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn append_line(line: &str, current: &mut String, segments: &mut Vec<String>, max_chars: usize) {
    if !current.is_empty() && current.chars().count() + 1 + line.chars().count() > max_chars {
        segments.push(std::mem::take(current));
    }
    if !current.is_empty() {
        current.push('\n');
    }
    current.push_str(line);
}

fn split_long_word(word: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|c| c.iter().collect())
        .collect()
}
