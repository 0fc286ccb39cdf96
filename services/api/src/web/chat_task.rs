//! services/api/src/web/chat_task.rs
//!
//! This module contains the asynchronous "worker" function responsible for
//! streaming a single answer over a WebSocket and saving it to the chat log.

use crate::web::{protocol::ServerMessage, state::AppState};
use axum::extract::ws::{Message, WebSocket};
use futures::{stream::SplitSink, Sink, SinkExt, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;
use studypod_core::{
    domain::{ChatTurn, NotebookScope, RetrievalStrategy, TurnTiming},
    ports::{PortError, PortResult},
    rag::mark_referenced,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The sending half of a chat socket, shared by the control loop and the answer task.
pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// How an answer cycle ended.
#[derive(Debug, PartialEq, Eq)]
pub enum ChatOutcome {
    Completed,
    Cancelled,
}

pub async fn send_message<S>(ws_sender: &Arc<Mutex<S>>, message: &ServerMessage) -> PortResult<()>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    ws_sender
        .lock()
        .await
        .send(Message::Text(message.to_json().into()))
        .await
        .map_err(|e| PortError::Unexpected(format!("client went away: {}", e)))
}

/// Retrieves context, streams the answer fragment by fragment and, unless
/// cancelled, persists the question and the answer with their citations.
pub async fn answer_process<S>(
    app_state: Arc<AppState>,
    scope: NotebookScope,
    question: String,
    strategy: RetrievalStrategy,
    ws_sender: Arc<Mutex<S>>,
    token: CancellationToken,
) -> PortResult<ChatOutcome>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let started = Instant::now();
    info!(scope = %scope, strategy = %strategy, "Streaming answer started");

    let history = app_state
        .chats
        .recent(&scope, app_state.config.rag.history_window)
        .await?;

    let opened = tokio::select! {
        _ = token.cancelled() => None,
        result = app_state.engine.answer_stream(&scope, &question, strategy, &history) => Some(result?),
    };
    let Some(stream) = opened else {
        send_message(&ws_sender, &ServerMessage::Cancelled).await?;
        return Ok(ChatOutcome::Cancelled);
    };

    let mut citations = stream.citations;
    send_message(
        &ws_sender,
        &ServerMessage::AnswerStarted {
            citations: citations.clone(),
            strategy: stream.strategy,
        },
    )
    .await?;

    let generation_started = Instant::now();
    let mut fragments = stream.fragments;
    let mut answer = String::new();
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!(scope = %scope, chars = answer.len(), "Answer cancelled by client");
                send_message(&ws_sender, &ServerMessage::Cancelled).await?;
                return Ok(ChatOutcome::Cancelled);
            }
            next = fragments.next() => match next {
                Some(Ok(text)) => {
                    answer.push_str(&text);
                    send_message(&ws_sender, &ServerMessage::Token { text }).await?;
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
    }

    let timing = TurnTiming {
        retrieval_ms: stream.retrieval_ms,
        generation_ms: generation_started.elapsed().as_secs_f64() * 1000.0,
        total_ms: started.elapsed().as_secs_f64() * 1000.0,
    };

    if answer.trim().is_empty() {
        warn!(scope = %scope, model = %stream.model, "Model returned an empty answer");
    } else {
        mark_referenced(&mut citations, &answer);
        app_state.chats.append(&scope, ChatTurn::user(question)).await?;
        let turn = ChatTurn {
            strategy: Some(stream.strategy),
            model: Some(stream.model.clone()),
            timing: Some(timing),
            ..ChatTurn::assistant(answer, citations)
        };
        app_state.chats.append(&scope, turn).await?;
        app_state.notebooks.touch(&scope).await?;
    }

    send_message(
        &ws_sender,
        &ServerMessage::AnswerEnded {
            model: stream.model,
            fallback_used: stream.fallback_used,
            timing,
        },
    )
    .await?;
    info!(scope = %scope, total_ms = timing.total_ms, "Streaming answer finished");
    Ok(ChatOutcome::Completed)
}
