//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a streaming-chat WebSocket
//! connection. Each `ask` spawns an answer task; `cancel` stops it.

use crate::{
    error::ApiError,
    web::{
        chat_task::{answer_process, send_message, ChatOutcome, WsSender},
        middleware::CurrentUser,
        protocol::{ClientMessage, ServerMessage},
        state::{AppState, ChatSession},
    },
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::StreamExt;
use std::sync::Arc;
use studypod_core::domain::{NotebookScope, RetrievalStrategy};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Upgrades to a WebSocket once the notebook is known to belong to the caller.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path(notebook_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let notebook = app_state.notebook(&username, notebook_id).await?;
    let scope = notebook.scope();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, app_state, scope)))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, scope: NotebookScope) {
    info!(scope = %scope, "Chat WebSocket connected");

    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));
    let mut session = ChatSession::new(scope);

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                handle_text_message(text.as_str(), &app_state, &mut session, &ws_sender).await;
            }
            Ok(Message::Close(_)) => {
                info!("Client sent close message.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "WebSocket receive failed");
                break;
            }
        }
    }

    // Dropping the stream abandons any generation still in flight.
    session.cancellation_token.cancel();
    if let Some(task) = session.answer_task.take() {
        task.abort();
    }
    info!(scope = %session.scope, "Chat WebSocket closed");
}

async fn handle_text_message(
    text: &str,
    app_state: &Arc<AppState>,
    session: &mut ChatSession,
    ws_sender: &WsSender,
) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Failed to deserialize client message");
            let _ = send_message(
                ws_sender,
                &ServerMessage::Error {
                    message: format!("unrecognised message: {}", e),
                },
            )
            .await;
            return;
        }
    };

    match message {
        ClientMessage::Ask { question, strategy } => {
            if session.is_answering() {
                let _ = send_message(
                    ws_sender,
                    &ServerMessage::Error {
                        message: "an answer is already in progress".to_string(),
                    },
                )
                .await;
                return;
            }

            let strategy = strategy
                .as_deref()
                .map(RetrievalStrategy::parse_lenient)
                .unwrap_or_default();
            let token = session.reset_token();
            let task = {
                let app_state = app_state.clone();
                let scope = session.scope.clone();
                let ws_sender = ws_sender.clone();
                tokio::spawn(async move {
                    match answer_process(app_state, scope, question, strategy, ws_sender.clone(), token).await {
                        Ok(ChatOutcome::Completed) | Ok(ChatOutcome::Cancelled) => {}
                        Err(e) => {
                            error!(error = %e, "Answer task failed");
                            let _ = send_message(&ws_sender, &ServerMessage::Error { message: e.to_string() }).await;
                        }
                    }
                })
            };
            session.answer_task = Some(task);
        }
        ClientMessage::Cancel => {
            if session.is_answering() {
                info!("Cancel message received. Stopping the current answer.");
                session.cancellation_token.cancel();
            }
        }
    }
}
