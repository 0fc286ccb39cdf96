//! services/api/src/adapters/chat_store.rs
//!
//! The chat log of a notebook as JSON Lines, one turn per line.

use async_trait::async_trait;
use chrono::Utc;
use studypod_core::domain::{ChatTurn, NotebookScope};
use studypod_core::ports::{ChatStore, PortError, PortResult};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::adapters::layout::DataLayout;

pub struct JsonlChatStore {
    layout: DataLayout,
    write_lock: Mutex<()>,
}

impl JsonlChatStore {
    pub fn new(layout: DataLayout) -> Self {
        Self {
            layout,
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl ChatStore for JsonlChatStore {
    async fn append(&self, scope: &NotebookScope, mut turn: ChatTurn) -> PortResult<ChatTurn> {
        if turn.content.trim().is_empty() {
            return Err(PortError::InvalidInput("chat message must not be empty".to_string()));
        }
        turn.timestamp = Utc::now();

        let mut line = serde_json::to_string(&turn)?;
        line.push('\n');

        let path = self.layout.chat_file(scope);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(scope = %scope, role = ?turn.role, "Chat turn appended");
        Ok(turn)
    }

    async fn history(&self, scope: &NotebookScope) -> PortResult<Vec<ChatTurn>> {
        let content = match tokio::fs::read_to_string(self.layout.chat_file(scope)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let turns = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(number, line)| match serde_json::from_str::<ChatTurn>(line) {
                Ok(turn) => Some(turn),
                Err(e) => {
                    warn!(scope = %scope, line = number + 1, error = %e, "Skipping corrupt chat line");
                    None
                }
            })
            .collect();
        Ok(turns)
    }

    async fn clear(&self, scope: &NotebookScope) -> PortResult<usize> {
        let _guard = self.write_lock.lock().await;
        let removed = self.history(scope).await?.len();
        match tokio::fs::remove_file(self.layout.chat_file(scope)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(removed)
    }
}
