//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server
//! for streaming chat answers.

use serde::{Deserialize, Serialize};
use studypod_core::domain::{Citation, RetrievalStrategy, TurnTiming};

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Asks a question about the notebook. An unknown or missing strategy means naive.
    Ask {
        question: String,
        #[serde(default)]
        strategy: Option<String>,
    },

    /// Stops the answer currently being streamed.
    Cancel,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Retrieval finished; the passages the answer will be grounded on.
    AnswerStarted {
        citations: Vec<Citation>,
        strategy: RetrievalStrategy,
    },

    /// One fragment of the answer text.
    Token { text: String },

    /// The answer is complete and has been saved to the chat history.
    AnswerEnded {
        model: String,
        fallback_used: bool,
        timing: TurnTiming,
    },

    /// The answer was stopped at the client's request; nothing was saved.
    Cancelled,

    /// Reports an error to the client, which should display it.
    Error { message: String },
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"type":"error","message":"encoding failed: {}"}}"#, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_parses_with_and_without_strategy() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"ask","question":"Why?","strategy":"hyde"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ask { ref strategy, .. } if strategy.as_deref() == Some("hyde")));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ask","question":"Why?"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ask { strategy: None, .. }));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"cancel"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Cancel));
    }

    #[test]
    fn server_messages_are_type_tagged() {
        let json: serde_json::Value =
            serde_json::from_str(&ServerMessage::Token { text: "hi".into() }.to_json()).unwrap();
        assert_eq!(json["type"], "token");
        assert_eq!(json["text"], "hi");

        let json: serde_json::Value = serde_json::from_str(&ServerMessage::Cancelled.to_json()).unwrap();
        assert_eq!(json["type"], "cancelled");
    }
}
