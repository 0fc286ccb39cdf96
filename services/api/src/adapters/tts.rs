//! services/api/src/adapters/tts.rs
//!
//! This module contains the adapter for OpenAI's Text-to-Speech (TTS) service.
//! It implements the `TextToSpeechService` port from the `core` crate and is used
//! to voice podcast scripts.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{CreateSpeechRequest, SpeechModel, SpeechResponseFormat, Voice},
    Client,
};
use async_trait::async_trait;
use studypod_core::ports::{PortError, PortResult, TextToSpeechService};
use tracing::debug;

/// Maps a configured voice name onto the API's voice enum.
pub fn parse_voice(name: &str) -> Option<Voice> {
    match name.trim().to_lowercase().as_str() {
        "alloy" => Some(Voice::Alloy),
        "echo" => Some(Voice::Echo),
        "fable" => Some(Voice::Fable),
        "onyx" => Some(Voice::Onyx),
        "nova" => Some(Voice::Nova),
        "shimmer" => Some(Voice::Shimmer),
        _ => None,
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `TextToSpeechService` port using the OpenAI TTS API.
#[derive(Clone)]
pub struct OpenAiTtsAdapter {
    client: Client<OpenAIConfig>,
    model: SpeechModel,
    default_voice: Voice,
}

impl OpenAiTtsAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: SpeechModel, default_voice: Voice) -> Self {
        Self {
            client,
            model,
            default_voice,
        }
    }
}

//=========================================================================================
// `TextToSpeechService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextToSpeechService for OpenAiTtsAdapter {
    /// Generates MP3 audio from the given text. Unknown voice names fall back to
    /// the configured default.
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> PortResult<Vec<u8>> {
        let voice = voice
            .and_then(parse_voice)
            .unwrap_or_else(|| self.default_voice.clone());

        let request = CreateSpeechRequest {
            model: self.model.clone(),
            input: text.to_string(),
            voice,
            response_format: Some(SpeechResponseFormat::Mp3),
            ..Default::default()
        };

        // Map the error by hand, which respects the orphan rule.
        let response = self
            .client
            .audio()
            .speech(request)
            .await
            .map_err(|e: OpenAIError| PortError::Speech(e.to_string()))?;

        debug!(chars = text.len(), bytes = response.bytes.len(), "Speech segment synthesised");
        Ok(response.bytes.to_vec())
    }
}
