//! services/api/src/adapters/llm.rs
//!
//! This module contains the adapter for chat completions against any
//! OpenAI-compatible endpoint (Groq by default). It implements the `LlmService`
//! port from the `core` crate and translates provider errors into the port's
//! failure taxonomy so the core can decide between retrying, demoting and giving up.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use futures::StreamExt;
use std::time::Duration;
use studypod_core::domain::{ChatMessage, LlmResponse, MessageRole, TokenUsage};
use studypod_core::ports::{LlmService, PortError, PortResult, TextStream};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `LlmService` using an OpenAI-compatible chat API.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    client: Client<OpenAIConfig>,
    max_tokens: u32,
}

impl OpenAiChatAdapter {
    pub fn new(client: Client<OpenAIConfig>) -> Self {
        Self {
            client,
            max_tokens: 2048,
        }
    }

    fn build_request(&self, model: &str, messages: &[ChatMessage]) -> PortResult<CreateChatCompletionRequest> {
        let messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()?;
        CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .max_completion_tokens(self.max_tokens)
            .temperature(0.2)
            .build()
            .map_err(|e| PortError::LlmFatal(e.to_string()))
    }
}

/// Builds a client for `api_base` with the library's own retry loop switched
/// off. Every 429 and 5xx then reaches `classify_error`, and retrying or
/// falling back to the smaller model is left to `LlmClient`.
pub fn build_client(api_key: &str, api_base: &str) -> Client<OpenAIConfig> {
    let no_retries = ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build();
    Client::with_config(
        OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base),
    )
    .with_backoff(no_retries)
}

fn to_request_message(message: &ChatMessage) -> PortResult<ChatCompletionRequestMessage> {
    let built = match message.role {
        MessageRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(message.content.as_str())
            .build()
            .map(Into::into),
        MessageRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(message.content.as_str())
            .build()
            .map(Into::into),
        MessageRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(message.content.as_str())
            .build()
            .map(Into::into),
    };
    built.map_err(|e| PortError::LlmFatal(e.to_string()))
}

/// Sorts a provider error into retryable, demotable and fatal buckets.
pub fn classify_error(err: OpenAIError) -> PortError {
    match err {
        OpenAIError::ApiError(api) => {
            let code = api.code.as_ref().map(ToString::to_string).unwrap_or_default();
            let kind = api.r#type.clone().unwrap_or_default();
            let haystack = format!("{} {} {}", code, kind, api.message).to_lowercase();

            if haystack.contains("rate_limit") || haystack.contains("rate limit") || haystack.contains("429") {
                PortError::RateLimited(api.message)
            } else if haystack.contains("model_not_found")
                || haystack.contains("model_decommissioned")
                || haystack.contains("does not exist")
                || haystack.contains("decommissioned")
                || haystack.contains("over capacity")
            {
                PortError::ModelUnavailable(api.message)
            } else if haystack.contains("server_error")
                || haystack.contains("internal")
                || haystack.contains("overloaded")
                || haystack.contains("service_unavailable")
                || haystack.contains("bad gateway")
            {
                PortError::ServerError(api.message)
            } else {
                PortError::LlmFatal(api.message)
            }
        }
        OpenAIError::Reqwest(e) if e.is_timeout() => PortError::Timeout(e.to_string()),
        OpenAIError::Reqwest(e) => PortError::ServerError(e.to_string()),
        OpenAIError::StreamError(message) => {
            let lower = message.to_lowercase();
            if lower.contains("429") || lower.contains("rate limit") {
                PortError::RateLimited(message)
            } else {
                PortError::ServerError(message)
            }
        }
        other => PortError::LlmFatal(other.to_string()),
    }
}

//=========================================================================================
// `LlmService` Trait Implementation
//=========================================================================================

#[async_trait]
impl LlmService for OpenAiChatAdapter {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> PortResult<LlmResponse> {
        let request = self.build_request(model, messages)?;
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(classify_error)?;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();
        let usage = response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
        debug!(model, usage = ?usage, "Chat completion finished");

        Ok(LlmResponse {
            text,
            model: model.to_string(),
            usage,
            fallback_used: false,
        })
    }

    /// Opens the stream and waits for its first event, so that rate limits and
    /// unknown models surface here (where the caller can retry) instead of mid-answer.
    async fn complete_stream(&self, model: &str, messages: &[ChatMessage]) -> PortResult<TextStream> {
        let mut request = self.build_request(model, messages)?;
        request.stream = Some(true);

        let mut upstream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(classify_error)?;

        let first = match upstream.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(classify_error(e)),
            None => return Ok(Box::pin(futures::stream::empty())),
        };

        let stream = async_stream::stream! {
            let mut next = Some(Ok(first));
            while let Some(item) = next {
                match item {
                    Ok(chunk) => {
                        for choice in chunk.choices {
                            if let Some(text) = choice.delta.content {
                                if !text.is_empty() {
                                    yield Ok(text);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(classify_error(e));
                        break;
                    }
                }
                next = upstream.next().await;
            }
        };
        Ok(Box::pin(stream))
    }
}
