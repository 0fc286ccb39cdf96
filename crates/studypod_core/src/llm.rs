//! crates/studypod_core/src/llm.rs
//!
//! Retry and tiered model fallback on top of the `LlmService` port.
//!
//! Transient failures are retried with exponential backoff. When the primary
//! model is still failing after the retry budget (or reports itself unavailable)
//! the client demotes to the fallback model once. Fatal failures such as an
//! invalid API key are returned straight away.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::RagConfig;
use crate::domain::{ChatMessage, LlmResponse};
use crate::ports::{LlmService, PortError, PortResult, TextStream};

/// A stream of answer fragments together with the model that produces them.
pub struct LlmStream {
    pub model: String,
    pub fallback_used: bool,
    pub fragments: TextStream,
}

#[derive(Clone)]
pub struct LlmClient {
    service: Arc<dyn LlmService>,
    config: Arc<RagConfig>,
}

impl LlmClient {
    pub fn new(service: Arc<dyn LlmService>, config: Arc<RagConfig>) -> Self {
        Self { service, config }
    }

    /// Synchronous (non-streamed) completion.
    pub async fn complete(&self, messages: &[ChatMessage]) -> PortResult<LlmResponse> {
        let service = self.service.clone();
        let (mut response, fallback_used) = self
            .with_fallback(|model| {
                let service = service.clone();
                let messages = messages.to_vec();
                async move { service.complete(&model, &messages).await }
            })
            .await?;
        response.fallback_used = fallback_used;
        Ok(response)
    }

    /// Streaming completion. Retries cover opening the stream only; an error
    /// after the first fragment arrives inside the stream.
    pub async fn stream(&self, messages: &[ChatMessage]) -> PortResult<LlmStream> {
        let service = self.service.clone();
        let mut opened_model = String::new();
        let (fragments, fallback_used) = self
            .with_fallback(|model| {
                let service = service.clone();
                let messages = messages.to_vec();
                opened_model = model.clone();
                async move { service.complete_stream(&model, &messages).await }
            })
            .await?;
        Ok(LlmStream {
            model: opened_model,
            fallback_used,
            fragments,
        })
    }

    async fn with_fallback<T, F, Fut>(&self, mut call: F) -> PortResult<(T, bool)>
    where
        F: FnMut(String) -> Fut,
        Fut: std::future::Future<Output = PortResult<T>>,
    {
        let primary = self.config.primary_model.clone();
        let primary_err = match self.with_retries(&primary, &mut call).await {
            Ok(value) => return Ok((value, false)),
            Err(e @ PortError::LlmFatal(_)) => return Err(e),
            Err(e) => e,
        };

        let fallback = self.config.fallback_model.clone();
        if fallback.is_empty() || fallback == primary {
            return Err(PortError::LlmUnavailable(primary_err.to_string()));
        }

        warn!(
            primary_model = %primary,
            fallback_model = %fallback,
            error = %primary_err,
            "Primary model failed, demoting to fallback model"
        );
        match self.with_retries(&fallback, &mut call).await {
            Ok(value) => {
                info!(model = %fallback, "Fallback model answered");
                Ok((value, true))
            }
            Err(e @ PortError::LlmFatal(_)) => Err(e),
            Err(e) => Err(PortError::LlmUnavailable(format!(
                "primary '{}': {}; fallback '{}': {}",
                primary, primary_err, fallback, e
            ))),
        }
    }

    async fn with_retries<T, F, Fut>(&self, model: &str, call: &mut F) -> PortResult<T>
    where
        F: FnMut(String) -> Fut,
        Fut: std::future::Future<Output = PortResult<T>>,
    {
        let max_attempts = self.config.llm_max_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call(model.to_string()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.config.backoff_for(attempt);
                    warn!(
                        model,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "LLM call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
