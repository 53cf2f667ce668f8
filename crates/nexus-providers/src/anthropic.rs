use async_trait::async_trait;
use nexus_core::{Error, FragmentStream, ModelProvider, ModelRequest, PromptRole, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;

use crate::sse::{self, SseEvent};

/// Anthropic messages endpoint.
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Default model for Anthropic.
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
/// Env var key for the Anthropic API key.
const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";

/// Streaming provider for the Anthropic messages API.
pub struct AnthropicProvider {
    /// HTTP client for API requests.
    client: Client,
    /// API key sent in `x-api-key`.
    api_key: String,
    /// Model name to use.
    model: String,
}

impl AnthropicProvider {
    /// Creates a new `AnthropicProvider` from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the `ANTHROPIC_API_KEY` environment variable is not set.
    pub fn new() -> Result<Self> {
        let api_key = env::var(ENV_ANTHROPIC_API_KEY)
            .map_err(|_| Error::MissingApiKey(ENV_ANTHROPIC_API_KEY.to_owned()))?;
        Self::with_api_key(api_key)
    }

    /// Creates a new `AnthropicProvider` with the given API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the provided API key is empty.
    pub fn with_api_key(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey(ENV_ANTHROPIC_API_KEY.to_owned()));
        }
        Ok(Self {
            client: Client::default(),
            api_key,
            model: DEFAULT_MODEL.to_owned(),
        })
    }

    /// Sets the model to use for generation.
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }
}

/// Request payload for the messages API.
#[derive(Debug, Serialize)]
struct MessagesRequest<'request> {
    /// Model identifier.
    model: &'request str,
    /// System prompt.
    system: &'request str,
    /// Alternating user/assistant turns.
    messages: Vec<AnthropicMessage<'request>>,
    /// Maximum tokens to generate.
    max_tokens: u32,
    /// Sampling temperature.
    temperature: f32,
    /// Always true; responses arrive as SSE.
    stream: bool,
}

/// One conversation turn.
#[derive(Debug, Serialize)]
struct AnthropicMessage<'request> {
    /// `user` or `assistant`.
    role: &'static str,
    /// Message text.
    content: &'request str,
}

/// Streamed event payload; only the fields used for text are modelled.
#[derive(Debug, Deserialize)]
struct StreamPayload {
    /// Delta carried by `content_block_delta`.
    #[serde(default)]
    delta: Option<TextDelta>,
    /// Error carried by `error` events.
    #[serde(default)]
    error: Option<ApiError>,
}

/// Text delta of a content block.
#[derive(Debug, Deserialize)]
struct TextDelta {
    /// Present for `text_delta` deltas.
    #[serde(default)]
    text: Option<String>,
}

/// Error object in an `error` event.
#[derive(Debug, Deserialize)]
struct ApiError {
    /// Human readable message.
    message: String,
}

/// Pull text out of one SSE event; stream-level errors abort.
fn extract_text(event: &SseEvent) -> Result<Option<String>> {
    match event.event_type.as_deref() {
        Some("content_block_delta" | "error") => {}
        _ => return Ok(None),
    }
    let payload: StreamPayload = serde_json::from_str(&event.data)
        .map_err(|err| Error::InvalidResponse(format!("Bad Anthropic event: {err}")))?;
    if let Some(error) = payload.error {
        return Err(Error::Provider(format!("Anthropic stream error: {}", error.message)));
    }
    Ok(payload.delta.and_then(|delta| delta.text))
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "Anthropic"
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn stream(&self, request: &ModelRequest) -> Result<FragmentStream> {
        let messages = request
            .messages
            .iter()
            .map(|message| AnthropicMessage {
                role: match message.role {
                    PromptRole::User => "user",
                    PromptRole::Assistant => "assistant",
                },
                content: &message.content,
            })
            .collect();

        let body = MessagesRequest {
            model: &self.model,
            system: &request.system,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: true,
        };

        tracing::debug!("Anthropic stream starting with model {}", self.model);
        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|err| Error::Provider(format!("Anthropic API request failed: {err}")))?;
        let response = sse::ensure_success(response, "Anthropic").await?;

        Ok(sse::text_stream(response, extract_text))
    }
}
