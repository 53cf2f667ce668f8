use async_trait::async_trait;
use nexus_core::{Error, FragmentStream, ModelProvider, ModelRequest, PromptRole, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;

use crate::sse::{self, SseEvent};

/// `OpenAI` chat completions endpoint.
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
/// Default model for `OpenAI`.
const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Env var key for the `OpenAI` API key.
const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Streaming provider for `OpenAI` and compatible chat completion APIs.
pub struct OpenAiProvider {
    /// HTTP client for API requests.
    client: Client,
    /// API key sent as a bearer token.
    api_key: String,
    /// Model name to use.
    model: String,
    /// Endpoint URL, overridable for compatible servers.
    base_url: String,
}

impl OpenAiProvider {
    /// Creates a new `OpenAiProvider` from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the `OPENAI_API_KEY` environment variable is not set.
    pub fn new() -> Result<Self> {
        let api_key =
            env::var(ENV_OPENAI_API_KEY).map_err(|_| Error::MissingApiKey(ENV_OPENAI_API_KEY.to_owned()))?;
        Self::with_api_key(api_key)
    }

    /// Creates a new `OpenAiProvider` with the given API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the provided API key is empty.
    pub fn with_api_key(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey(ENV_OPENAI_API_KEY.to_owned()));
        }
        Ok(Self {
            client: Client::default(),
            api_key,
            model: DEFAULT_MODEL.to_owned(),
            base_url: OPENAI_API_URL.to_owned(),
        })
    }

    /// Sets the model to use for generation.
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Points the provider at another compatible endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

/// Request payload sent to the chat completion API.
#[derive(Debug, Serialize)]
struct ChatRequest<'request> {
    /// Model identifier.
    model: &'request str,
    /// System prompt followed by the conversation.
    messages: Vec<ChatMessage<'request>>,
    /// Sampling temperature controlling response randomness.
    temperature: f32,
    /// Maximum number of tokens allowed in the completion.
    max_tokens: u32,
    /// Always true; responses arrive as SSE.
    stream: bool,
}

/// Message delivered to the chat completion API.
#[derive(Debug, Serialize)]
struct ChatMessage<'request> {
    /// Role of the message author (`system`, `user` or `assistant`).
    role: &'static str,
    /// Textual content of the message.
    content: &'request str,
}

/// One streamed completion chunk.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    /// Candidate deltas; only the first is used.
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

/// A single streamed choice.
#[derive(Debug, Deserialize)]
struct ChunkChoice {
    /// Incremental content.
    #[serde(default)]
    delta: ChunkDelta,
}

/// Incremental message content.
#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    /// New text, absent on role-only or final chunks.
    #[serde(default)]
    content: Option<String>,
}

/// Pull the text delta out of one SSE event.
fn extract_text(event: &SseEvent) -> Result<Option<String>> {
    let chunk: ChatChunk = serde_json::from_str(&event.data)
        .map_err(|err| Error::InvalidResponse(format!("Bad completion chunk: {err}")))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content))
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "OpenAI"
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn stream(&self, request: &ModelRequest) -> Result<FragmentStream> {
        let mut messages = vec![ChatMessage {
            role: "system",
            content: &request.system,
        }];
        messages.extend(request.messages.iter().map(|message| ChatMessage {
            role: match message.role {
                PromptRole::User => "user",
                PromptRole::Assistant => "assistant",
            },
            content: &message.content,
        }));

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
        };

        tracing::debug!("OpenAI stream starting with model {}", self.model);
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| Error::Provider(format!("OpenAI API request failed: {err}")))?;
        let response = sse::ensure_success(response, "OpenAI").await?;

        Ok(sse::text_stream(response, extract_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> SseEvent {
        SseEvent {
            event_type: None,
            data: data.to_owned(),
        }
    }

    #[test]
    fn test_extracts_delta_content() {
        let text = extract_text(&event(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#)).unwrap();
        assert_eq!(text.as_deref(), Some("Hel"));
    }

    #[test]
    fn test_role_only_chunk_has_no_text() {
        let text = extract_text(&event(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#)).unwrap();
        assert!(text.is_none());
        assert!(extract_text(&event(r#"{"choices":[]}"#)).unwrap().is_none());
    }

    #[test]
    fn test_garbage_chunk_is_invalid_response() {
        let error = extract_text(&event("not json")).unwrap_err();
        assert!(matches!(error, Error::InvalidResponse(_)));
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(
            OpenAiProvider::with_api_key(String::new()),
            Err(Error::MissingApiKey(_))
        ));
    }
}
