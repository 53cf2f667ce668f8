use async_trait::async_trait;
use nexus_core::{Error, FragmentStream, ModelProvider, ModelRequest, PromptRole, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;

use crate::sse::{self, SseEvent};

/// Gemini API base URL.
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// Default model for Gemini.
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
/// Env var key for the Gemini API key.
const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";

/// Streaming provider for Google Gemini.
pub struct GeminiProvider {
    /// HTTP client for API requests.
    client: Client,
    /// API key sent in the `x-goog-api-key` header.
    api_key: String,
    /// Model name to use.
    model: String,
}

impl GeminiProvider {
    /// Creates a new `GeminiProvider` from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the `GEMINI_API_KEY` environment variable is not set.
    pub fn new() -> Result<Self> {
        let api_key =
            env::var(ENV_GEMINI_API_KEY).map_err(|_| Error::MissingApiKey(ENV_GEMINI_API_KEY.to_owned()))?;
        Self::with_api_key(api_key)
    }

    /// Creates a new `GeminiProvider` with the given API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the provided API key is empty.
    pub fn with_api_key(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey(ENV_GEMINI_API_KEY.to_owned()));
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

/// Request payload for `streamGenerateContent`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'request> {
    /// Conversation turns.
    contents: Vec<Content<'request>>,
    /// System prompt.
    system_instruction: Content<'request>,
    /// Sampling settings.
    generation_config: GenerationConfig,
}

/// One turn of content.
#[derive(Debug, Serialize)]
struct Content<'request> {
    /// `user` or `model`; omitted for the system instruction.
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    /// Text parts.
    parts: Vec<Part<'request>>,
}

/// A text part in a request.
#[derive(Debug, Serialize)]
struct Part<'request> {
    /// Text.
    text: &'request str,
}

/// Sampling settings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    /// Sampling temperature.
    temperature: f32,
    /// Maximum tokens to generate.
    max_output_tokens: u32,
}

/// One streamed response chunk.
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    /// Candidate completions; only the first is used.
    #[serde(default)]
    candidates: Vec<Candidate>,
}

/// A streamed candidate.
#[derive(Debug, Deserialize)]
struct Candidate {
    /// Content, absent on safety stops.
    #[serde(default)]
    content: Option<CandidateContent>,
}

/// Candidate content.
#[derive(Debug, Deserialize)]
struct CandidateContent {
    /// Text parts.
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

/// A text part in a response.
#[derive(Debug, Deserialize)]
struct CandidatePart {
    /// Text, absent for non-text parts.
    #[serde(default)]
    text: Option<String>,
}

/// Concatenate the text parts of the first candidate.
fn extract_text(event: &SseEvent) -> Result<Option<String>> {
    let chunk: GenerateChunk = serde_json::from_str(&event.data)
        .map_err(|err| Error::InvalidResponse(format!("Bad Gemini chunk: {err}")))?;
    let text: String = chunk
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
        .unwrap_or_default();
    Ok((!text.is_empty()).then_some(text))
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn stream(&self, request: &ModelRequest) -> Result<FragmentStream> {
        let contents = request
            .messages
            .iter()
            .map(|message| Content {
                role: Some(match message.role {
                    PromptRole::User => "user",
                    PromptRole::Assistant => "model",
                }),
                parts: vec![Part {
                    text: &message.content,
                }],
            })
            .collect();

        let body = GenerateRequest {
            contents,
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: &request.system,
                }],
            },
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        };

        let url = format!("{GEMINI_API_BASE}/{}:streamGenerateContent?alt=sse", self.model);
        tracing::debug!("Gemini stream starting with model {}", self.model);
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| Error::Provider(format!("Gemini API request failed: {err}")))?;
        let response = sse::ensure_success(response, "Gemini").await?;

        Ok(sse::text_stream(response, extract_text))
    }
}
