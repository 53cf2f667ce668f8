use async_trait::async_trait;
use core::pin::Pin;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Message, Role};

/// Incrementally arriving response text.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Speaker of a prompt message as model APIs understand it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    /// Operator input or tool feedback
    User,
    /// Earlier model output
    Assistant,
}

/// One message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Speaker
    pub role: PromptRole,
    /// Text
    pub content: String,
}

impl PromptMessage {
    /// Operator-side message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    /// Model-side message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
        }
    }
}

/// Everything a provider needs to stream one response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    /// System instructions
    pub system: String,
    /// Conversation so far, oldest first, ending with a user message
    pub messages: Vec<PromptMessage>,
    /// Sampling temperature
    pub temperature: f32,
    /// Response token budget
    pub max_tokens: u32,
}

impl ModelRequest {
    /// Build a request from conversation history.
    ///
    /// Tool results are folded into user messages so every provider sees them.
    pub fn from_history(system: impl Into<String>, history: &[Message]) -> Self {
        let messages = history
            .iter()
            .map(|message| match message.role {
                Role::Operator => PromptMessage::user(message.content.clone()),
                Role::Agent => PromptMessage::assistant(message.content.clone()),
                Role::ToolResult => {
                    let tool = message
                        .tool_results
                        .first()
                        .map_or("tool", |result| result.tool_name.as_str());
                    PromptMessage::user(format!("[{tool} result] {}", message.content))
                }
            })
            .collect();
        Self {
            system: system.into(),
            messages,
            temperature: 0.7,
            max_tokens: 4000,
        }
    }

    /// Override sampling settings.
    #[must_use]
    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Text of the most recent user message.
    pub fn last_user_text(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == PromptRole::User)
            .map_or("", |message| message.content.as_str())
    }
}

/// A language model backend that streams responses.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Returns the unique identifier for this provider.
    fn name(&self) -> &'static str;

    /// Checks whether this provider is currently available and ready to process requests.
    async fn is_available(&self) -> bool;

    /// Starts streaming a response to `request`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unavailable or the request is rejected.
    /// Failures after streaming began arrive as `Err` items on the stream.
    async fn stream(&self, request: &ModelRequest) -> Result<FragmentStream>;
}
