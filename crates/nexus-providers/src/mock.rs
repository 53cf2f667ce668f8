//! Mock provider for testing agent turns.
//!
//! Responses are chosen by substring match against the latest user message
//! and streamed back in fixed-size fragments, so callers exercise the same
//! incremental path as a real provider without network access.

use async_trait::async_trait;
use futures::stream;
use nexus_core::{Error, FragmentStream, IgnoreLock as _, ModelProvider, ModelRequest, Result};
use std::sync::{Arc, Mutex};

/// Ordered pattern/response pairs
type ResponseList = Arc<Mutex<Vec<(String, String)>>>;

/// Mock provider that streams pre-defined responses.
#[derive(Clone)]
pub struct MockProvider {
    /// Predefined responses, first matching pattern wins
    responses: ResponseList,
    /// Default response if no match found
    default_response: Arc<Mutex<Option<String>>>,
    /// Characters per streamed fragment
    fragment_size: usize,
    /// When set, every call fails with this provider error
    failure: Arc<Mutex<Option<String>>>,
    /// Last user message of every call, for verification
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    /// Create a new mock provider.
    #[must_use]
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: Arc::new(Mutex::new(None)),
            fragment_size: 7,
            failure: Arc::new(Mutex::new(None)),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a pattern-based response to the mock provider.
    #[must_use]
    pub fn with_response(self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses
            .lock_ignore_poison()
            .push((pattern.into(), response.into()));
        self
    }

    /// Set a default response for messages that don't match any pattern.
    #[must_use]
    pub fn with_default_response(self, response: impl Into<String>) -> Self {
        *self.default_response.lock_ignore_poison() = Some(response.into());
        self
    }

    /// Stream responses in fragments of `size` characters.
    #[must_use]
    pub fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = size.max(1);
        self
    }

    /// Make every call fail as if the provider were down.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock_ignore_poison() = Some(message.into());
    }

    /// Get the call history (latest user message of every call).
    #[must_use]
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock_ignore_poison().clone()
    }

    /// Get the number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_history.lock_ignore_poison().len()
    }

    fn find_response(&self, text: &str) -> Option<String> {
        self.responses
            .lock_ignore_poison()
            .iter()
            .find(|(pattern, _)| text.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
    }

    fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(self.fragment_size)
            .map(|chunk| chunk.iter().collect())
            .collect()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn is_available(&self) -> bool {
        self.failure.lock_ignore_poison().is_none()
    }

    async fn stream(&self, request: &ModelRequest) -> Result<FragmentStream> {
        let text = request.last_user_text().to_owned();
        self.call_history.lock_ignore_poison().push(text.clone());

        if let Some(message) = self.failure.lock_ignore_poison().clone() {
            return Err(Error::Provider(message));
        }

        let response = self.find_response(&text).unwrap_or_else(|| {
            self.default_response
                .lock_ignore_poison()
                .clone()
                .unwrap_or_else(|| format!("Mock response for: {text}"))
        });

        let fragments: Vec<Result<String>> = self.split(&response).into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(fragments)))
    }
}
