use core::result::Result as CoreResult;
use std::io::Error as IoError;
use std::path::PathBuf;

use async_trait::async_trait;
use nexus_core::{ConversationId, UserId};
use reqwest::Error as ReqwestError;
use serde::{Deserialize, Serialize};
use serde_json::{Error as SerdeJsonError, Value};
use thiserror::Error;

/// Errors that can occur during tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool is registered under the requested name.
    #[error("Tool {name} not found. Available tools: {available}")]
    NotFound {
        /// Requested name
        name: String,
        /// Comma separated registered names
        available: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// An HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Request(#[from] ReqwestError),

    /// The provided input parameters were invalid or malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The tool failed to execute its operation.
    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    /// The tool did not finish within its time bound.
    #[error("Tool {tool} timed out after {seconds}s")]
    Timeout {
        /// Tool that timed out
        tool: String,
        /// Bound that was exceeded
        seconds: u64,
    },

    /// Failed to serialize or deserialize data.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerdeJsonError),
}

/// Result type for tool operations.
pub type Result<T> = CoreResult<T, ToolError>;

/// Request-scoped information handed to every tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Conversation on whose behalf the tool runs
    pub conversation_id: ConversationId,
    /// Operator on whose behalf the tool runs
    pub user_id: UserId,
    /// Directory owned by the conversation
    pub workspace: PathBuf,
}

impl ToolContext {
    /// Build a context.
    pub fn new(conversation_id: ConversationId, user_id: UserId, workspace: impl Into<PathBuf>) -> Self {
        Self {
            conversation_id,
            user_id,
            workspace: workspace.into(),
        }
    }
}

/// Input parameters provided to a tool for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    /// JSON object containing the tool-specific parameters.
    pub params: Value,
}

impl ToolInput {
    /// First string parameter present under any of `keys`.
    pub fn get_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|key| self.params.get(*key).and_then(Value::as_str))
    }

    /// Like [`Self::get_str`], failing with `InvalidInput` when absent.
    ///
    /// # Errors
    /// Returns `ToolError::InvalidInput` naming the first key when none is present.
    pub fn require_str(&self, tool: &str, keys: &[&str]) -> Result<&str> {
        self.get_str(keys).ok_or_else(|| {
            ToolError::InvalidInput(format!(
                "{tool} requires a '{}' parameter",
                keys.first().copied().unwrap_or("value")
            ))
        })
    }

    /// Unsigned integer parameter given either as a number or a numeric string.
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        match self.params.get(key)? {
            Value::Number(number) => number.as_u64().and_then(|value| u32::try_from(value).ok()),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Output returned by a tool after execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Whether the tool execution succeeded.
    pub success: bool,
    /// Human-readable message describing the result.
    pub message: String,
    /// Optional JSON data containing tool-specific output.
    pub data: Option<Value>,
}

impl ToolOutput {
    /// Creates a successful output with the given message and no data.
    pub fn success<T: Into<String>>(message: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    /// Creates a successful output with the given message and associated data.
    pub fn success_with_data<T: Into<String>>(message: T, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Creates an error output with the given message.
    pub fn error<T: Into<String>>(message: T) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Trait for implementing executable tools that can be invoked by the agent.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the directive tag this tool answers to.
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of what this tool does and its parameters.
    fn description(&self) -> &'static str;

    /// Returns an example directive showing how the model should invoke this tool.
    fn usage(&self) -> &'static str;

    /// Whether a successful run leaves files in the conversation workspace.
    fn produces_files(&self) -> bool {
        false
    }

    /// Executes the tool with the provided input parameters.
    ///
    /// # Errors
    ///
    /// Returns a `ToolError` if the input is invalid or execution fails.
    async fn execute(&self, input: ToolInput, context: &ToolContext) -> Result<ToolOutput>;
}
