use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::MessageId;
use crate::state::AgentState;

/// Outcome reported by a `tool_completed` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// Tool returned success
    Success,
    /// Tool was missing, failed or timed out
    Error,
}

/// One entry of the outward progress protocol, serialized as one JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StreamEvent {
    /// Visible text to append
    AssistantChunk {
        /// Text to append
        content: String,
        /// Message being streamed
        message_id: MessageId,
    },
    /// The detector entered a directive; the tool has not run yet
    ToolDetected {
        /// Canonical tool name
        tool_name: String,
        /// Message being streamed
        message_id: MessageId,
    },
    /// Dispatch of a tool call is beginning
    ToolStarted {
        /// Tool being invoked
        tool_name: String,
        /// Position within the turn
        tool_index: usize,
        /// Parameters passed to the tool
        args: Value,
        /// Message the call belongs to
        message_id: MessageId,
    },
    /// Dispatch of a tool call finished
    ToolCompleted {
        /// Tool that ran
        tool_name: String,
        /// Position within the turn
        tool_index: usize,
        /// Success or error
        status: ToolStatus,
        /// Payload on success
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Failure description on error
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Message the call belongs to
        message_id: MessageId,
    },
    /// The agent paused to ask the operator something
    UserQuestion {
        /// Extracted question text
        question: String,
        /// Message containing the question
        message_id: MessageId,
        /// Always true
        waiting_for_response: bool,
    },
    /// The turn finished; `content` is the full visible text
    MessageComplete {
        /// Message that finished
        message_id: MessageId,
        /// Final visible text
        content: String,
    },
    /// The agent state changed
    StateChanged {
        /// New state
        state: AgentState,
        /// Message being processed
        message_id: MessageId,
    },
    /// The turn failed
    Error {
        /// Failure description
        error: String,
        /// Message that failed
        message_id: MessageId,
    },
    /// Liveness heartbeat
    Ping {
        /// When the heartbeat was emitted
        timestamp: DateTime<Utc>,
    },
}

impl StreamEvent {
    /// Wire name of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AssistantChunk { .. } => "assistant_chunk",
            Self::ToolDetected { .. } => "tool_detected",
            Self::ToolStarted { .. } => "tool_started",
            Self::ToolCompleted { .. } => "tool_completed",
            Self::UserQuestion { .. } => "user_question",
            Self::MessageComplete { .. } => "message_complete",
            Self::StateChanged { .. } => "state_changed",
            Self::Error { .. } => "error",
            Self::Ping { .. } => "ping",
        }
    }
}
