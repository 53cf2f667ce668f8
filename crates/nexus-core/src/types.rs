//! Conversation data model: messages, tool calls and tool results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::ids::{ConversationId, MessageId, UserId};
use crate::state::{AgentState, TurnEvent};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The human driving the conversation.
    Operator,
    /// The language model speaking through the agent.
    Agent,
    /// The recorded outcome of a tool call.
    ToolResult,
}

/// Parameters of a tool call, keyed by name.
pub type Parameters = BTreeMap<String, Value>;

/// A structured tool invocation extracted from a directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Tool name as written in the directive
    pub name: String,
    /// Parameter values, strings unless the tool knows better
    pub parameters: Parameters,
    /// When the directive was parsed
    pub created_at: DateTime<Utc>,
    /// Position within the owning turn, starting at zero
    pub index: usize,
}

impl ToolCall {
    /// Create a call with the current timestamp.
    pub fn new(name: impl Into<String>, parameters: Parameters, index: usize) -> Self {
        Self {
            name: name.into(),
            parameters,
            created_at: Utc::now(),
            index,
        }
    }
}

/// Normalized outcome of executing one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Tool that produced this result
    pub tool_name: String,
    /// Index of the originating call
    pub index: usize,
    /// Whether the tool succeeded
    pub success: bool,
    /// Human readable summary
    pub message: String,
    /// Structured payload, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure description, present when `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When execution began
    pub started_at: DateTime<Utc>,
    /// When execution finished
    pub finished_at: DateTime<Utc>,
}

impl ToolResult {
    /// Successful result for `call`.
    pub fn succeeded(
        call: &ToolCall,
        message: impl Into<String>,
        data: Option<Value>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tool_name: call.name.clone(),
            index: call.index,
            success: true,
            message: message.into(),
            data,
            error: None,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Failed result for `call`.
    pub fn failed(call: &ToolCall, error: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        let error = error.into();
        Self {
            tool_name: call.name.clone(),
            index: call.index,
            success: false,
            message: error.clone(),
            data: None,
            error: Some(error),
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// A single entry in a conversation. Never modified after being appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message identifier
    pub id: MessageId,
    /// Author
    pub role: Role,
    /// Text content
    pub content: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Tool calls carried by an agent message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Tool results carried by a tool-result message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content,
            created_at: Utc::now(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    /// Message typed by the operator.
    pub fn operator(content: impl Into<String>) -> Self {
        Self::with_role(Role::Operator, content.into())
    }

    /// Full model response, with the calls parsed out of it.
    pub fn agent(id: MessageId, content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            id,
            tool_calls,
            ..Self::with_role(Role::Agent, content.into())
        }
    }

    /// Record of one executed tool call.
    pub fn tool_result(result: ToolResult) -> Self {
        let content = result.message.clone();
        Self {
            tool_results: vec![result],
            ..Self::with_role(Role::ToolResult, content)
        }
    }
}

/// Per-conversation state owned by exactly one orchestrator.
#[derive(Debug, Clone)]
pub struct Conversation {
    id: ConversationId,
    user_id: UserId,
    workspace_dir: PathBuf,
    messages: Vec<Message>,
    state: AgentState,
    workspace_id: Option<String>,
}

impl Conversation {
    /// Start an empty conversation rooted at `workspace_dir`.
    pub fn new(id: ConversationId, user_id: UserId, workspace_dir: PathBuf) -> Self {
        Self {
            id,
            user_id,
            workspace_dir,
            messages: Vec::new(),
            state: AgentState::Idle,
            workspace_id: None,
        }
    }

    /// Conversation identifier
    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    /// Operator identifier
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Directory owned by this conversation for tool output
    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    /// Messages in arrival order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Current agent state
    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Advance the state machine, rejecting transitions it does not allow.
    ///
    /// # Errors
    /// Returns `Error::InvalidTransition` when `event` is not valid from the current state.
    pub fn apply(&mut self, event: TurnEvent) -> Result<AgentState> {
        self.state = self.state.advance(event)?;
        Ok(self.state)
    }

    /// Identifier of the live workspace, once one has been established
    pub fn workspace_id(&self) -> Option<&str> {
        self.workspace_id.as_deref()
    }

    /// Record the live workspace identifier. The first recorded value wins.
    pub fn establish_workspace(&mut self, workspace_id: impl Into<String>) {
        if self.workspace_id.is_none() {
            self.workspace_id = Some(workspace_id.into());
        }
    }
}
