//! Core types and traits for the nexus agent.
//!
//! This crate provides the conversation data model, the agent state machine,
//! the structured event stream, the task list document format, configuration,
//! and the streaming model provider trait shared by every other crate.
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::tests_outside_test_module,
        reason = "Allow for tests"
    )
)]

/// Configuration loading and defaults.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Structured event stream.
pub mod events;
/// Identifier newtypes.
pub mod ids;
/// Agent state machine.
pub mod state;
/// Lock helpers.
pub mod sync;
/// Task list document format.
pub mod task_list;
/// Trait definitions for model providers.
pub mod traits;
/// Conversation data model.
pub mod types;

pub use config::{AgentSettings, ProviderKind};
pub use error::{Error, Result};
pub use events::{EventEmitter, StreamEvent, ToolStatus};
pub use ids::{ConversationId, MessageId, UserId};
pub use state::{AgentState, TurnEvent};
pub use sync::IgnoreLock;
pub use task_list::{MarkOutcome, Task, TaskCategory, TaskClassifier, TaskList, mark_complete};
pub use traits::{FragmentStream, ModelProvider, ModelRequest, PromptMessage, PromptRole};
pub use types::{Conversation, Message, Parameters, Role, ToolCall, ToolResult};
