//! Conversation orchestration for the nexus agent.
//!
//! The orchestrator streams a model response to the operator while hiding
//! tool directives, executes the directives, and works through the task list
//! the model keeps in the conversation workspace.
//!
//! # Architecture
//!
//! - [`StreamTagDetector`]: masks directive markup as fragments arrive
//! - [`ToolCallParser`]: extracts [`nexus_core::ToolCall`]s from a full response
//! - [`ToolDispatcher`]: runs calls sequentially with a time bound each
//! - [`TaskListManager`]: plans, executes and checks off checklist tasks
//! - [`Orchestrator`]: the per-conversation state machine tying these together
//! - [`ConversationRegistry`]: one orchestrator per conversation, one turn at a time
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use nexus_agent::{AgentRuntime, ConversationRegistry};
//! use nexus_core::{AgentSettings, ConversationId, ModelProvider, UserId};
//!
//! # async fn example(provider: Arc<dyn ModelProvider>) -> nexus_core::Result<()> {
//! let settings = AgentSettings::default();
//! let runtime = Arc::new(AgentRuntime::from_settings(&settings, provider));
//! let registry = ConversationRegistry::new(runtime);
//!
//! let id = ConversationId::new();
//! let user = UserId::default();
//! let mut events = registry.subscribe(&id, &user);
//! let outcome = registry.send(&id, &user, "Research renewable energy stocks").await?;
//! println!("{}", outcome.content);
//! while let Ok(event) = events.try_recv() {
//!     println!("{}", event.kind());
//! }
//! # Ok(())
//! # }
//! ```
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::tests_outside_test_module,
        clippy::indexing_slicing,
        reason = "Allow for tests"
    )
)]

/// Streaming directive masking.
pub mod detector;
/// Tool call execution.
pub mod dispatcher;
/// Question and execution heuristics.
pub mod heuristics;
/// Turn loop.
pub mod orchestrator;
/// Directive parsing.
pub mod parser;
/// System prompt.
mod prompt;
/// Task routines.
pub mod routines;
/// Shared runtime.
mod runtime;
/// Conversation registry.
mod sessions;
/// Task list execution.
pub mod task_manager;
/// Per-turn bookkeeping.
mod turn;
/// Directive vocabulary.
pub mod vocabulary;

pub use detector::{DetectorOutput, DetectorState, StreamTagDetector};
pub use dispatcher::{ToolDispatcher, substitute_workspace_placeholders};
pub use heuristics::{ExecutionTriggers, QuestionDetector};
pub use orchestrator::{Orchestrator, TurnOutcome, resume_prompt};
pub use parser::{ParseError, ParseOutcome, ToolCallParser};
pub use prompt::system_prompt;
pub use runtime::AgentRuntime;
pub use sessions::{ConversationRegistry, Session};
pub use task_manager::{PassReport, TaskListManager};
pub use turn::Turn;
pub use vocabulary::{Directive, DirectiveVocabulary};
