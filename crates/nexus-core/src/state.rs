//! Agent state machine for a single conversation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Authoritative state of a conversation's orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// No turn in progress
    #[default]
    Idle,
    /// Model is being invoked or its output reviewed
    Thinking,
    /// Tool calls or task routines are running
    ExecutingTool,
    /// Paused until the operator answers a question
    AwaitingInput,
    /// Last turn finished normally
    Completed,
    /// Last turn failed
    Error,
}

/// Something that happened during a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEvent {
    /// An operator message arrived
    MessageReceived,
    /// The response asked for tools to be run
    ExecutionRequired,
    /// The response asked the operator something
    QuestionDetected,
    /// Tools and tasks for this pass have been dispatched
    ToolsDispatched,
    /// Nothing left to do for this turn
    TurnFinished,
    /// The model call failed
    Failed,
}

impl AgentState {
    /// Compute the next state, or fail if `event` is not allowed here.
    ///
    /// # Errors
    /// Returns `Error::InvalidTransition` for transitions outside the machine.
    pub fn advance(self, event: TurnEvent) -> Result<Self> {
        use AgentState::{AwaitingInput, Completed, Error as Failed, ExecutingTool, Idle, Thinking};
        match (self, event) {
            (Idle | Completed | Failed | AwaitingInput, TurnEvent::MessageReceived)
            | (ExecutingTool, TurnEvent::ToolsDispatched) => Ok(Thinking),
            (Thinking, TurnEvent::ExecutionRequired) => Ok(ExecutingTool),
            (Thinking, TurnEvent::QuestionDetected) => Ok(AwaitingInput),
            (Thinking, TurnEvent::TurnFinished) => Ok(Completed),
            (Thinking | ExecutingTool, TurnEvent::Failed) => Ok(Failed),
            (state, event) => Err(Error::InvalidTransition(format!("{event:?} while {state}"))),
        }
    }

    /// Whether a turn is currently running.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Thinking | Self::ExecutingTool)
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Thinking => "thinking",
            Self::ExecutingTool => "executing_tool",
            Self::AwaitingInput => "awaiting_input",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_execution_path() -> Result<()> {
        let state = AgentState::Idle
            .advance(TurnEvent::MessageReceived)?
            .advance(TurnEvent::ExecutionRequired)?
            .advance(TurnEvent::ToolsDispatched)?
            .advance(TurnEvent::TurnFinished)?;
        assert_eq!(state, AgentState::Completed);
        Ok(())
    }

    #[test]
    fn test_question_pauses_and_resumes() -> Result<()> {
        let paused = AgentState::Idle
            .advance(TurnEvent::MessageReceived)?
            .advance(TurnEvent::QuestionDetected)?;
        assert_eq!(paused, AgentState::AwaitingInput);
        assert_eq!(paused.advance(TurnEvent::MessageReceived)?, AgentState::Thinking);
        Ok(())
    }

    #[test]
    fn test_terminal_states_restart() -> Result<()> {
        for state in [AgentState::Completed, AgentState::Error] {
            assert_eq!(state.advance(TurnEvent::MessageReceived)?, AgentState::Thinking);
        }
        Ok(())
    }

    #[test]
    fn test_busy_states_reject_new_message() {
        for state in [AgentState::Thinking, AgentState::ExecutingTool] {
            assert!(state.is_busy());
            let error = state.advance(TurnEvent::MessageReceived).unwrap_err();
            assert!(matches!(error, Error::InvalidTransition(_)));
        }
    }

    #[test]
    fn test_idle_cannot_fail_or_dispatch() {
        assert!(AgentState::Idle.advance(TurnEvent::Failed).is_err());
        assert!(AgentState::Idle.advance(TurnEvent::ToolsDispatched).is_err());
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&AgentState::ExecutingTool).unwrap(),
            "\"executing_tool\""
        );
        assert_eq!(AgentState::AwaitingInput.to_string(), "awaiting_input");
    }
}
