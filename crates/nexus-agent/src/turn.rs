//! Per-turn bookkeeping shared by the orchestrator, dispatcher and task manager.

use nexus_core::{AgentState, Conversation, EventEmitter, MessageId, Result, TurnEvent};
use nexus_tooling::ToolContext;
use tracing::debug;

/// One operator turn in progress.
///
/// Collects the visible response text, hands out tool indices, and mirrors
/// state transitions onto the event stream.
#[derive(Debug)]
pub struct Turn {
    emitter: EventEmitter,
    message_id: MessageId,
    visible: String,
    next_tool_index: usize,
}

impl Turn {
    /// Start a turn that reports under `message_id`.
    pub fn new(emitter: EventEmitter, message_id: MessageId) -> Self {
        Self {
            emitter,
            message_id,
            visible: String::new(),
            next_tool_index: 0,
        }
    }

    /// Identifier of the agent message being produced.
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// Emitter for this turn's events.
    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    /// Append visible text and stream it as a chunk.
    pub fn say(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.visible.push_str(text);
        self.emitter.chunk(self.message_id, text);
    }

    /// Visible text produced so far.
    pub fn visible(&self) -> &str {
        &self.visible
    }

    /// Reserve `count` consecutive tool indices, returning the first.
    pub fn reserve_indices(&mut self, count: usize) -> usize {
        let first = self.next_tool_index;
        self.next_tool_index += count;
        first
    }

    /// Apply a state machine event and broadcast the new state.
    ///
    /// # Errors
    /// Returns `InvalidTransition` when the event is not valid in the current state.
    pub fn transition(&self, conversation: &mut Conversation, event: TurnEvent) -> Result<AgentState> {
        let state = conversation.apply(event)?;
        debug!("Conversation {} -> {state}", conversation.id());
        self.emitter.state_changed(self.message_id, state);
        Ok(state)
    }

    /// Tool context for the conversation's workspace.
    pub fn tool_context(conversation: &Conversation) -> ToolContext {
        ToolContext::new(
            conversation.id().clone(),
            conversation.user_id().clone(),
            conversation.workspace_dir(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use nexus_core::{ConversationId, StreamEvent, UserId};

    use super::*;

    #[test]
    fn test_say_streams_and_accumulates() {
        let emitter = EventEmitter::new();
        let mut receiver = emitter.subscribe();
        let mut turn = Turn::new(emitter, MessageId::new());

        turn.say("Hello ");
        turn.say("");
        turn.say("world");

        assert_eq!(turn.visible(), "Hello world");
        let mut chunks = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            if let StreamEvent::AssistantChunk { content, .. } = event {
                chunks.push(content);
            }
        }
        assert_eq!(chunks, vec!["Hello ", "world"]);
    }

    #[test]
    fn test_transition_emits_state() {
        let emitter = EventEmitter::new();
        let mut receiver = emitter.subscribe();
        let turn = Turn::new(emitter, MessageId::new());
        let mut conversation =
            Conversation::new(ConversationId::from("c1"), UserId::default(), PathBuf::from("w"));

        let state = turn
            .transition(&mut conversation, TurnEvent::MessageReceived)
            .unwrap();
        assert_eq!(state, AgentState::Thinking);
        assert!(matches!(
            receiver.try_recv(),
            Ok(StreamEvent::StateChanged {
                state: AgentState::Thinking,
                ..
            })
        ));
        assert!(turn.transition(&mut conversation, TurnEvent::ToolsDispatched).is_err());
    }

    #[test]
    fn test_reserve_indices_is_monotonic() {
        let mut turn = Turn::new(EventEmitter::new(), MessageId::new());
        assert_eq!(turn.reserve_indices(3), 0);
        assert_eq!(turn.reserve_indices(2), 3);
        assert_eq!(turn.reserve_indices(0), 5);
    }
}
