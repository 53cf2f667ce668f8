//! Structured event stream reported to whoever is listening.
//!
//! The emitter holds at most one listener. Events sent while nobody listens
//! are dropped; a turn never waits for or fails because of a listener.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

use crate::ids::MessageId;
use crate::state::AgentState;
use crate::sync::IgnoreLock as _;
use crate::types::ToolResult;

/// Event payload types
pub mod types;

pub use types::{StreamEvent, ToolStatus};

type Listener = mpsc::UnboundedSender<StreamEvent>;

/// Single outward event channel for one conversation.
#[derive(Debug, Clone, Default)]
pub struct EventEmitter {
    /// Currently attached listener, if any
    listener: Arc<Mutex<Option<Listener>>>,
}

impl EventEmitter {
    /// Emitter with no listener attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a fresh listener, replacing any previous one.
    ///
    /// Only events emitted after this call reach the returned receiver.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StreamEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.listener.lock_ignore_poison() = Some(sender);
        receiver
    }

    /// Detach the current listener. In-flight work keeps running.
    pub fn unsubscribe(&self) {
        self.listener.lock_ignore_poison().take();
    }

    /// Sends an event
    pub fn send(&self, event: StreamEvent) {
        let mut listener = self.listener.lock_ignore_poison();
        let Some(sender) = listener.as_ref() else {
            debug!("No listener, dropping {} event", event.kind());
            return;
        };
        if let Err(error) = sender.send(event) {
            warn!("Listener went away, detaching: {error}");
            listener.take();
        }
    }

    /// Sends visible text
    pub fn chunk(&self, message_id: MessageId, content: impl Into<String>) {
        self.send(StreamEvent::AssistantChunk {
            content: content.into(),
            message_id,
        });
    }

    /// Sends a tool detected event
    pub fn tool_detected(&self, message_id: MessageId, tool_name: impl Into<String>) {
        self.send(StreamEvent::ToolDetected {
            tool_name: tool_name.into(),
            message_id,
        });
    }

    /// Sends a tool started event
    pub fn tool_started(
        &self,
        message_id: MessageId,
        tool_name: impl Into<String>,
        tool_index: usize,
        args: Value,
    ) {
        self.send(StreamEvent::ToolStarted {
            tool_name: tool_name.into(),
            tool_index,
            args,
            message_id,
        });
    }

    /// Sends a tool completed event built from a recorded result
    pub fn tool_completed(&self, message_id: MessageId, result: &ToolResult) {
        let (status, payload) = if result.success {
            let payload = result
                .data
                .clone()
                .unwrap_or_else(|| Value::String(result.message.clone()));
            (ToolStatus::Success, Some(payload))
        } else {
            (ToolStatus::Error, None)
        };
        self.send(StreamEvent::ToolCompleted {
            tool_name: result.tool_name.clone(),
            tool_index: result.index,
            status,
            result: payload,
            error: result.error.clone(),
            message_id,
        });
    }

    /// Sends a user question event
    pub fn user_question(&self, message_id: MessageId, question: impl Into<String>) {
        self.send(StreamEvent::UserQuestion {
            question: question.into(),
            message_id,
            waiting_for_response: true,
        });
    }

    /// Sends a message complete event
    pub fn message_complete(&self, message_id: MessageId, content: impl Into<String>) {
        self.send(StreamEvent::MessageComplete {
            message_id,
            content: content.into(),
        });
    }

    /// Sends a state change event
    pub fn state_changed(&self, message_id: MessageId, state: AgentState) {
        self.send(StreamEvent::StateChanged { state, message_id });
    }

    /// Sends a turn-level error event
    pub fn error(&self, message_id: MessageId, error: impl Into<String>) {
        self.send(StreamEvent::Error {
            error: error.into(),
            message_id,
        });
    }

    /// Sends a heartbeat
    pub fn ping(&self) {
        self.send(StreamEvent::Ping {
            timestamp: Utc::now(),
        });
    }

    /// Emit `ping` every `period` until the returned handle is aborted.
    pub fn spawn_heartbeat(&self, period: Duration) -> JoinHandle<()> {
        let emitter = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                emitter.ping();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCall;
    use serde_json::json;

    #[test]
    fn test_wire_format_uses_type_tag_and_camel_case() {
        let id = MessageId::new();
        let event = StreamEvent::ToolStarted {
            tool_name: "web-search".to_owned(),
            tool_index: 2,
            args: json!({"query": "x"}),
            message_id: id,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool_started");
        assert_eq!(value["toolName"], "web-search");
        assert_eq!(value["toolIndex"], 2);
        assert_eq!(value["messageId"], id.to_string());
    }

    #[test]
    fn test_user_question_always_waits() {
        let emitter = EventEmitter::new();
        let mut receiver = emitter.subscribe();
        emitter.user_question(MessageId::new(), "What is your risk tolerance?");
        let value = serde_json::to_value(receiver.try_recv().unwrap()).unwrap();
        assert_eq!(value["type"], "user_question");
        assert_eq!(value["waitingForResponse"], true);
    }

    #[test]
    fn test_tool_completed_error_has_no_result() {
        let emitter = EventEmitter::new();
        let mut receiver = emitter.subscribe();
        let call = ToolCall::new("nope", Default::default(), 0);
        let result = ToolResult::failed(&call, "Tool nope not found", Utc::now());
        emitter.tool_completed(MessageId::new(), &result);

        let value = serde_json::to_value(receiver.try_recv().unwrap()).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "Tool nope not found");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_send_without_listener_is_dropped() {
        let emitter = EventEmitter::new();
        emitter.ping();
        assert!(emitter.listener.lock_ignore_poison().is_none());
    }

    #[test]
    fn test_resubscribe_only_sees_new_events() {
        let emitter = EventEmitter::new();
        let mut first = emitter.subscribe();
        emitter.chunk(MessageId::new(), "one");
        emitter.unsubscribe();
        emitter.chunk(MessageId::new(), "lost");
        let mut second = emitter.subscribe();
        emitter.chunk(MessageId::new(), "two");

        assert!(matches!(first.try_recv().unwrap(), StreamEvent::AssistantChunk { content, .. } if content == "one"));
        assert!(first.try_recv().is_err());
        assert!(matches!(second.try_recv().unwrap(), StreamEvent::AssistantChunk { content, .. } if content == "two"));
        assert!(second.try_recv().is_err());
    }

    #[test]
    fn test_closed_listener_is_detached() {
        let emitter = EventEmitter::new();
        drop(emitter.subscribe());
        emitter.ping();
        assert!(emitter.listener.lock_ignore_poison().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_emits_pings() {
        let emitter = EventEmitter::new();
        let mut receiver = emitter.subscribe();
        let handle = emitter.spawn_heartbeat(Duration::from_secs(15));
        time::sleep(Duration::from_secs(31)).await;
        handle.abort();

        let mut pings = 0;
        while let Ok(event) = receiver.try_recv() {
            assert_eq!(event.kind(), "ping");
            pings += 1;
        }
        assert_eq!(pings, 2);
    }
}
