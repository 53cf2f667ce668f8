//! Conversation registry keyed by conversation id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use nexus_core::{ConversationId, Error, EventEmitter, IgnoreLock as _, Result, StreamEvent, UserId};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::info;

use crate::orchestrator::{Orchestrator, TurnOutcome};
use crate::runtime::AgentRuntime;

/// One live conversation.
#[derive(Clone)]
pub struct Session {
    orchestrator: Arc<AsyncMutex<Orchestrator>>,
    emitter: EventEmitter,
}

impl Session {
    /// Event channel, usable while a turn is running.
    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    /// Shared handle to the orchestrator.
    pub fn orchestrator(&self) -> &Arc<AsyncMutex<Orchestrator>> {
        &self.orchestrator
    }
}

/// Holds one orchestrator per conversation and serializes turns within each.
pub struct ConversationRegistry {
    runtime: Arc<AgentRuntime>,
    sessions: Mutex<HashMap<ConversationId, Session>>,
}

impl ConversationRegistry {
    /// Empty registry sharing `runtime` across conversations.
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self {
            runtime,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Existing session for `id`, or a new one owned by `user`.
    pub fn get_or_create(&self, id: &ConversationId, user: &UserId) -> Session {
        let mut sessions = self.sessions.lock_ignore_poison();
        sessions
            .entry(id.clone())
            .or_insert_with(|| {
                info!("Starting conversation {id} for {user}");
                let orchestrator = Orchestrator::new(Arc::clone(&self.runtime), id.clone(), user.clone());
                Session {
                    emitter: orchestrator.emitter().clone(),
                    orchestrator: Arc::new(AsyncMutex::new(orchestrator)),
                }
            })
            .clone()
    }

    /// Session for `id`, if one exists.
    pub fn get(&self, id: &ConversationId) -> Option<Session> {
        self.sessions.lock_ignore_poison().get(id).cloned()
    }

    /// Drop the session for `id`. Returns whether one existed.
    pub fn evict(&self, id: &ConversationId) -> bool {
        let removed = self.sessions.lock_ignore_poison().remove(id);
        if let Some(session) = &removed {
            session.emitter.unsubscribe();
            info!("Evicted conversation {id}");
        }
        removed.is_some()
    }

    /// Number of live conversations.
    pub fn len(&self) -> usize {
        self.sessions.lock_ignore_poison().len()
    }

    /// Whether no conversation is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attach a listener to the conversation's event stream.
    pub fn subscribe(&self, id: &ConversationId, user: &UserId) -> mpsc::UnboundedReceiver<StreamEvent> {
        self.get_or_create(id, user).emitter.subscribe()
    }

    /// Run one turn.
    ///
    /// # Errors
    /// Returns `Busy` when a turn is already running for `id`, otherwise
    /// whatever the turn itself returns.
    pub async fn send(&self, id: &ConversationId, user: &UserId, text: &str) -> Result<TurnOutcome> {
        let session = self.get_or_create(id, user);
        let Ok(mut orchestrator) = session.orchestrator.try_lock() else {
            return Err(Error::Busy(id.clone()));
        };
        orchestrator.handle_message(text).await
    }
}
