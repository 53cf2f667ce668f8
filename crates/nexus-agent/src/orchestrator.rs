//! Per-conversation turn loop.
//!
//! A turn runs:
//!
//! 1. Record the operator message. A reply to an outstanding question is
//!    wrapped so the model resumes its plan.
//! 2. Stream the model response through the tag detector. Visible text and
//!    placeholders go out as chunks while directives stay hidden.
//! 3. Parse the complete response for tool calls.
//! 4. If the response asks the operator something, pause in `awaiting_input`.
//! 5. Otherwise, if execution is warranted, dispatch the calls in order and
//!    run one pass over the task list.
//! 6. Emit `message_complete`.

use std::sync::Arc;

use futures::StreamExt as _;
use nexus_core::{
    AgentState, Conversation, ConversationId, EventEmitter, Error, Message, MessageId, ModelRequest, Result,
    ToolResult, TurnEvent, UserId,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::detector::{DetectorOutput, StreamTagDetector};
use crate::parser::ToolCallParser;
use crate::runtime::AgentRuntime;
use crate::task_manager::PassReport;
use crate::turn::Turn;

/// Shown after a question so the operator knows the agent is paused.
const WAITING_NOTICE: &str = "\n⏳ **Waiting for your response** - Please answer the questions above to continue.\n";

/// What one call to [`Orchestrator::handle_message`] produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    /// Agent message identifier
    pub message_id: MessageId,
    /// State at the end of the turn
    pub state: AgentState,
    /// Visible text streamed to the operator
    pub content: String,
    /// Raw model response, directives included
    pub response: String,
    /// Results of the directives in the response, in order
    pub tool_results: Vec<ToolResult>,
    /// Question put to the operator, when the turn paused
    pub question: Option<String>,
    /// Task pass summary, when one ran
    pub tasks: Option<PassReport>,
}

#[derive(Debug, Default)]
struct StreamedResponse {
    raw: String,
    prose: String,
}

/// Drives one conversation.
pub struct Orchestrator {
    runtime: Arc<AgentRuntime>,
    conversation: Conversation,
    emitter: EventEmitter,
    parser: ToolCallParser,
}

impl Orchestrator {
    /// Orchestrator for a new conversation.
    pub fn new(runtime: Arc<AgentRuntime>, conversation_id: ConversationId, user_id: UserId) -> Self {
        let workspace = runtime.workspace_for(&conversation_id);
        let parser = ToolCallParser::new(Arc::clone(&runtime.vocabulary));
        Self {
            conversation: Conversation::new(conversation_id, user_id, workspace),
            emitter: EventEmitter::new(),
            parser,
            runtime,
        }
    }

    /// Conversation state and history.
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Event channel for this conversation.
    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    /// Current agent state.
    pub fn state(&self) -> AgentState {
        self.conversation.state()
    }

    /// Run one operator turn.
    ///
    /// # Errors
    /// Returns `Busy` if a turn is already in progress, or the provider error
    /// that ended the turn. Tool failures never end a turn.
    pub async fn handle_message(&mut self, text: &str) -> Result<TurnOutcome> {
        let previous = self.conversation.state();
        if previous.is_busy() {
            return Err(Error::Busy(self.conversation.id().clone()));
        }

        let message_id = MessageId::new();
        let mut turn = Turn::new(self.emitter.clone(), message_id);
        let prompt = if previous == AgentState::AwaitingInput {
            resume_prompt(text)
        } else {
            text.to_owned()
        };
        info!("Conversation {}: operator message ({} chars)", self.conversation.id(), text.len());
        self.conversation.push(Message::operator(prompt));
        turn.transition(&mut self.conversation, TurnEvent::MessageReceived)?;

        let response = match self.stream_response(&mut turn).await {
            Ok(response) => response,
            Err(err) => return Err(self.fail(&turn, err)),
        };

        let calls = self.parser.parse_calls(&response.raw);
        debug!("Parsed {} tool calls", calls.len());
        self.conversation
            .push(Message::agent(message_id, response.raw.clone(), calls.clone()));

        if self.runtime.questions.detect(&response.prose) {
            let question = self.runtime.questions.extract(&response.prose);
            info!("Pausing for operator input: {question}");
            let state = turn.transition(&mut self.conversation, TurnEvent::QuestionDetected)?;
            turn.emitter().user_question(message_id, question.clone());
            turn.say(WAITING_NOTICE);
            return Ok(Self::finish(turn, state, response.raw, Vec::new(), Some(question), None));
        }

        if !self
            .runtime
            .triggers
            .should_execute(&response.prose, !calls.is_empty())
        {
            let state = turn.transition(&mut self.conversation, TurnEvent::TurnFinished)?;
            return Ok(Self::finish(turn, state, response.raw, Vec::new(), None, None));
        }

        turn.transition(&mut self.conversation, TurnEvent::ExecutionRequired)?;
        let mut tool_results = Vec::new();
        if !calls.is_empty() {
            turn.reserve_indices(calls.len());
            turn.say(&format!("\n🔧 Executing {} tool call(s)\n", calls.len()));
            tool_results = self
                .runtime
                .dispatcher
                .dispatch_all(&calls, &mut self.conversation, &mut turn)
                .await;
        }

        let tasks = self.run_task_pass(&mut turn, calls.is_empty(), text).await;
        turn.transition(&mut self.conversation, TurnEvent::ToolsDispatched)?;
        if let Some(report) = &tasks {
            summarize(&mut turn, report, self.runtime.tasks.file_name());
        }

        let state = turn.transition(&mut self.conversation, TurnEvent::TurnFinished)?;
        Ok(Self::finish(turn, state, response.raw, tool_results, None, tasks))
    }

    async fn stream_response(&self, turn: &mut Turn) -> Result<StreamedResponse> {
        let runtime = &self.runtime;
        let request = ModelRequest::from_history(runtime.system_prompt.clone(), self.conversation.messages())
            .with_sampling(runtime.temperature, runtime.max_tokens);
        let mut stream = runtime.provider.stream(&request).await?;
        let mut detector = StreamTagDetector::new(Arc::clone(&runtime.vocabulary));
        let mut response = StreamedResponse::default();

        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            response.raw.push_str(&fragment);
            for output in detector.feed(&fragment) {
                Self::forward(output, turn, &mut response.prose);
            }
        }
        for output in detector.finish() {
            Self::forward(output, turn, &mut response.prose);
        }

        debug!(
            "{} streamed {} chars ({} visible)",
            runtime.provider.name(),
            response.raw.len(),
            response.prose.len()
        );
        Ok(response)
    }

    fn forward(output: DetectorOutput, turn: &mut Turn, prose: &mut String) {
        match output {
            DetectorOutput::Visible(text) => {
                prose.push_str(&text);
                turn.say(&text);
            }
            DetectorOutput::DirectiveStarted { tag, placeholder } => {
                turn.emitter().tool_detected(turn.message_id(), tag);
                turn.say(&placeholder);
            }
            DetectorOutput::DirectiveFinished { tag, raw } => {
                debug!("Directive <{tag}> closed ({} chars)", raw.len());
            }
            DetectorOutput::DirectiveAbandoned { tag, .. } => {
                warn!("Response ended inside <{tag}>");
            }
        }
    }

    /// Plan when needed, then run one pass. `None` when no task list applies.
    async fn run_task_pass(&mut self, turn: &mut Turn, no_directives: bool, request: &str) -> Option<PassReport> {
        let runtime = Arc::clone(&self.runtime);
        let workspace = self.conversation.workspace_dir().to_path_buf();

        match runtime.tasks.load(&workspace).await {
            Ok(Some(_)) => {}
            Ok(None) if no_directives => match runtime.tasks.create_default_plan(&workspace, request).await {
                Ok(list) => {
                    turn.say(&format!(
                        "\n📝 Created `{}` with {} tasks\n",
                        runtime.tasks.file_name(),
                        list.tasks.len()
                    ));
                }
                Err(err) => {
                    warn!("Could not create task list: {err}");
                    turn.say(&format!("⚠️ Could not create task list: {err}\n"));
                    return None;
                }
            },
            Ok(None) => return None,
            Err(err) => {
                warn!("Could not read task list: {err}");
                return None;
            }
        }

        match runtime
            .tasks
            .run_pending(&runtime.dispatcher, &mut self.conversation, turn)
            .await
        {
            Ok(report) => Some(report),
            Err(err) => {
                warn!("Task pass stopped: {err}");
                turn.say(&format!("⚠️ Task list pass stopped: {err}\n"));
                None
            }
        }
    }

    fn fail(&mut self, turn: &Turn, err: Error) -> Error {
        error!("Turn failed in conversation {}: {err}", self.conversation.id());
        if let Err(transition) = turn.transition(&mut self.conversation, TurnEvent::Failed) {
            warn!("{transition}");
        }
        turn.emitter().error(turn.message_id(), err.to_string());
        err
    }

    fn finish(
        turn: Turn,
        state: AgentState,
        response: String,
        tool_results: Vec<ToolResult>,
        question: Option<String>,
        tasks: Option<PassReport>,
    ) -> TurnOutcome {
        let content = turn.visible().to_owned();
        turn.emitter().message_complete(turn.message_id(), content.clone());
        TurnOutcome {
            message_id: turn.message_id(),
            state,
            content,
            response,
            tool_results,
            question,
            tasks,
        }
    }
}

/// Wrap an answer to an outstanding question.
pub fn resume_prompt(answer: &str) -> String {
    format!("User response to previous questions: {answer}\n\nNow please continue with the next task in your todo list.")
}

fn summarize(turn: &mut Turn, report: &PassReport, file_name: &str) {
    if !report.failed.is_empty() {
        let numbers = report
            .failed
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        turn.say(&format!("\n⚠️ Tasks still pending after failures: {numbers}\n"));
    } else if report.all_complete() && !report.completed.is_empty() {
        turn.say(&format!("\n🎉 All tasks in `{file_name}` are complete.\n"));
    }
}
