//! Sequential execution of parsed tool calls.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use nexus_core::{Conversation, Message, Parameters, ToolCall, ToolResult};
use nexus_tooling::{ToolError, ToolInput, ToolRegistry};
use serde_json::Value;
use tokio::time;
use tracing::{info, warn};

use crate::turn::Turn;
use crate::vocabulary::DirectiveVocabulary;

/// Parameter keys that may carry a workspace placeholder.
const WORKSPACE_KEYS: &[&str] = &["sandbox_id", "sandboxId", "workspace_id", "workspaceId"];

/// Prefixes identifying a placeholder value such as `[sandbox_id]`.
const PLACEHOLDER_PREFIXES: &[&str] = &["[sandbox", "[workspace"];

/// Runs tool calls one at a time and records their results.
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: ToolRegistry,
    vocabulary: Arc<DirectiveVocabulary>,
    timeout: Duration,
}

impl ToolDispatcher {
    /// Dispatcher over `registry` with a per-call time bound.
    pub fn new(registry: ToolRegistry, vocabulary: Arc<DirectiveVocabulary>, timeout: Duration) -> Self {
        Self {
            registry,
            vocabulary,
            timeout,
        }
    }

    /// Registered tools.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute `calls` in order. A failing call never stops the rest.
    pub async fn dispatch_all(
        &self,
        calls: &[ToolCall],
        conversation: &mut Conversation,
        turn: &mut Turn,
    ) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.dispatch(call, conversation, turn).await);
        }
        results
    }

    /// Execute one call, emit its lifecycle events and append its result
    /// to the conversation. Every failure is captured in the returned result.
    pub async fn dispatch(
        &self,
        call: &ToolCall,
        conversation: &mut Conversation,
        turn: &mut Turn,
    ) -> ToolResult {
        let started_at = Utc::now();
        let parameters = substitute_workspace_placeholders(&call.parameters, conversation.workspace_id());
        let args = Value::Object(parameters.clone().into_iter().collect());

        turn.emitter()
            .tool_started(turn.message_id(), call.name.clone(), call.index, args.clone());
        info!("Executing tool {} (#{})", call.name, call.index);

        let tool_name = self.vocabulary.tool_for(&call.name);
        let result = match self.registry.lookup(tool_name) {
            Err(err) => ToolResult::failed(call, err.to_string(), started_at),
            Ok(tool) => {
                let context = Turn::tool_context(conversation);
                let input = ToolInput { params: args };
                match time::timeout(self.timeout, tool.execute(input, &context)).await {
                    Err(_elapsed) => {
                        let err = ToolError::Timeout {
                            tool: call.name.clone(),
                            seconds: self.timeout.as_secs(),
                        };
                        ToolResult::failed(call, err.to_string(), started_at)
                    }
                    Ok(Err(err)) => ToolResult::failed(call, err.to_string(), started_at),
                    Ok(Ok(output)) if output.success => {
                        if tool.produces_files() && conversation.workspace_id().is_none() {
                            let workspace_id = format!("local-workspace-{}", conversation.id());
                            info!("Established workspace {workspace_id}");
                            conversation.establish_workspace(workspace_id);
                        }
                        ToolResult::succeeded(call, output.message, output.data, started_at)
                    }
                    Ok(Ok(output)) => ToolResult {
                        data: output.data,
                        ..ToolResult::failed(call, output.message, started_at)
                    },
                }
            }
        };

        if result.success {
            turn.say(&format!("✅ {}\n", result.message));
        } else {
            warn!("Tool {} failed: {}", call.name, result.message);
            turn.say(&format!("❌ {} failed: {}\n", call.name, result.message));
        }

        turn.emitter().tool_completed(turn.message_id(), &result);
        conversation.push(Message::tool_result(result.clone()));
        result
    }
}

/// Replace placeholder workspace values with the established workspace id.
///
/// Values are left untouched when no workspace has been established yet.
pub fn substitute_workspace_placeholders(parameters: &Parameters, workspace_id: Option<&str>) -> Parameters {
    let Some(workspace_id) = workspace_id else {
        return parameters.clone();
    };
    parameters
        .iter()
        .map(|(key, value)| {
            let is_placeholder = WORKSPACE_KEYS.contains(&key.as_str())
                && value
                    .as_str()
                    .is_some_and(|text| PLACEHOLDER_PREFIXES.iter().any(|prefix| text.starts_with(prefix)));
            let value = if is_placeholder {
                Value::String(workspace_id.to_owned())
            } else {
                value.clone()
            };
            (key.clone(), value)
        })
        .collect()
}
