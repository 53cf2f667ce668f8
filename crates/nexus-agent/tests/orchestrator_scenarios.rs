//! End-to-end turns through the orchestrator with a scripted provider.

#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::tests_outside_test_module,
        clippy::indexing_slicing,
        reason = "Test allows"
    )
)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use nexus_agent::{AgentRuntime, Orchestrator};
use nexus_core::{AgentSettings, AgentState, ConversationId, Error, Role, StreamEvent, ToolStatus, UserId};
use nexus_providers::MockProvider;
use nexus_tooling::{CreateFileTool, ToolRegistry};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

fn orchestrator(provider: &MockProvider, root: &Path) -> Orchestrator {
    let runtime = AgentRuntime::from_settings(&AgentSettings::default(), Arc::new(provider.clone()))
        .with_workspace_root(root);
    Orchestrator::new(Arc::new(runtime), ConversationId::from("scenario"), UserId::default())
}

fn drain(receiver: &mut UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

fn streamed_text(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::AssistantChunk { content, .. } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

fn kinds(events: &[StreamEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(StreamEvent::kind)
        .filter(|kind| *kind != "assistant_chunk")
        .collect()
}

#[tokio::test]
async fn test_directive_is_hidden_and_executed() -> Result<()> {
    let root = TempDir::new()?;
    let provider = MockProvider::new()
        .with_fragment_size(5)
        .with_default_response("I'll look that up. <web-search query=\"AI trends\"></web-search>");
    let mut agent = orchestrator(&provider, root.path());
    let mut events = agent.emitter().subscribe();

    let outcome = agent.handle_message("What is new in AI?").await?;
    let events = drain(&mut events);
    let text = streamed_text(&events);

    assert!(text.starts_with("I'll look that up. \n\n**Searching Web**\n"));
    assert!(!text.contains("query="));
    assert!(!text.contains("<web-search"));
    assert_eq!(outcome.state, AgentState::Completed);
    assert_eq!(outcome.tool_results.len(), 1);
    assert!(outcome.tool_results[0].success);

    let started = events.iter().find_map(|event| match event {
        StreamEvent::ToolStarted {
            tool_name, tool_index, ..
        } => Some((tool_name.clone(), *tool_index)),
        _ => None,
    });
    assert_eq!(started, Some(("web-search".to_owned(), 0)));
    assert!(events.iter().any(|event| matches!(
        event,
        StreamEvent::ToolCompleted {
            status: ToolStatus::Success,
            ..
        }
    )));
    assert!(
        root.path()
            .join("scenario")
            .join("search_results_ai_trends.md")
            .exists()
    );
    assert_eq!(events.last().map(StreamEvent::kind), Some("message_complete"));
    Ok(())
}

#[tokio::test]
async fn test_todo_list_created_and_completed_in_one_turn() -> Result<()> {
    let root = TempDir::new()?;
    let provider = MockProvider::new().with_default_response(
        "Here is the plan.\n<create-file path=\"todo.md\">\n# Market Plan\n\n## Objective\nUnderstand the market\n\n## Tasks\n[ ] 1. Research current market conditions\n[ ] 2. Create final report\n</create-file>",
    );
    let mut agent = orchestrator(&provider, root.path());

    let outcome = agent.handle_message("Help me understand the market").await?;

    let todo = fs::read_to_string(root.path().join("scenario").join("todo.md"))?;
    assert!(todo.contains("[x] 1. Research current market conditions - COMPLETED"));
    assert!(todo.contains("[x] 2. Create final report - COMPLETED"));
    assert!(!todo.contains("[ ]"));

    let report = outcome.tasks.expect("task pass should run");
    assert_eq!(report.completed, vec![1, 2]);
    assert!(report.all_complete());
    assert!(outcome.content.contains("📋 **Task 1**: Research current market conditions"));
    assert!(outcome.content.contains("✅ Completed task 2"));
    assert!(
        root.path()
            .join("scenario")
            .join("market_analysis_report.md")
            .exists()
    );
    assert_eq!(agent.conversation().workspace_id(), Some("local-workspace-scenario"));
    Ok(())
}

#[tokio::test]
async fn test_question_pauses_then_resumes() -> Result<()> {
    let root = TempDir::new()?;
    let provider = MockProvider::new()
        .with_response("User response to previous questions", "Thanks, noted.")
        .with_default_response("Before I start: What is your risk tolerance?");
    let mut agent = orchestrator(&provider, root.path());
    let mut receiver = agent.emitter().subscribe();

    let outcome = agent.handle_message("Build me a portfolio").await?;
    let events = drain(&mut receiver);

    assert_eq!(outcome.state, AgentState::AwaitingInput);
    assert_eq!(outcome.question.as_deref(), Some("What is your risk tolerance?"));
    let kinds = kinds(&events);
    assert!(!kinds.contains(&"tool_started"));
    let question_at = kinds.iter().position(|kind| *kind == "user_question");
    let complete_at = kinds.iter().position(|kind| *kind == "message_complete");
    assert!(question_at.is_some());
    assert!(question_at < complete_at);

    let outcome = agent.handle_message("Moderate").await?;
    assert_eq!(outcome.state, AgentState::Completed);
    let history = provider.get_call_history();
    assert_eq!(history.len(), 2);
    assert!(history[1].starts_with("User response to previous questions: Moderate"));
    assert!(history[1].ends_with("Now please continue with the next task in your todo list."));
    Ok(())
}

#[tokio::test]
async fn test_unknown_tool_does_not_stop_later_calls() -> Result<()> {
    let root = TempDir::new()?;
    let provider = MockProvider::new().with_default_response(
        "<web-search query=\"x\" /><create-file path=\"a.md\">hello</create-file>",
    );
    let registry = ToolRegistry::new().with_tool(Arc::new(CreateFileTool));
    let runtime = AgentRuntime::new(&AgentSettings::default(), Arc::new(provider), registry)
        .with_workspace_root(root.path());
    let mut agent = Orchestrator::new(Arc::new(runtime), ConversationId::from("d"), UserId::default());
    let mut receiver = agent.emitter().subscribe();

    let outcome = agent.handle_message("go").await?;
    let events = drain(&mut receiver);

    assert_eq!(outcome.state, AgentState::Completed);
    assert!(!outcome.tool_results[0].success);
    assert!(
        outcome.tool_results[0]
            .message
            .contains("Tool web-search not found")
    );
    assert!(outcome.tool_results[1].success);
    assert_eq!(fs::read_to_string(root.path().join("d").join("a.md"))?, "hello");

    let statuses: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::ToolCompleted {
                tool_index, status, ..
            } => Some((*tool_index, *status)),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![(0, ToolStatus::Error), (1, ToolStatus::Success)]);
    Ok(())
}

#[tokio::test]
async fn test_plain_reply_completes_without_tools() -> Result<()> {
    let root = TempDir::new()?;
    let reply = "Hello! Nice to meet you.";
    let provider = MockProvider::new().with_default_response(reply);
    let mut agent = orchestrator(&provider, root.path());
    let mut receiver = agent.emitter().subscribe();

    let outcome = agent.handle_message("hi").await?;
    let events = drain(&mut receiver);

    assert_eq!(outcome.state, AgentState::Completed);
    assert_eq!(outcome.content, reply);
    assert!(outcome.tasks.is_none());
    assert_eq!(
        kinds(&events),
        vec!["state_changed", "state_changed", "message_complete"]
    );
    assert!(!root.path().join("scenario").join("todo.md").exists());

    let roles: Vec<_> = agent
        .conversation()
        .messages()
        .iter()
        .map(|message| message.role)
        .collect();
    assert_eq!(roles, vec![Role::Operator, Role::Agent]);
    Ok(())
}

#[tokio::test]
async fn test_provider_failure_ends_turn_with_error() -> Result<()> {
    let root = TempDir::new()?;
    let provider = MockProvider::new();
    provider.fail_with("service unavailable");
    let mut agent = orchestrator(&provider, root.path());
    let mut receiver = agent.emitter().subscribe();

    let result = agent.handle_message("hi").await;
    let events = drain(&mut receiver);

    assert!(matches!(result, Err(Error::Provider(_))));
    assert_eq!(agent.state(), AgentState::Error);
    assert!(
        events
            .iter()
            .any(|event| matches!(event, StreamEvent::Error { error, .. } if error.contains("service unavailable")))
    );
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, StreamEvent::MessageComplete { .. }))
    );

    // Error is not a busy state, so the next message is accepted.
    assert!(!matches!(agent.handle_message("again").await, Err(Error::Busy(_))));
    Ok(())
}

#[tokio::test]
async fn test_execution_phrase_without_plan_creates_default_plan() -> Result<()> {
    let root = TempDir::new()?;
    let provider = MockProvider::new().with_default_response("Starting Research Execution now.");
    let mut agent = orchestrator(&provider, root.path());

    let outcome = agent.handle_message("Find dividend stocks").await?;

    let todo = fs::read_to_string(root.path().join("scenario").join("todo.md"))?;
    assert!(todo.contains("## Objective\nFind dividend stocks"));
    let report = outcome.tasks.expect("default plan should run");
    assert_eq!(report.completed, vec![1, 2, 3, 4, 5]);
    assert_eq!(report.remaining, 0);
    assert!(outcome.content.contains("📝 Created `todo.md` with 5 tasks"));
    assert!(outcome.content.contains("🎉 All tasks in `todo.md` are complete."));
    Ok(())
}

#[tokio::test]
async fn test_directive_split_mid_tag_matches_unsplit() -> Result<()> {
    let response = "Saving. <create-file path=\"n.md\">body</create-file> Done.";
    let mut outputs = Vec::new();
    for size in [1, 3, 1000] {
        let root = TempDir::new()?;
        let provider = MockProvider::new()
            .with_fragment_size(size)
            .with_default_response(response);
        let mut agent = orchestrator(&provider, root.path());
        outputs.push(agent.handle_message("save").await?.content);
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[1], outputs[2]);
    assert!(outputs[0].starts_with("Saving. \n\n**Creating File**\n\n Done."));
    Ok(())
}

#[tokio::test]
async fn test_directives_run_in_order_under_any_fragmentation() -> Result<()> {
    let response = "Step one. <create-file path=\"a.md\">alpha</create-file> Then <read-file path='a.md' /> and <list-files /> done.";
    for size in [1, 2, 7, 1000] {
        let root = TempDir::new()?;
        let provider = MockProvider::new()
            .with_fragment_size(size)
            .with_default_response(response);
        let mut agent = orchestrator(&provider, root.path());
        let mut receiver = agent.emitter().subscribe();

        let outcome = agent.handle_message("write and check").await?;
        let events = drain(&mut receiver);

        let text = streamed_text(&events);
        for leaked in ["<create-file", "<read-file", "<list-files", "path="] {
            assert!(!text.contains(leaked), "size {size} leaked {leaked:?}: {text:?}");
        }
        assert!(text.starts_with("Step one. \n\n**Creating File**\n"), "size {size}: {text:?}");
        assert!(text.contains(" done."), "size {size}: {text:?}");

        let timeline: Vec<String> = events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::ToolDetected { tool_name, .. } => Some(format!("detected {tool_name}")),
                StreamEvent::ToolStarted { tool_index, .. } => Some(format!("started {tool_index}")),
                StreamEvent::ToolCompleted { tool_index, .. } => Some(format!("completed {tool_index}")),
                _ => None,
            })
            .collect();
        assert_eq!(
            timeline,
            vec![
                "detected create-file",
                "detected read-file",
                "detected list-files",
                "started 0",
                "completed 0",
                "started 1",
                "completed 1",
                "started 2",
                "completed 2",
            ],
            "size {size}"
        );

        assert_eq!(outcome.state, AgentState::Completed);
        assert_eq!(outcome.tool_results.len(), 3);
        assert!(outcome.tool_results.iter().all(|result| result.success), "size {size}");
        assert_eq!(fs::read_to_string(root.path().join("scenario").join("a.md"))?, "alpha");
    }
    Ok(())
}
