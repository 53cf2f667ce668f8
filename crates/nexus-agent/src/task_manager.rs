//! Drives the workspace task list: planning, execution passes and completion marks.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use nexus_core::{
    Conversation, Error, MarkOutcome, Parameters, Result, Task, TaskClassifier, TaskList, ToolCall, mark_complete,
};
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::dispatcher::ToolDispatcher;
use crate::routines::{Findings, RoutineStep, compile_document, routine_for};
use crate::turn::Turn;

/// Prefix of the files the search tool saves.
const SEARCH_RESULTS_PREFIX: &str = "search_results_";

/// Longest operator request quoted in a default plan.
const MAX_TOPIC_CHARS: usize = 80;

/// Outcome of one execution pass over the task list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Tasks marked complete during the pass
    pub completed: Vec<u32>,
    /// Tasks whose routine had a failing step; they stay pending
    pub failed: Vec<u32>,
    /// Tasks skipped because the document no longer matched
    pub skipped: Vec<u32>,
    /// Pending lines left in the document afterwards
    pub remaining: usize,
}

impl PassReport {
    /// Whether every task in the document is now complete.
    pub fn all_complete(&self) -> bool {
        self.remaining == 0
    }
}

/// Owns the task list document in each conversation workspace.
#[derive(Debug, Clone)]
pub struct TaskListManager {
    file_name: String,
    classifier: TaskClassifier,
}

impl TaskListManager {
    /// Manager for the document named `file_name`.
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            classifier: TaskClassifier::default(),
        }
    }

    /// Use a custom classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: TaskClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Document file name.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Path of the document inside `workspace`.
    pub fn path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.file_name)
    }

    /// Read and parse the document, or `None` when it does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read.
    pub async fn load(&self, workspace: &Path) -> Result<Option<(String, TaskList)>> {
        let path = self.path(workspace);
        match fs::read_to_string(&path).await {
            Ok(text) => {
                let list = TaskList::parse_with(&text, &self.classifier);
                Ok(Some((text, list)))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Write a fresh plan, replacing any existing document.
    ///
    /// # Errors
    /// Returns an error if the workspace cannot be written.
    pub async fn create_plan(
        &self,
        workspace: &Path,
        title: &str,
        objective: &str,
        descriptions: &[String],
    ) -> Result<TaskList> {
        fs::create_dir_all(workspace).await?;
        let document = TaskList::render(title, objective, descriptions);
        fs::write(self.path(workspace), &document).await?;
        info!("Created task list with {} tasks", descriptions.len());
        Ok(TaskList::parse_with(&document, &self.classifier))
    }

    /// Plan used when the model committed to work without writing one.
    ///
    /// # Errors
    /// Returns an error if the workspace cannot be written.
    pub async fn create_default_plan(&self, workspace: &Path, request: &str) -> Result<TaskList> {
        let topic = topic_of(request);
        let descriptions = [
            format!("Research current market conditions for {topic}"),
            format!("Identify opportunities related to {topic}"),
            format!("Research strategies and vehicles for {topic}"),
            "Generate summary of key findings".to_owned(),
            "Create final report with recommendations".to_owned(),
        ];
        self.create_plan(workspace, "Research Plan", request.trim(), &descriptions)
            .await
    }

    /// Mark `task` complete in the document on disk.
    ///
    /// # Errors
    /// Returns an error if the document cannot be read or written.
    pub async fn mark_task(&self, workspace: &Path, task: &Task) -> Result<MarkOutcome> {
        let path = self.path(workspace);
        let text = fs::read_to_string(&path).await?;
        let outcome = mark_complete(&text, task.number, &task.description)?;
        if let MarkOutcome::Marked(updated) = &outcome {
            fs::write(&path, updated).await?;
        }
        Ok(outcome)
    }

    /// Run the routine of every pending task once, in document order.
    ///
    /// A task is marked complete only when all of its steps succeed. Tasks
    /// that changed or vanished on disk since the pass started are skipped.
    ///
    /// # Errors
    /// Returns an error if the document cannot be read or written.
    pub async fn run_pending(
        &self,
        dispatcher: &ToolDispatcher,
        conversation: &mut Conversation,
        turn: &mut Turn,
    ) -> Result<PassReport> {
        let workspace = conversation.workspace_dir().to_path_buf();
        let mut report = PassReport::default();
        let Some((_, list)) = self.load(&workspace).await? else {
            debug!("No task list in {}", workspace.display());
            return Ok(report);
        };

        let pending: Vec<Task> = list.pending().cloned().collect();
        info!("Task pass over {} pending tasks", pending.len());

        for task in pending {
            let still_pending = self
                .load(&workspace)
                .await?
                .and_then(|(_, current)| current.task(task.number).cloned())
                .is_some_and(|current| !current.completed && current.description == task.description);
            if !still_pending {
                let err = Error::DocumentConsistency(format!("task {} changed on disk", task.number));
                warn!("Skipping task: {err}");
                report.skipped.push(task.number);
                continue;
            }

            turn.say(&format!("\n📋 **Task {}**: {}\n", task.number, task.description));
            let calls = self.routine_calls(&task, &workspace, turn).await?;
            let results = dispatcher.dispatch_all(&calls, conversation, turn).await;

            if let Some(failure) = results.iter().find(|result| !result.success) {
                turn.say(&format!("⚠️ Task {} incomplete: {}\n", task.number, failure.message));
                report.failed.push(task.number);
                continue;
            }

            match self.mark_task(&workspace, &task).await? {
                MarkOutcome::Marked(_) | MarkOutcome::AlreadyComplete => {
                    turn.say(&format!("✅ Completed task {}\n", task.number));
                    report.completed.push(task.number);
                }
                MarkOutcome::Missing => {
                    let err = Error::DocumentConsistency(format!("task {} vanished before marking", task.number));
                    warn!("{err}");
                    report.skipped.push(task.number);
                }
            }
        }

        let latest = fs::read_to_string(self.path(&workspace)).await?;
        report.remaining = TaskList::remaining_in(&latest);
        Ok(report)
    }

    async fn routine_calls(&self, task: &Task, workspace: &Path, turn: &mut Turn) -> Result<Vec<ToolCall>> {
        let steps = routine_for(task);
        let first_index = turn.reserve_indices(steps.len());
        let mut calls = Vec::with_capacity(steps.len());

        for (offset, step) in steps.into_iter().enumerate() {
            let mut parameters = Parameters::new();
            let tool = match step {
                RoutineStep::Search { query } => {
                    parameters.insert("query".to_owned(), Value::String(query));
                    "web-search"
                }
                RoutineStep::Document { file_name, title } => {
                    let list = self
                        .load(workspace)
                        .await?
                        .map(|(_, list)| list)
                        .unwrap_or_default();
                    let findings = collect_findings(workspace).await?;
                    let content = compile_document(title, &list, &findings);
                    parameters.insert("path".to_owned(), Value::String(file_name.to_owned()));
                    parameters.insert("content".to_owned(), Value::String(content));
                    "create-file"
                }
            };
            calls.push(ToolCall::new(tool, parameters, first_index + offset));
        }
        Ok(calls)
    }
}

/// Saved search results in the workspace, sorted by file name.
async fn collect_findings(workspace: &Path) -> Result<Vec<Findings>> {
    let mut findings = Vec::new();
    let mut entries = match fs::read_dir(workspace).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(findings),
        Err(err) => return Err(err.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !file_name.starts_with(SEARCH_RESULTS_PREFIX) {
            continue;
        }
        let document = fs::read_to_string(entry.path()).await?;
        findings.push(Findings::from_document(file_name, &document));
    }
    findings.sort_by(|left, right| left.file_name.cmp(&right.file_name));
    Ok(findings)
}

fn topic_of(request: &str) -> String {
    let first_line = request.lines().map(str::trim).find(|line| !line.is_empty()).unwrap_or("the request");
    let topic: String = first_line.chars().take(MAX_TOPIC_CHARS).collect();
    topic.trim_end_matches(['.', '?', '!']).to_owned()
}
