//! Components shared by every conversation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nexus_core::{AgentSettings, ConversationId, ModelProvider};
use nexus_tooling::ToolRegistry;

use crate::dispatcher::ToolDispatcher;
use crate::heuristics::{ExecutionTriggers, QuestionDetector};
use crate::prompt::system_prompt;
use crate::task_manager::TaskListManager;
use crate::vocabulary::DirectiveVocabulary;

/// Provider, tools and policies an [`crate::Orchestrator`] runs with.
///
/// Built once at startup and shared behind an `Arc`.
pub struct AgentRuntime {
    pub(crate) provider: Arc<dyn ModelProvider>,
    pub(crate) dispatcher: ToolDispatcher,
    pub(crate) vocabulary: Arc<DirectiveVocabulary>,
    pub(crate) tasks: TaskListManager,
    pub(crate) questions: QuestionDetector,
    pub(crate) triggers: ExecutionTriggers,
    pub(crate) system_prompt: String,
    pub(crate) temperature: f32,
    pub(crate) max_tokens: u32,
    workspace_root: PathBuf,
}

impl AgentRuntime {
    /// Runtime using `registry` for tools.
    pub fn new(settings: &AgentSettings, provider: Arc<dyn ModelProvider>, registry: ToolRegistry) -> Self {
        let vocabulary = Arc::new(DirectiveVocabulary::default());
        let task_file = settings.workspace.task_list_file.clone();
        Self {
            provider,
            system_prompt: system_prompt(&registry, &task_file),
            dispatcher: ToolDispatcher::new(registry, Arc::clone(&vocabulary), settings.call_timeout()),
            vocabulary,
            tasks: TaskListManager::new(task_file),
            questions: QuestionDetector::default(),
            triggers: ExecutionTriggers::default(),
            temperature: settings.provider.temperature,
            max_tokens: settings.provider.max_tokens,
            workspace_root: settings.workspace.root.clone(),
        }
    }

    /// Runtime with the built-in tool set.
    pub fn from_settings(settings: &AgentSettings, provider: Arc<dyn ModelProvider>) -> Self {
        Self::new(settings, provider, ToolRegistry::with_defaults(settings))
    }

    /// Place conversation workspaces under `root`.
    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Replace the execution trigger phrases.
    #[must_use]
    pub fn with_triggers(mut self, triggers: ExecutionTriggers) -> Self {
        self.triggers = triggers;
        self
    }

    /// Replace the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Active model provider.
    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    /// Shared tool dispatcher.
    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// System prompt sent with every request.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Root directory of all conversation workspaces.
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Workspace directory for `conversation`.
    ///
    /// Characters outside `[A-Za-z0-9_-]` are replaced so an identifier can
    /// never name a path outside the root.
    pub fn workspace_for(&self, conversation: &ConversationId) -> PathBuf {
        let safe: String = conversation
            .as_str()
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
            .collect();
        self.workspace_root.join(safe)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures::stream;
    use nexus_core::{FragmentStream, ModelRequest, Result};

    use super::*;

    struct Silent;

    #[async_trait]
    impl ModelProvider for Silent {
        fn name(&self) -> &'static str {
            "silent"
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn stream(&self, _request: &ModelRequest) -> Result<FragmentStream> {
            let fragments: FragmentStream = Box::pin(stream::empty());
            Ok(fragments)
        }
    }

    #[test]
    fn test_workspace_ids_cannot_escape_root() {
        let runtime = AgentRuntime::from_settings(&AgentSettings::default(), Arc::new(Silent))
            .with_workspace_root("/srv/work");
        assert_eq!(
            runtime.workspace_for(&ConversationId::from("../../etc")),
            PathBuf::from("/srv/work/______etc")
        );
        assert_eq!(
            runtime.workspace_for(&ConversationId::from("abc-123_x")),
            PathBuf::from("/srv/work/abc-123_x")
        );
    }

    #[test]
    fn test_settings_flow_into_runtime() {
        let mut settings = AgentSettings::default();
        settings.provider.temperature = 0.2;
        settings.workspace.task_list_file = "plan.md".to_owned();
        let runtime = AgentRuntime::from_settings(&settings, Arc::new(Silent));
        assert!((runtime.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(runtime.tasks.file_name(), "plan.md");
        assert!(runtime.system_prompt().contains("plan.md"));
        assert_eq!(runtime.dispatcher().registry().len(), 7);
    }
}
