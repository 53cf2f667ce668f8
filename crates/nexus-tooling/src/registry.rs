//! Tool registry for managing available tools.

use std::convert::AsRef;
use std::sync::Arc;
use std::time::Duration;

use nexus_core::AgentSettings;

use crate::command::ExecuteCommandTool;
use crate::file_ops::{CreateFileTool, DeleteFileTool, ListFilesTool, ReadFileTool};
use crate::tool::{Result, Tool, ToolError};
use crate::web::{WebScrapeTool, WebSearchTool};

type ToolList = Arc<Vec<Arc<dyn Tool>>>;

/// Registry for managing available tools.
///
/// Cloning is cheap and clones share the same tool list, so one registry built
/// at startup can serve every conversation.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: ToolList,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: Arc::new(Vec::new()),
        }
    }

    /// Registry holding every built-in tool, configured from `settings`.
    #[must_use]
    pub fn with_defaults(settings: &AgentSettings) -> Self {
        Self::new()
            .with_tool(Arc::new(CreateFileTool))
            .with_tool(Arc::new(ReadFileTool))
            .with_tool(Arc::new(DeleteFileTool))
            .with_tool(Arc::new(ListFilesTool))
            .with_tool(Arc::new(WebSearchTool::new(
                settings.search_api_key(),
                settings.search.default_results,
            )))
            .with_tool(Arc::new(WebScrapeTool::new(settings.tools.max_scrape_chars)))
            .with_tool(Arc::new(ExecuteCommandTool::new(
                settings.tools.allowed_commands.clone(),
                Duration::from_secs(settings.tools.command_timeout_seconds),
                settings.tools.max_output_bytes,
            )))
    }

    /// Add a tool to the registry
    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        Arc::make_mut(&mut self.tools).push(tool);
        self
    }

    /// Get a tool by name, if it exists
    #[must_use]
    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|tool_ref| tool_ref.name() == name)
            .cloned()
    }

    /// Get a tool by name, failing with a message that lists what is available
    ///
    /// # Errors
    /// Returns `ToolError::NotFound` when no tool has this name.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.get_tool(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_owned(),
            available: self.names().join(", "),
        })
    }

    /// Names of all registered tools, in registration order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    /// List all available tools
    #[must_use]
    pub fn list_tools(&self) -> Vec<&dyn Tool> {
        self.tools.iter().map(AsRef::as_ref).collect()
    }

    /// Get number of registered tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ToolContext, ToolInput, ToolOutput};
    use async_trait::async_trait;

    struct MockTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "A mock tool for testing"
        }

        fn usage(&self) -> &'static str {
            "<mock />"
        }

        async fn execute(&self, _input: ToolInput, _context: &ToolContext) -> Result<ToolOutput> {
            Ok(ToolOutput::success("test"))
        }
    }

    /// Tests empty registry initialization.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_empty_registry() {
        let registry = ToolRegistry::default();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    /// Tests retrieving tools from the registry by name.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_get_tool() {
        let registry = ToolRegistry::default().with_tool(Arc::new(MockTool { name: "test-tool" }));

        assert!(registry.get_tool("test-tool").is_some());
        assert!(registry.get_tool("nonexistent").is_none());
    }

    /// Tests that lookup failures name the registered tools.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_lookup_missing_lists_available() {
        let registry = ToolRegistry::default()
            .with_tool(Arc::new(MockTool { name: "one" }))
            .with_tool(Arc::new(MockTool { name: "two" }));

        let Err(error) = registry.lookup("three") else {
            panic!("lookup should fail");
        };
        assert_eq!(error.to_string(), "Tool three not found. Available tools: one, two");
    }

    /// Tests the built-in tool set.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_defaults_register_every_builtin() {
        let registry = ToolRegistry::with_defaults(&AgentSettings::default());
        assert_eq!(
            registry.names(),
            vec![
                "create-file",
                "read-file",
                "delete-file",
                "list-files",
                "web-search",
                "web-scrape",
                "execute-command"
            ]
        );
        assert_eq!(registry.list_tools().len(), 7);
    }

    /// Tests that clones share the same tools.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_clone_shares_tools() {
        let registry = ToolRegistry::default().with_tool(Arc::new(MockTool { name: "shared" }));
        let cloned = registry.clone();
        assert!(Arc::ptr_eq(&registry.tools, &cloned.tools));
    }
}
