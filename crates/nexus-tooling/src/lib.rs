//! Tool system for the nexus agent.
//!
//! Tools are the capabilities a directive can invoke: file creation, reading,
//! deletion and listing inside the conversation workspace, web search and
//! scraping, and allow-listed command execution. Every tool implements the
//! [`Tool`] trait and is looked up through a shared [`ToolRegistry`].
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::tests_outside_test_module,
        reason = "Allow for tests"
    )
)]

/// Allow-listed command execution.
mod command;
/// Workspace file tools.
mod file_ops;
/// Tool registry.
mod registry;
/// Tool trait, input/output and errors.
mod tool;
/// Web search and scraping.
mod web;
/// Workspace path resolution.
pub mod workspace;

pub use command::ExecuteCommandTool;
pub use file_ops::{CreateFileTool, DeleteFileTool, ListFilesTool, ReadFileTool};
pub use registry::ToolRegistry;
pub use tool::{Result, Tool, ToolContext, ToolError, ToolInput, ToolOutput};
pub use web::{SearchHit, WebScrapeTool, WebSearchTool, fallback_results, html_to_text, sanitize_query};
