//! File tools confined to the conversation workspace.

use async_trait::async_trait;
use serde_json::json;
use tokio::fs;
use tracing::info;

use crate::tool::{Result, Tool, ToolContext, ToolError, ToolInput, ToolOutput};
use crate::workspace::{self, path_param};

/// Writes a file, creating parent directories as needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateFileTool;

#[async_trait]
impl Tool for CreateFileTool {
    fn name(&self) -> &'static str {
        "create-file"
    }

    fn description(&self) -> &'static str {
        "Create or overwrite a file in the workspace. The directive body is the file content."
    }

    fn usage(&self) -> &'static str {
        "<create-file path=\"report.md\">\n# Title\nFile content here\n</create-file>"
    }

    fn produces_files(&self) -> bool {
        true
    }

    async fn execute(&self, input: ToolInput, context: &ToolContext) -> Result<ToolOutput> {
        let path = path_param(self.name(), &input)?;
        let content = input.get_str(&["content"]).unwrap_or_default();
        let full_path = workspace::resolve(&context.workspace, path, true).await?;

        info!(
            "CreateFileTool: writing {} bytes to {:?} (resolved from '{}')",
            content.len(),
            full_path,
            path
        );
        fs::write(&full_path, content).await.map_err(|err| {
            ToolError::ExecutionFailed(format!("Failed to write file '{path}': {err}"))
        })?;

        let relative = workspace::normalize(path);
        Ok(ToolOutput::success_with_data(
            format!("Created file {relative} ({} bytes)", content.len()),
            json!({ "path": relative, "bytes": content.len() }),
        ))
    }
}

/// Reads a file as UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read-file"
    }

    fn description(&self) -> &'static str {
        "Read a text file from the workspace."
    }

    fn usage(&self) -> &'static str {
        "<read-file path=\"todo.md\" />"
    }

    async fn execute(&self, input: ToolInput, context: &ToolContext) -> Result<ToolOutput> {
        let path = path_param(self.name(), &input)?;
        let full_path = workspace::resolve(&context.workspace, path, false).await?;

        let content = fs::read_to_string(&full_path).await.map_err(|err| {
            ToolError::ExecutionFailed(format!("Failed to read file '{path}': {err}"))
        })?;

        Ok(ToolOutput::success_with_data(
            format!("Read {} bytes from {}", content.len(), workspace::normalize(path)),
            json!({ "path": workspace::normalize(path), "content": content }),
        ))
    }
}

/// Deletes a single file.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteFileTool;

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &'static str {
        "delete-file"
    }

    fn description(&self) -> &'static str {
        "Delete a file from the workspace."
    }

    fn usage(&self) -> &'static str {
        "<delete-file path=\"draft.md\" />"
    }

    async fn execute(&self, input: ToolInput, context: &ToolContext) -> Result<ToolOutput> {
        let path = path_param(self.name(), &input)?;
        let full_path = workspace::resolve(&context.workspace, path, false).await?;

        if fs::metadata(&full_path).await.is_ok_and(|meta| meta.is_dir()) {
            return Err(ToolError::InvalidInput(format!("'{path}' is a directory")));
        }
        fs::remove_file(&full_path).await.map_err(|err| {
            ToolError::ExecutionFailed(format!("Failed to delete file '{path}': {err}"))
        })?;

        info!("DeleteFileTool: removed {:?}", full_path);
        Ok(ToolOutput::success(format!(
            "Deleted file {}",
            workspace::normalize(path)
        )))
    }
}

/// Lists the entries of a workspace directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &'static str {
        "list-files"
    }

    fn description(&self) -> &'static str {
        "List files in a workspace directory. Defaults to the workspace root."
    }

    fn usage(&self) -> &'static str {
        "<list-files />"
    }

    async fn execute(&self, input: ToolInput, context: &ToolContext) -> Result<ToolOutput> {
        let path = input.get_str(workspace::PATH_KEYS).unwrap_or(".");
        let dir = workspace::resolve(&context.workspace, path, false).await?;

        let mut reader = fs::read_dir(&dir).await.map_err(|err| {
            ToolError::ExecutionFailed(format!("Failed to list directory '{path}': {err}"))
        })?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await?.is_dir() {
                name.push('/');
            }
            entries.push(name);
        }
        entries.sort();

        Ok(ToolOutput::success_with_data(
            format!("Found {} entries", entries.len()),
            json!({ "path": workspace::normalize(path), "files": entries }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result as AnyResult;
    use nexus_core::{ConversationId, UserId};
    use std::fs as std_fs;
    use serde_json::Value;
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> ToolContext {
        ToolContext::new(ConversationId::from("conv"), UserId::default(), temp.path())
    }

    fn input(params: Value) -> ToolInput {
        ToolInput { params }
    }

    #[tokio::test]
    async fn test_create_then_read() -> AnyResult<()> {
        let temp = TempDir::new()?;
        let ctx = context(&temp);

        let created = CreateFileTool
            .execute(input(json!({"path": "/workspace/notes/a.md", "content": "hello"})), &ctx)
            .await?;
        assert!(created.success);
        assert_eq!(created.message, "Created file notes/a.md (5 bytes)");

        let read = ReadFileTool
            .execute(input(json!({"file_path": "notes/a.md"})), &ctx)
            .await?;
        assert_eq!(
            read.data.as_ref().and_then(|data| data["content"].as_str()),
            Some("hello")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_create_requires_path() -> AnyResult<()> {
        let temp = TempDir::new()?;
        let result = CreateFileTool
            .execute(input(json!({"content": "x"})), &context(&temp))
            .await;
        assert!(matches!(result, Err(ToolError::InvalidInput(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_rejects_traversal() -> AnyResult<()> {
        let temp = TempDir::new()?;
        let result = CreateFileTool
            .execute(input(json!({"path": "../escape.md", "content": "x"})), &context(&temp))
            .await;
        assert!(matches!(result, Err(ToolError::InvalidInput(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_read_missing_file_fails() -> AnyResult<()> {
        let temp = TempDir::new()?;
        let result = ReadFileTool
            .execute(input(json!({"path": "nope.md"})), &context(&temp))
            .await;
        assert!(matches!(result, Err(ToolError::ExecutionFailed(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_file() -> AnyResult<()> {
        let temp = TempDir::new()?;
        let ctx = context(&temp);
        std_fs::write(temp.path().join("gone.txt"), "bye")?;

        let output = DeleteFileTool.execute(input(json!({"path": "gone.txt"})), &ctx).await?;
        assert!(output.success);
        assert!(!temp.path().join("gone.txt").exists());

        let again = DeleteFileTool.execute(input(json!({"path": "gone.txt"})), &ctx).await;
        assert!(again.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_list_files_marks_directories() -> AnyResult<()> {
        let temp = TempDir::new()?;
        std_fs::create_dir(temp.path().join("sub"))?;
        std_fs::write(temp.path().join("b.txt"), "")?;
        std_fs::write(temp.path().join("a.txt"), "")?;

        let output = ListFilesTool.execute(input(json!({})), &context(&temp)).await?;
        let files = output.data.map(|data| data["files"].clone());
        assert_eq!(files, Some(json!(["a.txt", "b.txt", "sub/"])));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_files_at_explicit_root() -> AnyResult<()> {
        let temp = TempDir::new()?;
        std_fs::write(temp.path().join("notes.md"), "")?;

        for path in [".", "/workspace/", "./"] {
            let output = ListFilesTool
                .execute(input(json!({ "path": path })), &context(&temp))
                .await?;
            assert!(output.success, "path {path}");
            assert_eq!(output.data.map(|data| data["files"].clone()), Some(json!(["notes.md"])));
        }
        Ok(())
    }
}
