//! Path resolution confined to a conversation workspace.

use std::path::{Component, Path, PathBuf};

use tokio::fs;

use crate::tool::{Result, ToolError, ToolInput};

/// Parameter names accepted for a file path.
pub const PATH_KEYS: &[&str] = &["path", "file_path", "filePath", "filename"];

/// Strip sandbox-style absolute prefixes so paths stay relative to the workspace.
pub fn normalize(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_prefix = trimmed.strip_prefix("/workspace/").unwrap_or(trimmed);
    without_prefix.trim_start_matches('/')
}

/// Resolve `raw` inside `root`, rejecting anything that escapes it.
///
/// The workspace directory is created on demand. With `create_parents`, missing
/// parent directories of the target are created as well.
///
/// # Errors
/// Returns `InvalidInput` for empty or escaping paths and `Io` when directories cannot be created.
pub async fn resolve(root: &Path, raw: &str, create_parents: bool) -> Result<PathBuf> {
    let relative = Path::new(normalize(raw));
    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
    {
        return Err(ToolError::InvalidInput(format!(
            "Path '{raw}' is outside the allowed directory"
        )));
    }

    fs::create_dir_all(root).await?;
    let canonical_root = fs::canonicalize(root).await?;
    let mut full_path = canonical_root.clone();
    full_path.extend(
        relative
            .components()
            .filter(|component| matches!(component, Component::Normal(_))),
    );
    if full_path == canonical_root {
        return Ok(full_path);
    }

    if create_parents && let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    if let Some(parent) = full_path.parent()
        && let Ok(canonical_parent) = fs::canonicalize(parent).await
        && !canonical_parent.starts_with(&canonical_root)
    {
        return Err(ToolError::InvalidInput(format!(
            "Path '{raw}' is outside the allowed directory"
        )));
    }

    Ok(full_path)
}

/// Read the path parameter from `input` under any accepted alias.
///
/// # Errors
/// Returns `InvalidInput` when no path parameter is present.
pub fn path_param<'input>(tool: &str, input: &'input ToolInput) -> Result<&'input str> {
    input.require_str(tool, PATH_KEYS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result as AnyResult;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_strips_sandbox_prefixes() {
        assert_eq!(normalize("/workspace/report.md"), "report.md");
        assert_eq!(normalize("/notes/a.md"), "notes/a.md");
        assert_eq!(normalize(" plain.txt "), "plain.txt");
    }

    #[tokio::test]
    async fn test_resolve_creates_parents() -> AnyResult<()> {
        let temp = TempDir::new()?;
        let root = temp.path().join("conv");
        let path = resolve(&root, "deep/nested/file.md", true).await?;
        assert!(path.ends_with("deep/nested/file.md"));
        assert!(root.join("deep/nested").is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_workspace_root_itself() -> AnyResult<()> {
        let temp = TempDir::new()?;
        let root = fs::canonicalize(temp.path()).await?;
        assert_eq!(resolve(temp.path(), ".", false).await?, root);
        assert_eq!(resolve(temp.path(), "", false).await?, root);
        assert_eq!(resolve(temp.path(), "/workspace/", false).await?, root);
        assert_eq!(resolve(temp.path(), "./notes/./a.md", false).await?, root.join("notes").join("a.md"));
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_rejects_escape() -> AnyResult<()> {
        let temp = TempDir::new()?;
        let result = resolve(temp.path(), "../outside.txt", true).await;
        assert!(matches!(result, Err(ToolError::InvalidInput(_))));
        let result = resolve(temp.path(), "a/../../outside.txt", false).await;
        assert!(matches!(result, Err(ToolError::InvalidInput(_))));
        Ok(())
    }
}
