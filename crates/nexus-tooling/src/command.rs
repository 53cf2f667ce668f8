//! Allow-listed command execution inside the conversation workspace.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::fs;
use tokio::process::Command;
use tokio::time;
use tracing::debug;

use crate::tool::{Result, Tool, ToolContext, ToolError, ToolInput, ToolOutput};

/// Shell metacharacters that would let a command chain, redirect or substitute.
/// Line breaks count since `bash -c` runs each line as its own command.
const FORBIDDEN_FRAGMENTS: &[&str] = &[";", "|", "&", "$(", "`", ">", "<", "\n", "\r"];

/// Tool that runs an allow-listed command inside the conversation workspace.
#[derive(Debug, Clone)]
pub struct ExecuteCommandTool {
    /// Programs permitted as the first word
    allowed: Vec<String>,
    /// Wall-clock bound per command
    timeout: Duration,
    /// Cap on captured bytes per stream
    max_output_bytes: usize,
}

impl ExecuteCommandTool {
    /// Create a tool with an explicit policy.
    pub fn new(allowed: Vec<String>, timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            allowed,
            timeout,
            max_output_bytes,
        }
    }

    /// Reject commands outside the policy.
    ///
    /// # Errors
    /// Returns `InvalidInput` for empty, chained or non-allow-listed commands.
    pub fn validate(&self, command: &str) -> Result<()> {
        let program = command
            .split_whitespace()
            .next()
            .ok_or_else(|| ToolError::InvalidInput("Command is empty".to_owned()))?;

        if let Some(fragment) = FORBIDDEN_FRAGMENTS
            .iter()
            .find(|fragment| command.contains(**fragment))
        {
            return Err(ToolError::InvalidInput(format!(
                "Command contains forbidden sequence '{}'",
                fragment.escape_debug()
            )));
        }

        if !self.allowed.iter().any(|allowed| allowed == program) {
            return Err(ToolError::InvalidInput(format!(
                "Command '{program}' is not allowed. Allowed commands: {}",
                self.allowed.join(", ")
            )));
        }
        Ok(())
    }

    fn capture(&self, bytes: &[u8]) -> String {
        let kept = bytes.len().min(self.max_output_bytes);
        let mut text = String::from_utf8_lossy(&bytes[..kept]).into_owned();
        if bytes.len() > kept {
            text.push_str("\n[output truncated]");
        }
        text
    }
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &'static str {
        "execute-command"
    }

    fn description(&self) -> &'static str {
        "Run a single allow-listed command in the workspace. Pipes, redirects and chaining are rejected."
    }

    fn usage(&self) -> &'static str {
        "<execute-command command=\"python3 analyze.py\" />"
    }

    fn produces_files(&self) -> bool {
        true
    }

    async fn execute(&self, input: ToolInput, context: &ToolContext) -> Result<ToolOutput> {
        let command = input.require_str(self.name(), &["command", "content"])?.trim();
        self.validate(command)?;
        fs::create_dir_all(&context.workspace).await?;

        debug!("Executing command in {:?}: {}", context.workspace, command);
        let child = Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&context.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ToolError::ExecutionFailed(format!("Command execution failed: {err}")))?;

        let output = time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_elapsed| ToolError::Timeout {
                tool: self.name().to_owned(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|err| ToolError::ExecutionFailed(format!("Command execution failed: {err}")))?;

        let exit_code = output.status.code().unwrap_or(-1);
        let data = json!({
            "stdout": self.capture(&output.stdout),
            "stderr": self.capture(&output.stderr),
            "exit_code": exit_code,
        });

        debug!("Command completed with exit code {}: {}", exit_code, command);

        if output.status.success() {
            Ok(ToolOutput::success_with_data(
                format!("Command executed successfully (exit code: {exit_code})"),
                data,
            ))
        } else {
            Ok(ToolOutput {
                success: false,
                message: format!("Command failed with exit code: {exit_code}"),
                data: Some(data),
            })
        }
    }
}
