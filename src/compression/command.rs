//! Builder for running the external encoder with an optional timeout.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

/// Lines of stderr kept in an error message.
const STDERR_TAIL_LINES: usize = 20;

/// Failure to run an external tool to a successful exit.
#[derive(Debug, Error)]
#[error("{tool} {message}")]
pub struct ToolError {
    pub tool: String,
    pub message: String,
}

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// Stdout is discarded. The child is killed if the returned future is
/// dropped, which is how a timeout or an aborted worker stops it.
///
/// # Example
///
/// ```no_run
/// use assetforge::compression::command::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> Result<(), assetforge::compression::command::ToolError> {
/// ToolCommand::new(PathBuf::from("ffmpeg"))
///     .arg("-version")
///     .execute()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl ToolCommand {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time. `None` waits indefinitely.
    pub fn timeout(&mut self, d: Option<Duration>) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Execute the command and require a zero exit status.
    pub async fn execute(&self) -> Result<ToolOutput, ToolError> {
        let tool = self
            .program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string());

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError {
                tool: tool.clone(),
                message: format!("failed to spawn: {e}"),
            })?;

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    return Err(ToolError {
                        tool,
                        message: format!("timed out after {limit:?}"),
                    })
                }
            },
            None => child.wait_with_output().await,
        };

        let output = waited.map_err(|e| ToolError {
            tool: tool.clone(),
            message: format!("I/O error waiting for process: {e}"),
        })?;

        let tool_output = ToolOutput {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !output.status.success() {
            return Err(ToolError {
                tool,
                message: format!(
                    "exited with status {}: {}",
                    output.status,
                    stderr_tail(&tool_output.stderr)
                ),
            });
        }

        Ok(tool_output)
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
