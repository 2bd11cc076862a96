//! Shell command execution tool.
//!
//! Runs commands through the platform shell with a bounded timeout and
//! capped output. The process is killed if the timeout expires.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::types::{CallerInfo, RiskLevel, ToolCall, ToolResult};

use super::{opt_i64, opt_str, require_str, Tool};

/// Default command timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Per-stream output cap, in characters.
const MAX_STREAM_CHARS: usize = 10_000;

/// Executes shell commands on the host.
pub struct ShellTool {
    default_timeout: Duration,
    default_workdir: Option<String>,
}

impl ShellTool {
    /// Create a shell tool with the given defaults.
    pub fn new(default_timeout: Duration, default_workdir: Option<String>) -> Self {
        Self {
            default_timeout,
            default_workdir,
        }
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS), None)
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn description(&self) -> &'static str {
        "Run a command in the operating system shell. Returns stdout, stderr, \
         and the exit code."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Command to execute"},
                "timeout": {"type": "integer", "description": "Timeout in seconds"},
                "working_directory": {"type": "string", "description": "Directory to run in"},
            },
            "required": ["command"],
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Moderate
    }

    async fn execute(&self, call: &ToolCall, _caller: &CallerInfo) -> anyhow::Result<ToolResult> {
        let command = match require_str(call, "command") {
            Ok(c) => c.to_owned(),
            Err(e) => return Ok(ToolResult::fail(&call.id, self.name(), e.to_string())),
        };
        let timeout = opt_i64(call, "timeout")
            .and_then(|t| u64::try_from(t).ok())
            .map_or(self.default_timeout, Duration::from_secs);
        let workdir = opt_str(call, "working_directory")
            .map(str::to_owned)
            .or_else(|| self.default_workdir.clone());

        info!(command = %command, timeout_secs = timeout.as_secs(), "running shell command");

        let mut process = shell_command(&command);
        process
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &workdir {
            process.current_dir(dir);
        }

        let child = match process.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Ok(ToolResult::fail(
                    &call.id,
                    self.name(),
                    format!("failed to start command: {e}"),
                ))
            }
        };

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Ok(ToolResult::fail(
                    &call.id,
                    self.name(),
                    format!("command failed: {e}"),
                ))
            }
            // kill_on_drop reaps the process when the future is dropped.
            Err(_) => {
                return Ok(ToolResult::fail(
                    &call.id,
                    self.name(),
                    format!("timed out: command did not finish in {}s", timeout.as_secs()),
                ))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);

        let mut parts = Vec::new();
        if !stdout.trim().is_empty() {
            parts.push(format!(
                "STDOUT:\n{}",
                crate::agent::journal::truncate_chars(stdout.trim(), MAX_STREAM_CHARS)
            ));
        }
        if !stderr.trim().is_empty() {
            parts.push(format!(
                "STDERR:\n{}",
                crate::agent::journal::truncate_chars(stderr.trim(), MAX_STREAM_CHARS)
            ));
        }
        parts.push(format!("EXIT CODE: {exit_code}"));
        let content = parts.join("\n\n");

        if output.status.success() {
            Ok(ToolResult::ok(&call.id, self.name(), content))
        } else {
            Ok(ToolResult::fail(&call.id, self.name(), content))
        }
    }
}

/// Build the platform shell invocation for a command line.
#[cfg(unix)]
fn shell_command(command: &str) -> tokio::process::Command {
    let mut process = tokio::process::Command::new("sh");
    process.arg("-c").arg(command);
    process
}

/// Build the platform shell invocation for a command line.
#[cfg(windows)]
fn shell_command(command: &str) -> tokio::process::Command {
    let mut process = tokio::process::Command::new("cmd");
    process.arg("/C").arg(command);
    process
}
