//! Sandbox tool — run one shell command with a timeout.
//!
//! Every outcome is text for the model: non-zero exits, timeouts and spawn
//! failures included. The tool itself never returns `Err`.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use coralclaw_core::error::ToolError;
use coralclaw_core::tool::{Tool, ToolResult};
use tokio::process::Command;
use tracing::{debug, warn};

/// Name the model uses to call the sandbox.
pub const SANDBOX_TOOL_NAME: &str = "run_command";

/// Default per-command timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Runs a single shell command and returns its output.
pub struct SandboxTool {
    default_timeout_secs: u64,
}

impl SandboxTool {
    pub fn new(default_timeout_secs: u64) -> Self {
        Self {
            default_timeout_secs,
        }
    }

    /// Run `command` and render the outcome.
    pub async fn run(&self, command: &str, timeout_secs: u64, cwd: Option<&str>) -> ToolResult {
        let command = command.trim();
        if command.is_empty() {
            return ToolResult::failed("Error: empty command");
        }

        let cwd = match cwd.map(resolve_dir) {
            Some(Err(path)) => {
                return ToolResult::failed(format!(
                    "Error: cwd is not a directory: {}",
                    path.display()
                ));
            }
            Some(Ok(path)) => Some(path),
            None => None,
        };

        debug!(command = %command, timeout_secs, "Executing sandbox command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.kill_on_drop(true);
        if let Some(dir) = &cwd {
            cmd.current_dir(dir);
        }

        let limit = Duration::from_secs(timeout_secs);
        let output = match tokio::time::timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolResult::failed(format!("Error: {e}")),
            Err(_) => {
                warn!(command = %command, timeout_secs, "Sandbox command timed out");
                return ToolResult::failed(format!(
                    "Error: command timed out after {timeout_secs} seconds"
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            let out = stdout.trim();
            return ToolResult::ok(if out.is_empty() { "(no output)" } else { out });
        }

        let code = output.status.code().unwrap_or(-1);
        debug!(command = %command, exit_code = code, "Sandbox command failed");
        let text = format!("exit code {code}\n{stdout}\n{stderr}");
        ToolResult::failed(text.trim())
    }
}

impl Default for SandboxTool {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_SECS)
    }
}

/// Expand `~` and make absolute. The error carries the path that was checked.
fn resolve_dir(cwd: &str) -> Result<PathBuf, PathBuf> {
    let path = coralclaw_config::expand_home(cwd);
    let path = std::path::absolute(&path).unwrap_or(path);
    if path.is_dir() { Ok(path) } else { Err(path) }
}

#[async_trait]
impl Tool for SandboxTool {
    fn name(&self) -> &str {
        SANDBOX_TOOL_NAME
    }

    fn description(&self) -> &str {
        concat!(
            "Run a single basic Linux shell command. Use for reading files, listing dirs, ",
            "grep, etc. No interactive or long-running commands."
        )
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to run (e.g. 'ls -la', 'cat file.txt')."
                },
                "timeout": {
                    "type": "integer",
                    "description": format!(
                        "Timeout in seconds (default {}).",
                        self.default_timeout_secs
                    ),
                    "default": self.default_timeout_secs
                },
                "cwd": {
                    "type": "string",
                    "description": "Working directory (optional)."
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let command = arguments["command"].as_str().unwrap_or_default();
        let timeout_secs = arguments["timeout"]
            .as_u64()
            .or_else(|| arguments["timeout"].as_f64().filter(|t| *t >= 0.0).map(|t| t as u64))
            .unwrap_or(self.default_timeout_secs);
        let cwd = arguments["cwd"].as_str().filter(|c| !c.is_empty());

        Ok(self.run(command, timeout_secs, cwd).await)
    }
}
