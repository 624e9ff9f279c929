//! Built-in local tools for CoralClaw.
//!
//! Currently a single tool: the command sandbox (`run_command`), which the
//! agent treats exactly like a tool served by an MCP server.

pub mod sandbox;

use coralclaw_core::tool::ToolRegistry;

pub use sandbox::{DEFAULT_TIMEOUT_SECS, SANDBOX_TOOL_NAME, SandboxTool};

/// A registry holding the sandbox tool.
pub fn sandbox_registry(default_timeout_secs: u64) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(SandboxTool::new(default_timeout_secs)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use coralclaw_core::tool::ToolInvoker;

    #[tokio::test]
    async fn registry_serves_run_command() {
        let registry = sandbox_registry(30);
        assert!(registry.has_tool(SANDBOX_TOOL_NAME));
        assert_eq!(registry.definitions().len(), 1);

        let output = registry
            .invoke(SANDBOX_TOOL_NAME, serde_json::json!({"command": "echo hi"}))
            .await;
        assert_eq!(output, "hi");
    }
}
