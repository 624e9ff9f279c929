//! Tool traits — the abstraction over agent capabilities.
//!
//! Two seams live here:
//! - [`Tool`]: one locally executed capability (e.g. the command sandbox).
//! - [`ToolInvoker`]: anything that can list tools and run one by name,
//!   returning text. Local registries and the MCP connection manager both
//!   implement it, so the turn engine treats them identically.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// The result of a local tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "run_command").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Something that can advertise tools and execute them by name.
///
/// `invoke` never fails: unknown names and execution errors come back as
/// text so the model can see them as ordinary tool output.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Tool descriptors in provider-schema form.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Whether `name` resolves to a tool here.
    fn has_tool(&self, name: &str) -> bool;

    /// Run the named tool and render its outcome as text.
    async fn invoke(&self, name: &str, arguments: serde_json::Value) -> String;
}

/// Text returned for a tool name nobody serves.
pub fn not_found_message(name: &str) -> String {
    format!("Error: {}", ToolError::NotFound(name.to_string()))
}

/// A registry of locally executed tools.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(arguments).await
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolInvoker for ToolRegistry {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    async fn invoke(&self, name: &str, arguments: serde_json::Value) -> String {
        match self.execute(name, arguments).await {
            Ok(result) => result.output,
            Err(ToolError::NotFound(name)) => not_found_message(&name),
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "Local tool failed");
                format!("Error calling tool '{name}': {e}")
            }
        }
    }
}
