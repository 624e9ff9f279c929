//! MCP servers launched as child processes speaking over stdio.
//!
//! Process spawn and handshake both happen in `initialize`, because the
//! rmcp client performs the handshake as part of serving the transport.

use std::borrow::Cow;

use async_trait::async_trait;
use coralclaw_config::McpServerConfig;
use coralclaw_core::error::McpError;
use coralclaw_core::provider::ToolDefinition;
use rmcp::ServiceExt;
use rmcp::model::{CallToolRequestParams, Content, RawContent, Tool as McpTool};
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::child_process::TokioChildProcess;
use tracing::debug;

use crate::transport::{ContentPart, ToolTransport, TransportSpawner};

/// Spawns [`StdioTransport`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioSpawner;

impl TransportSpawner for StdioSpawner {
    fn spawn(
        &self,
        name: &str,
        config: &McpServerConfig,
    ) -> Result<Box<dyn ToolTransport>, McpError> {
        if config.command.trim().is_empty() {
            return Err(McpError::Spawn {
                server: name.to_string(),
                reason: "empty command".into(),
            });
        }
        Ok(Box::new(StdioTransport::new(name, config.clone())))
    }
}

/// A server process driven through the rmcp client.
pub struct StdioTransport {
    server: String,
    config: McpServerConfig,
    service: Option<RunningService<RoleClient, ()>>,
}

impl StdioTransport {
    pub fn new(server: impl Into<String>, config: McpServerConfig) -> Self {
        Self {
            server: server.into(),
            config,
            service: None,
        }
    }

    fn service(&self) -> Result<&RunningService<RoleClient, ()>, McpError> {
        self.service
            .as_ref()
            .ok_or_else(|| McpError::NotReady(self.server.clone()))
    }
}

#[async_trait]
impl ToolTransport for StdioTransport {
    async fn initialize(&mut self) -> Result<(), McpError> {
        if self.service.is_some() {
            return Err(McpError::Protocol(format!(
                "server '{}' is already initialized",
                self.server
            )));
        }

        // The child inherits our environment; configured vars sit on top
        let mut command = tokio::process::Command::new(&self.config.command);
        command.args(&self.config.args).envs(&self.config.env);

        let transport = TokioChildProcess::new(command).map_err(|e| McpError::Spawn {
            server: self.server.clone(),
            reason: e.to_string(),
        })?;

        let service = ().serve(transport).await.map_err(|e| McpError::Initialization {
            server: self.server.clone(),
            reason: e.to_string(),
        })?;

        debug!(server = %self.server, "MCP handshake complete");
        self.service = Some(service);
        Ok(())
    }

    async fn list_tools(&mut self) -> Result<Vec<ToolDefinition>, McpError> {
        let tools = self
            .service()?
            .list_all_tools()
            .await
            .map_err(|e| McpError::Protocol(e.to_string()))?;

        Ok(tools.into_iter().map(tool_to_definition).collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<Vec<ContentPart>, McpError> {
        let arguments = match arguments {
            serde_json::Value::Object(map) => Some(map),
            serde_json::Value::Null => None,
            other => {
                return Err(McpError::Protocol(format!(
                    "tool arguments must be an object, got {other}"
                )));
            }
        };

        let params = CallToolRequestParams {
            meta: None,
            name: Cow::Owned(name.to_string()),
            arguments,
            task: None,
        };

        let result = self
            .service()?
            .peer()
            .call_tool(params)
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        if result.is_error == Some(true) {
            debug!(server = %self.server, tool = %name, "Server reported a tool error");
        }

        Ok(result.content.iter().map(content_to_part).collect())
    }

    async fn close(&mut self) -> Result<(), McpError> {
        let Some(service) = self.service.take() else {
            return Ok(());
        };
        service.cancel().await.map_err(|e| McpError::Close {
            server: self.server.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

fn tool_to_definition(tool: McpTool) -> ToolDefinition {
    let parameters = if tool.input_schema.is_empty() {
        serde_json::json!({"type": "object", "properties": {}})
    } else {
        serde_json::Value::Object((*tool.input_schema).clone())
    };

    ToolDefinition {
        name: tool.name.to_string(),
        description: tool.description.map(|d| d.to_string()).unwrap_or_default(),
        parameters,
    }
}

fn content_to_part(content: &Content) -> ContentPart {
    match &content.raw {
        RawContent::Text(t) => ContentPart::Text(t.text.clone()),
        RawContent::Image(i) => ContentPart::Binary {
            mime_type: i.mime_type.clone(),
        },
        RawContent::Audio(a) => ContentPart::Binary {
            mime_type: a.mime_type.clone(),
        },
        _ => ContentPart::Other(serde_json::to_string(content).unwrap_or_default()),
    }
}
