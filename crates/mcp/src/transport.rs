//! The transport seam between a provider connection and its server process.

use async_trait::async_trait;
use coralclaw_config::McpServerConfig;
use coralclaw_core::error::McpError;
use coralclaw_core::provider::ToolDefinition;

/// One part of a tool call result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),

    /// Binary payload; only its media type is kept.
    Binary { mime_type: String },

    /// Anything else, already rendered as text.
    Other(String),
}

impl ContentPart {
    /// Render this part for the conversation.
    pub fn render(&self) -> String {
        match self {
            ContentPart::Text(text) | ContentPart::Other(text) => text.clone(),
            ContentPart::Binary { mime_type } => format!("[Binary data: {mime_type}]"),
        }
    }
}

/// A live channel to one tool-provider process.
///
/// `initialize` must succeed before `list_tools` or `call_tool` are valid.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Start the process if needed and perform the protocol handshake.
    async fn initialize(&mut self) -> Result<(), McpError>;

    /// The server's tool catalog, in the order the server lists it.
    async fn list_tools(&mut self) -> Result<Vec<ToolDefinition>, McpError>;

    /// Call one tool and return its result parts in order.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<Vec<ContentPart>, McpError>;

    /// Shut the transport down. Calling it on a transport that never came up
    /// is not an error.
    async fn close(&mut self) -> Result<(), McpError>;
}

/// Creates transports for configured servers.
pub trait TransportSpawner: Send + Sync {
    fn spawn(
        &self,
        name: &str,
        config: &McpServerConfig,
    ) -> Result<Box<dyn ToolTransport>, McpError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_render_as_text() {
        assert_eq!(ContentPart::Text("hi".into()).render(), "hi");
        assert_eq!(
            ContentPart::Binary {
                mime_type: "image/png".into()
            }
            .render(),
            "[Binary data: image/png]"
        );
        assert_eq!(ContentPart::Other("{\"uri\":\"x\"}".into()).render(), "{\"uri\":\"x\"}");
    }
}
