//! One tool-provider process and its catalog.

use coralclaw_core::error::McpError;
use coralclaw_core::provider::ToolDefinition;
use tracing::debug;

use crate::transport::{ContentPart, ToolTransport};

/// Liveness of a [`ProviderConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Failed,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// A named connection to one tool-provider process.
pub struct ProviderConnection {
    name: String,
    transport: Box<dyn ToolTransport>,
    state: ConnectionState,
    tools: Vec<ToolDefinition>,
}

impl ProviderConnection {
    pub fn new(name: impl Into<String>, transport: Box<dyn ToolTransport>) -> Self {
        Self {
            name: name.into(),
            transport,
            state: ConnectionState::Connecting,
            tools: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// The catalog fetched during [`initialize`](Self::initialize).
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Handshake, then fetch the tool catalog.
    ///
    /// Valid once, from `Connecting`. The connection becomes `Ready` only when
    /// both steps succeed, and `Failed` otherwise.
    pub async fn initialize(&mut self) -> Result<(), McpError> {
        if self.state != ConnectionState::Connecting {
            return Err(McpError::Protocol(format!(
                "cannot initialize '{}' while {}",
                self.name, self.state
            )));
        }

        let result = async {
            self.transport.initialize().await?;
            self.transport.list_tools().await
        }
        .await;

        match result {
            Ok(tools) => {
                debug!(server = %self.name, tools = tools.len(), "Tool catalog loaded");
                self.tools = tools;
                self.state = ConnectionState::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Failed;
                Err(e)
            }
        }
    }

    /// Mark a connection whose setup was abandoned.
    pub(crate) fn mark_failed(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Failed;
        }
    }

    /// Call a tool and flatten its result parts into one text block.
    ///
    /// Transport errors are returned as-is; the manager turns them into text.
    pub async fn invoke(
        &self,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<String, McpError> {
        if !self.is_ready() {
            return Err(McpError::NotReady(self.name.clone()));
        }
        let parts = self.transport.call_tool(tool, arguments).await?;
        Ok(render_parts(&parts))
    }

    /// Close the transport. Idempotent; the connection ends up `Closed`
    /// even when the transport reports an error.
    pub async fn close(&mut self) -> Result<(), McpError> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        let result = self.transport.close().await;
        self.state = ConnectionState::Closed;
        result.map_err(|e| match e {
            McpError::Close { .. } => e,
            other => McpError::Close {
                server: self.name.clone(),
                reason: other.to_string(),
            },
        })
    }
}

/// Join result parts with newlines; binary parts become placeholders.
pub fn render_parts(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .map(ContentPart::render)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Scripted transport that records lifecycle calls.
    struct Scripted {
        fail_handshake: bool,
        fail_close: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Scripted {
        fn boxed(
            fail_handshake: bool,
            fail_close: bool,
        ) -> (Box<dyn ToolTransport>, Arc<Mutex<Vec<&'static str>>>) {
            let log = Arc::new(Mutex::new(Vec::new()));
            let transport: Box<dyn ToolTransport> = Box::new(Self {
                fail_handshake,
                fail_close,
                log: log.clone(),
            });
            (transport, log)
        }
    }

    #[async_trait]
    impl ToolTransport for Scripted {
        async fn initialize(&mut self) -> Result<(), McpError> {
            self.log.lock().unwrap().push("initialize");
            if self.fail_handshake {
                return Err(McpError::Initialization {
                    server: "scripted".into(),
                    reason: "bad protocol version".into(),
                });
            }
            Ok(())
        }

        async fn list_tools(&mut self) -> Result<Vec<ToolDefinition>, McpError> {
            self.log.lock().unwrap().push("list_tools");
            Ok(vec![ToolDefinition {
                name: "snapshot".into(),
                description: "Take a screenshot".into(),
                parameters: serde_json::json!({"type": "object"}),
            }])
        }

        async fn call_tool(
            &self,
            _name: &str,
            _arguments: serde_json::Value,
        ) -> Result<Vec<ContentPart>, McpError> {
            Ok(vec![
                ContentPart::Text("captured".into()),
                ContentPart::Binary {
                    mime_type: "image/png".into(),
                },
                ContentPart::Text("done".into()),
            ])
        }

        async fn close(&mut self) -> Result<(), McpError> {
            self.log.lock().unwrap().push("close");
            if self.fail_close {
                return Err(McpError::Transport("pipe closed".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn initialize_then_invoke() {
        let (transport, log) = Scripted::boxed(false, false);
        let mut conn = ProviderConnection::new("screen", transport);
        assert_eq!(conn.state(), ConnectionState::Connecting);

        conn.initialize().await.unwrap();
        assert!(conn.is_ready());
        assert_eq!(conn.tools()[0].name, "snapshot");
        assert_eq!(*log.lock().unwrap(), vec!["initialize", "list_tools"]);

        let text = conn.invoke("snapshot", serde_json::json!({})).await.unwrap();
        assert_eq!(text, "captured\n[Binary data: image/png]\ndone");
    }

    #[tokio::test]
    async fn failed_handshake_skips_catalog() {
        let (transport, log) = Scripted::boxed(true, false);
        let mut conn = ProviderConnection::new("screen", transport);

        assert!(conn.initialize().await.is_err());
        assert_eq!(conn.state(), ConnectionState::Failed);
        assert!(conn.tools().is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["initialize"]);
        assert!(matches!(
            conn.invoke("snapshot", serde_json::json!({})).await,
            Err(McpError::NotReady(_))
        ));
    }

    #[tokio::test]
    async fn initialize_is_once_only() {
        let (transport, _) = Scripted::boxed(false, false);
        let mut conn = ProviderConnection::new("screen", transport);
        conn.initialize().await.unwrap();
        assert!(matches!(conn.initialize().await, Err(McpError::Protocol(_))));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_always_closes() {
        let (transport, log) = Scripted::boxed(false, true);
        let mut conn = ProviderConnection::new("screen", transport);
        conn.initialize().await.unwrap();

        let err = conn.close().await.unwrap_err();
        assert!(matches!(err, McpError::Close { ref server, .. } if server == "screen"));
        assert_eq!(conn.state(), ConnectionState::Closed);

        assert!(conn.close().await.is_ok());
        let closes = log.lock().unwrap().iter().filter(|e| **e == "close").count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn render_empty_result() {
        assert_eq!(render_parts(&[]), "");
    }
}
