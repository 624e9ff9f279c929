//! The set of tool-provider connections for one session.
//!
//! Every connection the manager creates, including ones that failed to come
//! up, stays on a stack until [`ConnectionManager::shutdown`] (or drop)
//! releases them newest first. Setup failures are isolated: one bad server
//! never keeps the others from connecting.

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use coralclaw_config::McpServerConfig;
use coralclaw_core::error::McpError;
use coralclaw_core::provider::ToolDefinition;
use coralclaw_core::tool::{ToolInvoker, not_found_message};
use tracing::{debug, info, warn};

use crate::connection::{ConnectionState, ProviderConnection};
use crate::routing::{RoutingConflict, RoutingTable};
use crate::stdio::StdioSpawner;
use crate::transport::TransportSpawner;

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Summary of one connection for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub state: ConnectionState,
    pub tool_count: usize,
}

pub struct ConnectionManager {
    spawner: Box<dyn TransportSpawner>,
    /// Creation order; closed in reverse
    connections: Vec<ProviderConnection>,
    routes: RoutingTable,
    handshake_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(spawner: Box<dyn TransportSpawner>) -> Self {
        Self {
            spawner,
            connections: Vec::new(),
            routes: RoutingTable::new(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// A manager that launches servers as stdio child processes.
    pub fn stdio() -> Self {
        Self::new(Box::new(StdioSpawner))
    }

    /// Bound the handshake plus catalog retrieval of each server.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Connect one server and route its tools.
    ///
    /// On failure the server is skipped and the error returned; the manager
    /// stays usable and keeps whatever it already has.
    pub async fn connect(&mut self, name: &str, config: &McpServerConfig) -> Result<(), McpError> {
        if self.connections.iter().any(|c| c.name() == name && c.is_ready()) {
            return Err(McpError::Protocol(format!("server '{name}' is already connected")));
        }
        let (connection, outcome) =
            Self::setup(self.spawner.as_ref(), self.handshake_timeout, name, config).await;
        self.adopt(name, connection, outcome)
    }

    /// Connect every configured server.
    ///
    /// Setups run concurrently on the current task; results are registered
    /// in config order so routing precedence does not depend on timing.
    /// Returns the names of the servers that came up.
    pub async fn connect_all(
        &mut self,
        configs: &BTreeMap<String, McpServerConfig>,
    ) -> Vec<String> {
        let setups = configs.iter().map(|(name, config)| {
            Self::setup(self.spawner.as_ref(), self.handshake_timeout, name, config)
        });
        let results = futures::future::join_all(setups).await;

        let mut ready = Vec::new();
        for ((name, _), (connection, outcome)) in configs.iter().zip(results) {
            if self.adopt(name, connection, outcome).is_ok() {
                ready.push(name.clone());
            }
        }

        info!(
            connected = ready.len(),
            configured = configs.len(),
            tools = self.routes.len(),
            "MCP servers connected"
        );
        ready
    }

    async fn setup(
        spawner: &dyn TransportSpawner,
        timeout: Duration,
        name: &str,
        config: &McpServerConfig,
    ) -> (Option<ProviderConnection>, Result<(), McpError>) {
        debug!(server = %name, command = %config.command, "Connecting to MCP server");

        let transport = match spawner.spawn(name, config) {
            Ok(t) => t,
            Err(e) => return (None, Err(e)),
        };

        let mut connection = ProviderConnection::new(name, transport);
        let outcome = match tokio::time::timeout(timeout, connection.initialize()).await {
            Ok(result) => result,
            Err(_) => {
                connection.mark_failed();
                Err(McpError::Timeout {
                    server: name.to_string(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        };

        (Some(connection), outcome)
    }

    fn adopt(
        &mut self,
        name: &str,
        connection: Option<ProviderConnection>,
        outcome: Result<(), McpError>,
    ) -> Result<(), McpError> {
        if let Some(connection) = connection {
            if outcome.is_ok() {
                let conflicts = self
                    .routes
                    .register(name, connection.tools().iter().map(|t| t.name.as_str()));
                for conflict in &conflicts {
                    warn!(
                        tool = %conflict.tool,
                        previous = %conflict.previous,
                        replacement = %conflict.replacement,
                        "Tool name collision, last server wins"
                    );
                }
                info!(server = %name, tools = connection.tools().len(), "MCP server ready");
            }
            self.connections.push(connection);
        }

        if let Err(e) = &outcome {
            warn!(server = %name, error = %e, "Failed to connect MCP server");
        }
        outcome
    }

    /// Each routable tool once, described by the server that owns it.
    ///
    /// Ordered by connection creation, then by each server's catalog order.
    pub fn merged_catalog(&self) -> Vec<ToolDefinition> {
        let mut seen = HashSet::new();
        self.ready()
            .flat_map(|conn| conn.tools().iter().map(move |tool| (conn.name(), tool)))
            .filter(|(server, tool)| self.routes.owner(&tool.name) == Some(*server))
            .filter(|(_, tool)| seen.insert(tool.name.clone()))
            .map(|(_, tool)| tool.clone())
            .collect()
    }

    /// `(tool, server)` pairs in catalog order.
    pub fn tools(&self) -> Vec<(String, String)> {
        self.merged_catalog()
            .into_iter()
            .filter_map(|tool| {
                let server = self.routes.owner(&tool.name)?.to_string();
                Some((tool.name, server))
            })
            .collect()
    }

    pub fn servers(&self) -> Vec<ServerInfo> {
        self.connections
            .iter()
            .map(|c| ServerInfo {
                name: c.name().to_string(),
                state: c.state(),
                tool_count: c.tools().len(),
            })
            .collect()
    }

    pub fn connection(&self, name: &str) -> Option<&ProviderConnection> {
        self.connections.iter().rev().find(|c| c.name() == name)
    }

    pub fn conflicts(&self) -> &[RoutingConflict] {
        self.routes.conflicts()
    }

    fn ready(&self) -> impl Iterator<Item = &ProviderConnection> {
        self.connections.iter().filter(|c| c.is_ready())
    }

    /// Close every connection, newest first.
    ///
    /// A failed close is logged and collected; it never stops the remaining
    /// closes.
    pub async fn shutdown(&mut self) -> Vec<McpError> {
        let mut errors = Vec::new();
        while let Some(mut connection) = self.connections.pop() {
            match connection.close().await {
                Ok(()) => debug!(server = %connection.name(), "MCP server closed"),
                Err(e) => {
                    warn!(server = %connection.name(), error = %e, "Failed to close MCP server");
                    errors.push(e);
                }
            }
        }
        self.routes.clear();
        errors
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // Transports release their processes on drop
        while let Some(connection) = self.connections.pop() {
            debug!(server = %connection.name(), "Releasing MCP server");
            drop(connection);
        }
    }
}

#[async_trait]
impl ToolInvoker for ConnectionManager {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.merged_catalog()
    }

    fn has_tool(&self, name: &str) -> bool {
        self.routes.owner(name).is_some()
    }

    async fn invoke(&self, name: &str, arguments: serde_json::Value) -> String {
        let Some(server) = self.routes.owner(name) else {
            return not_found_message(name);
        };
        let Some(connection) = self.ready().find(|c| c.name() == server) else {
            return format!("Error: Server '{server}' not connected");
        };

        let started = Instant::now();
        match connection.invoke(name, arguments).await {
            Ok(text) => {
                debug!(
                    tool = %name,
                    server = %server,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "MCP tool call finished"
                );
                text
            }
            Err(e) => {
                warn!(tool = %name, server = %server, error = %e, "MCP tool call failed");
                format!("Error calling tool '{name}': {e}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ContentPart, ToolTransport};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    #[derive(Clone, Copy)]
    enum Behavior {
        Healthy,
        RefuseSpawn,
        FailHandshake,
        Hang,
        FailClose,
    }

    struct MockTransport {
        server: String,
        behavior: Behavior,
        tools: Vec<&'static str>,
        log: Log,
    }

    #[async_trait]
    impl ToolTransport for MockTransport {
        async fn initialize(&mut self) -> Result<(), McpError> {
            match self.behavior {
                Behavior::FailHandshake => Err(McpError::Initialization {
                    server: self.server.clone(),
                    reason: "connection reset".into(),
                }),
                Behavior::Hang => std::future::pending().await,
                _ => Ok(()),
            }
        }

        async fn list_tools(&mut self) -> Result<Vec<ToolDefinition>, McpError> {
            Ok(self
                .tools
                .iter()
                .map(|name| ToolDefinition {
                    name: name.to_string(),
                    description: format!("{name} on {}", self.server),
                    parameters: serde_json::json!({"type": "object"}),
                })
                .collect())
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: serde_json::Value,
        ) -> Result<Vec<ContentPart>, McpError> {
            match name {
                "explode" => Err(McpError::Transport("broken pipe".into())),
                "render" => Ok(vec![
                    ContentPart::Text("chart".into()),
                    ContentPart::Binary {
                        mime_type: "image/svg+xml".into(),
                    },
                ]),
                _ => Ok(vec![ContentPart::Text(format!("{}:{name}:{arguments}", self.server))]),
            }
        }

        async fn close(&mut self) -> Result<(), McpError> {
            self.log.lock().unwrap().push(self.server.clone());
            match self.behavior {
                Behavior::FailClose => Err(McpError::Transport("already gone".into())),
                _ => Ok(()),
            }
        }
    }

    struct MockSpawner {
        plans: HashMap<String, (Behavior, Vec<&'static str>)>,
        closed: Log,
    }

    impl MockSpawner {
        fn new(plans: &[(&str, Behavior, Vec<&'static str>)]) -> (Self, Log) {
            let closed = Log::default();
            let plans = plans
                .iter()
                .map(|(name, behavior, tools)| (name.to_string(), (*behavior, tools.clone())))
                .collect();
            (
                Self {
                    plans,
                    closed: closed.clone(),
                },
                closed,
            )
        }
    }

    impl TransportSpawner for MockSpawner {
        fn spawn(
            &self,
            name: &str,
            _config: &McpServerConfig,
        ) -> Result<Box<dyn ToolTransport>, McpError> {
            let (behavior, tools) = self
                .plans
                .get(name)
                .cloned()
                .unwrap_or((Behavior::Healthy, vec![]));
            if let Behavior::RefuseSpawn = behavior {
                return Err(McpError::Spawn {
                    server: name.to_string(),
                    reason: "No such file or directory".into(),
                });
            }
            Ok(Box::new(MockTransport {
                server: name.to_string(),
                behavior,
                tools,
                log: self.closed.clone(),
            }))
        }
    }

    fn configs(names: &[&str]) -> BTreeMap<String, McpServerConfig> {
        names
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    McpServerConfig {
                        command: format!("{name}-server"),
                        args: vec![],
                        env: BTreeMap::new(),
                    },
                )
            })
            .collect()
    }

    fn manager(plans: &[(&str, Behavior, Vec<&'static str>)]) -> (ConnectionManager, Log) {
        let (spawner, closed) = MockSpawner::new(plans);
        (ConnectionManager::new(Box::new(spawner)), closed)
    }

    #[tokio::test]
    async fn failing_server_does_not_block_others() {
        let (mut mgr, _) = manager(&[
            ("broken", Behavior::FailHandshake, vec!["nope"]),
            ("files", Behavior::Healthy, vec!["read_file", "list_dir"]),
        ]);

        let ready = mgr.connect_all(&configs(&["broken", "files"])).await;
        assert_eq!(ready, vec!["files"]);

        let names: Vec<_> = mgr.merged_catalog().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["read_file", "list_dir"]);
        assert!(!mgr.has_tool("nope"));

        let servers = mgr.servers();
        assert_eq!(servers[0].state, ConnectionState::Failed);
        assert_eq!(servers[1].state, ConnectionState::Ready);
        assert_eq!(servers[1].tool_count, 2);
    }

    #[tokio::test]
    async fn spawn_failure_creates_no_connection() {
        let (mut mgr, _) = manager(&[("ghost", Behavior::RefuseSpawn, vec![])]);
        let err = mgr.connect("ghost", &configs(&["ghost"])["ghost"]).await.unwrap_err();
        assert!(matches!(err, McpError::Spawn { .. }));
        assert!(mgr.servers().is_empty());
        assert!(mgr.merged_catalog().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_timeout_is_a_failure() {
        let (mut mgr, _) = manager(&[
            ("slow", Behavior::Hang, vec!["wait"]),
            ("fast", Behavior::Healthy, vec!["go"]),
        ]);
        mgr = mgr.with_handshake_timeout(Duration::from_secs(5));

        let ready = mgr.connect_all(&configs(&["fast", "slow"])).await;
        assert_eq!(ready, vec!["fast"]);
        assert_eq!(mgr.connection("slow").unwrap().state(), ConnectionState::Failed);
        assert!(mgr.has_tool("go"));
        assert!(!mgr.has_tool("wait"));
    }

    #[tokio::test]
    async fn last_registered_server_wins_collisions() {
        let (mut mgr, _) = manager(&[
            ("alpha", Behavior::Healthy, vec!["search", "fetch"]),
            ("beta", Behavior::Healthy, vec!["search"]),
        ]);
        mgr.connect_all(&configs(&["alpha", "beta"])).await;

        let output = mgr.invoke("search", serde_json::json!({"q": "rust"})).await;
        assert_eq!(output, r#"beta:search:{"q":"rust"}"#);
        assert_eq!(mgr.conflicts().len(), 1);
        assert_eq!(mgr.conflicts()[0].previous, "alpha");

        // One entry per name, described by the owner
        let catalog = mgr.merged_catalog();
        assert_eq!(catalog.len(), 2);
        let search = catalog.iter().find(|t| t.name == "search").unwrap();
        assert_eq!(search.description, "search on beta");
        assert_eq!(
            mgr.tools(),
            vec![
                ("fetch".to_string(), "alpha".to_string()),
                ("search".to_string(), "beta".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn merged_catalog_is_stable() {
        let (mut mgr, _) = manager(&[
            ("a", Behavior::Healthy, vec!["one", "two"]),
            ("b", Behavior::Healthy, vec!["three"]),
        ]);
        mgr.connect_all(&configs(&["a", "b"])).await;
        assert_eq!(mgr.merged_catalog(), mgr.merged_catalog());
        assert_eq!(mgr.definitions().len(), 3);
    }

    #[tokio::test]
    async fn invoke_errors_are_text() {
        let (mut mgr, _) = manager(&[("srv", Behavior::Healthy, vec!["explode", "render"])]);
        mgr.connect_all(&configs(&["srv"])).await;

        assert_eq!(
            mgr.invoke("missing", serde_json::json!({})).await,
            "Error: Tool 'missing' not found"
        );
        assert_eq!(
            mgr.invoke("explode", serde_json::json!({})).await,
            "Error calling tool 'explode': Transport error: broken pipe"
        );
        assert_eq!(
            mgr.invoke("render", serde_json::json!({})).await,
            "chart\n[Binary data: image/svg+xml]"
        );
    }

    #[tokio::test]
    async fn duplicate_connect_is_rejected() {
        let (mut mgr, _) = manager(&[("srv", Behavior::Healthy, vec!["x"])]);
        let config = &configs(&["srv"])["srv"];
        mgr.connect("srv", config).await.unwrap();
        assert!(matches!(mgr.connect("srv", config).await, Err(McpError::Protocol(_))));
        assert_eq!(mgr.servers().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_closes_in_reverse_order_past_failures() {
        let (mut mgr, closed) = manager(&[
            ("a", Behavior::Healthy, vec!["one"]),
            ("b", Behavior::FailClose, vec!["two"]),
            ("c", Behavior::FailHandshake, vec![]),
            ("d", Behavior::Healthy, vec!["four"]),
        ]);
        mgr.connect_all(&configs(&["a", "b", "c", "d"])).await;

        let errors = mgr.shutdown().await;
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], McpError::Close { server, .. } if server == "b"));
        // Failed connections are closed too
        assert_eq!(*closed.lock().unwrap(), vec!["d", "c", "b", "a"]);
        assert!(mgr.servers().is_empty());
        assert!(!mgr.has_tool("one"));
    }
}
