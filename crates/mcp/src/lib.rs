//! # CoralClaw MCP
//!
//! Connections to external tool-provider processes speaking the Model
//! Context Protocol.
//!
//! - [`ProviderConnection`]: one server, its handshake and tool catalog
//! - [`ConnectionManager`]: every server of a session, name routing, and
//!   teardown in reverse creation order
//! - [`ToolTransport`]: the seam to the wire protocol; [`StdioTransport`]
//!   implements it on top of `rmcp`

pub mod connection;
pub mod manager;
pub mod routing;
pub mod stdio;
pub mod transport;

pub use connection::{ConnectionState, ProviderConnection, render_parts};
pub use manager::{ConnectionManager, ServerInfo};
pub use routing::{RoutingConflict, RoutingTable};
pub use stdio::{StdioSpawner, StdioTransport};
pub use transport::{ContentPart, ToolTransport, TransportSpawner};
