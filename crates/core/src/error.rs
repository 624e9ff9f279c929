//! Error types for the CoralClaw domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Only [`ProviderError`] is expected to reach the user during a turn.
//! Tool-side failures ([`ToolError`], [`McpError`]) are rendered into
//! tool-result text so the model can react to them.

use thiserror::Error;

/// The top-level error type for all CoralClaw operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- MCP errors ---
    #[error("MCP error: {0}")]
    Mcp(#[from] McpError),

    // --- User abort ---
    #[error("Turn cancelled")]
    Cancelled,
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool '{0}' not found")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Failures of a tool-provider (MCP server) connection.
#[derive(Debug, Clone, Error)]
pub enum McpError {
    #[error("Failed to spawn server '{server}': {reason}")]
    Spawn { server: String, reason: String },

    #[error("Handshake with '{server}' failed: {reason}")]
    Initialization { server: String, reason: String },

    #[error("Server '{server}' did not answer within {timeout_secs}s")]
    Timeout { server: String, timeout_secs: u64 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server '{0}' is not ready")]
    NotReady(String),

    #[error("Failed to close '{server}': {reason}")]
    Close { server: String, reason: String },
}
