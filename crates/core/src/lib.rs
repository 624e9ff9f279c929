//! # CoralClaw Core
//!
//! Domain types, traits, and error definitions for the CoralClaw agent loop.
//! This crate has **zero framework dependencies** — it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every seam is defined as a trait here. Implementations live in their
//! respective crates:
//! - [`Provider`] — model backends (`coralclaw-providers`)
//! - [`Tool`] — locally executed tools (`coralclaw-tools`)
//! - [`ToolInvoker`] — name-based tool dispatch (local registry, MCP servers)

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, McpError, ProviderError, Result, ToolError};
pub use message::{Conversation, ConversationId, Message, Role, ToolCallRequest};
pub use provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta,
    ToolDefinition, Usage,
};
pub use tool::{Tool, ToolInvoker, ToolRegistry, ToolResult};
