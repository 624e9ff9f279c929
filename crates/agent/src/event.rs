//! Turn-level events.
//!
//! `TurnEvent` lets a caller follow a turn while it runs: streamed text,
//! each tool dispatch and its result, and a closing summary.

use coralclaw_core::provider::Usage;
use serde::{Deserialize, Serialize};

/// Events emitted by the turn engine.
///
/// - `chunk`       — partial text from the model
/// - `tool_call`   — a tool is about to run
/// - `tool_result` — the tool returned
/// - `done`        — the turn is over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Partial text token from the model.
    Chunk { content: String },

    /// The engine is dispatching a tool call.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// A tool call finished; `output` is what the model will see.
    ToolResult {
        id: String,
        name: String,
        output: String,
    },

    /// The turn is complete.
    Done {
        conversation_id: String,
        usage: Option<Usage>,
        iterations: u32,
        tool_calls_made: usize,
    },
}

impl TurnEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
        }
    }
}
