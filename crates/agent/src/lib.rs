//! The turn loop — the heart of CoralClaw.
//!
//! A turn follows a **Request → Stream → Execute** cycle:
//!
//! 1. **Append** the user message to the conversation
//! 2. **Request** model output with every available tool
//! 3. **Aggregate** the streamed fragments into one assistant message
//! 4. **If tool calls**: run them in order, append the results, go to step 2
//! 5. **If text only**: the turn is done
//!
//! Tools come from a [`ToolRouter`], which puts the local sandbox and the
//! MCP servers behind one name lookup.

pub mod aggregator;
pub mod engine;
pub mod event;
pub mod router;

pub use aggregator::StreamAggregator;
pub use engine::{TurnEngine, TurnOutcome};
pub use event::TurnEvent;
pub use router::ToolRouter;
pub use tokio_util::sync::CancellationToken;
