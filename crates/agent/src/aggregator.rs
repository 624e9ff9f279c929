//! Rebuilds one assistant message from streamed fragments.
//!
//! Tool-call fragments are keyed by slot index. The first fragment of a slot
//! usually names the call; later ones only carry more argument text. Slots
//! can interleave, so the finished calls are ordered by index, never by
//! arrival.

use std::collections::BTreeMap;

use coralclaw_core::message::{Message, ToolCallRequest};
use coralclaw_core::provider::{ProviderResponse, StreamChunk, ToolCallDelta, Usage};

#[derive(Debug, Default)]
struct Slot {
    id: String,
    name: String,
    arguments: String,
}

#[derive(Debug, Default)]
pub struct StreamAggregator {
    content: String,
    slots: BTreeMap<u32, Slot>,
    usage: Option<Usage>,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk into the message under construction.
    pub fn push(&mut self, chunk: StreamChunk) {
        if let Some(text) = chunk.content {
            self.content.push_str(&text);
        }
        for delta in chunk.tool_calls {
            self.push_tool_call(delta);
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }
    }

    pub fn push_tool_call(&mut self, delta: ToolCallDelta) {
        let slot = self.slots.entry(delta.index).or_default();
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            slot.id = id;
        }
        if let Some(name) = delta.name.filter(|name| !name.is_empty()) {
            slot.name = name;
        }
        if let Some(arguments) = delta.arguments {
            slot.arguments.push_str(&arguments);
        }
    }

    /// Text received so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The most recent usage report, if the provider sent one.
    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }

    /// The finished assistant message. Content is empty, not absent, when no
    /// text arrived.
    pub fn finish(self) -> Message {
        let calls = self
            .slots
            .into_values()
            .map(|slot| ToolCallRequest::new(slot.id, slot.name, slot.arguments))
            .collect();
        Message::assistant_with_tool_calls(self.content, calls)
    }

    /// Aggregate a one-shot response as a single fragment.
    pub fn from_response(response: ProviderResponse) -> Message {
        let mut aggregator = Self::new();
        aggregator.push(StreamChunk::from_response(response));
        aggregator.finish()
    }
}
