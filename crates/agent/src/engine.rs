//! The turn engine.
//!
//! One turn: append the user message, then repeat
//! REQUEST → STREAMING → CHECK_PENDING → EXECUTING until the model answers
//! without tool calls. Tool calls run one at a time in index order. Their
//! failures are tool-result text; only provider failures and cancellation
//! end a turn early, and the conversation keeps everything appended so far.

use std::sync::Arc;
use std::time::Instant;

use coralclaw_core::error::{Error, Result};
use coralclaw_core::message::{Conversation, Message};
use coralclaw_core::provider::{Provider, ProviderRequest, Usage};
use coralclaw_core::tool::ToolInvoker;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::StreamAggregator;
use crate::event::TurnEvent;

/// What a finished turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Content of the last assistant message
    pub text: String,

    /// Model requests made during the turn
    pub iterations: u32,

    pub tool_calls_made: usize,

    /// Usage reported for the last model request
    pub usage: Option<Usage>,
}

/// Drives turns against one model provider.
pub struct TurnEngine {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Max tokens per response
    max_tokens: Option<u32>,

    /// Stream responses, or ask for one complete message per request
    stream: bool,

    /// Cap on model requests per turn; `None` is unbounded
    max_iterations: Option<u32>,
}

impl TurnEngine {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            stream: true,
            max_iterations: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_max_iterations(mut self, max: Option<u32>) -> Self {
        self.max_iterations = max;
        self
    }

    /// Swap the provider between turns.
    pub fn set_provider(&mut self, provider: Arc<dyn Provider>, model: impl Into<String>) {
        self.provider = provider;
        self.model = model.into();
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one turn without events or cancellation.
    pub async fn ask(
        &self,
        conversation: &mut Conversation,
        input: impl Into<String>,
        tools: &dyn ToolInvoker,
    ) -> Result<TurnOutcome> {
        let never = CancellationToken::new();
        self.run(conversation, input, tools, &mut |_: TurnEvent| {}, &never).await
    }

    /// Run one turn for `input`.
    ///
    /// `cancel` is honoured before each model request and while waiting on
    /// the model; a tool that has started always runs to completion.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        input: impl Into<String>,
        tools: &dyn ToolInvoker,
        on_event: &mut (dyn FnMut(TurnEvent) + Send),
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        conversation.push(Message::user(input));

        info!(
            conversation_id = %conversation.id,
            messages = conversation.len(),
            provider = %self.provider.name(),
            model = %self.model,
            "Processing turn"
        );

        let definitions = tools.definitions();
        let mut iterations = 0u32;
        let mut tool_calls_made = 0usize;
        let mut usage = None;

        loop {
            if let Some(max) = self.max_iterations
                && iterations >= max
            {
                warn!(
                    conversation_id = %conversation.id,
                    iterations,
                    "Max iterations reached, ending turn"
                );
                break;
            }
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            iterations += 1;

            // REQUEST
            let request = ProviderRequest {
                model: self.model.clone(),
                messages: conversation.messages().to_vec(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: definitions.clone(),
                stream: self.stream,
            };
            debug!(
                conversation_id = %conversation.id,
                iteration = iterations,
                tools = definitions.len(),
                "Requesting model output"
            );

            // STREAMING
            let (message, request_usage) = self.receive(request, on_event, cancel).await?;
            if request_usage.is_some() {
                usage = request_usage;
            }
            conversation.push(message);

            // CHECK_PENDING
            let pending = conversation.pending_tool_calls().to_vec();
            if pending.is_empty() {
                break;
            }

            // EXECUTING
            debug!(tool_count = pending.len(), "Executing tool calls");
            for call in &pending {
                let arguments = call.parsed_arguments();
                on_event(TurnEvent::ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: arguments.clone(),
                });

                let start = Instant::now();
                let output = tools.invoke(&call.name, arguments).await;
                debug!(
                    tool = %call.name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool call answered"
                );

                on_event(TurnEvent::ToolResult {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    output: output.clone(),
                });
                conversation.push(Message::tool_result(&call.id, output));
                tool_calls_made += 1;
            }
        }

        let text = conversation
            .messages()
            .iter()
            .rev()
            .find(|m| matches!(m, Message::Assistant { .. }))
            .map(|m| m.content().to_string())
            .unwrap_or_default();

        on_event(TurnEvent::Done {
            conversation_id: conversation.id.to_string(),
            usage: usage.clone(),
            iterations,
            tool_calls_made,
        });

        Ok(TurnOutcome {
            text,
            iterations,
            tool_calls_made,
            usage,
        })
    }

    /// Get one assistant message from the provider, forwarding text as it
    /// arrives.
    async fn receive(
        &self,
        request: ProviderRequest,
        on_event: &mut (dyn FnMut(TurnEvent) + Send),
        cancel: &CancellationToken,
    ) -> Result<(Message, Option<Usage>)> {
        if !self.stream {
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                response = self.provider.complete(request) => response?,
            };
            let usage = response.usage.clone();
            let message = StreamAggregator::from_response(response);
            if !message.content().is_empty() {
                on_event(TurnEvent::Chunk {
                    content: message.content().to_string(),
                });
            }
            return Ok((message, usage));
        }

        let mut rx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            rx = self.provider.stream(request) => rx?,
        };

        let mut aggregator = StreamAggregator::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                next = rx.recv() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;

            if let Some(content) = chunk.content.as_ref().filter(|c| !c.is_empty()) {
                on_event(TurnEvent::Chunk {
                    content: content.clone(),
                });
            }
            let done = chunk.done;
            aggregator.push(chunk);
            if done {
                break;
            }
        }

        let usage = aggregator.usage().cloned();
        Ok((aggregator.finish(), usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use coralclaw_core::error::ProviderError;
    use coralclaw_core::provider::{
        ChunkReceiver, ProviderResponse, StreamChunk, ToolCallDelta, ToolDefinition,
    };
    use std::collections::VecDeque;
    use std::sync::Mutex;

    type ProviderResult<T> = std::result::Result<T, ProviderError>;

    /// Replays scripted chunk sequences, one per request.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Vec<StreamChunk>>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Vec<StreamChunk>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn next(&self, request: ProviderRequest) -> ProviderResult<Vec<StreamChunk>> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ProviderError::Network("connection refused".into()))
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ProviderRequest) -> ProviderResult<ProviderResponse> {
            let mut aggregator = StreamAggregator::new();
            for chunk in self.next(request)? {
                aggregator.push(chunk);
            }
            Ok(ProviderResponse {
                message: aggregator.finish(),
                usage: None,
                model: "scripted".into(),
            })
        }

        async fn stream(&self, request: ProviderRequest) -> ProviderResult<ChunkReceiver> {
            let chunks = self.next(request)?;
            let (tx, rx) = tokio::sync::mpsc::channel(chunks.len().max(1));
            for chunk in chunks {
                let _ = tx.send(Ok(chunk)).await;
            }
            Ok(rx)
        }
    }

    /// Streams forever without finishing.
    struct StalledProvider {
        senders: Mutex<Vec<tokio::sync::mpsc::Sender<ProviderResult<StreamChunk>>>>,
    }

    #[async_trait]
    impl Provider for StalledProvider {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn complete(&self, _request: ProviderRequest) -> ProviderResult<ProviderResponse> {
            std::future::pending().await
        }

        async fn stream(&self, _request: ProviderRequest) -> ProviderResult<ChunkReceiver> {
            let (tx, rx) = tokio::sync::mpsc::channel(4);
            let _ = tx.send(Ok(text("thinking"))).await;
            self.senders.lock().unwrap().push(tx);
            Ok(rx)
        }
    }

    /// Records invocations and echoes them back.
    #[derive(Default)]
    struct RecordingTools {
        calls: Mutex<Vec<(String, serde_json::Value)>>,
    }

    #[async_trait]
    impl ToolInvoker for RecordingTools {
        fn definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "lookup".into(),
                description: "Look something up".into(),
                parameters: serde_json::json!({"type": "object"}),
            }]
        }

        fn has_tool(&self, name: &str) -> bool {
            name == "lookup"
        }

        async fn invoke(&self, name: &str, arguments: serde_json::Value) -> String {
            self.calls.lock().unwrap().push((name.to_string(), arguments.clone()));
            format!("{name} -> {arguments}")
        }
    }

    fn text(content: &str) -> StreamChunk {
        StreamChunk {
            content: Some(content.into()),
            ..StreamChunk::default()
        }
    }

    fn call(index: u32, id: &str, name: &str, arguments: &str) -> StreamChunk {
        StreamChunk {
            tool_calls: vec![ToolCallDelta {
                index,
                id: Some(id.into()),
                name: Some(name.into()),
                arguments: Some(arguments.into()),
            }],
            ..StreamChunk::default()
        }
    }

    fn done() -> StreamChunk {
        StreamChunk {
            done: true,
            ..StreamChunk::default()
        }
    }

    #[tokio::test]
    async fn simple_text_response() {
        let provider =
            ScriptedProvider::new(vec![vec![text("Hello! "), text("How can I help?"), done()]]);
        let engine = TurnEngine::new(provider.clone(), "mock-model");
        let tools = RecordingTools::default();

        let mut conv = Conversation::with_system_prompt("You are a helpful assistant.");
        let mut events = Vec::new();
        let outcome = engine
            .run(
                &mut conv,
                "Hello!",
                &tools,
                &mut |e: TurnEvent| events.push(e),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.text, "Hello! How can I help?");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.tool_calls_made, 0);
        // System + User + Assistant
        assert_eq!(conv.len(), 3);

        let kinds: Vec<_> = events.iter().map(TurnEvent::event_type).collect();
        assert_eq!(kinds, vec!["chunk", "chunk", "done"]);

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0].tools.len(), 1);
        assert!(requests[0].stream);
    }

    #[tokio::test]
    async fn tool_results_follow_in_index_order() {
        let provider = ScriptedProvider::new(vec![
            vec![
                // Slot 1 announced before slot 0
                call(1, "call_b", "lookup", r#"{"q":"second"}"#),
                call(0, "call_a", "lookup", r#"{"q":"first"}"#),
                done(),
            ],
            vec![text("All done."), done()],
        ]);
        let engine = TurnEngine::new(provider.clone(), "mock-model");
        let tools = RecordingTools::default();
        let mut conv = Conversation::new();

        let outcome = engine.ask(&mut conv, "look twice", &tools).await.unwrap();
        assert_eq!(outcome.text, "All done.");
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.tool_calls_made, 2);

        // user, assistant(calls), tool, tool, assistant
        let msgs = conv.messages();
        assert_eq!(msgs.len(), 5);
        assert_eq!(msgs[1].tool_calls()[0].id, "call_a");
        assert_eq!(msgs[2].tool_call_id(), Some("call_a"));
        assert_eq!(msgs[3].tool_call_id(), Some("call_b"));
        assert_eq!(msgs[2].content(), r#"lookup -> {"q":"first"}"#);

        let calls = tools.calls.lock().unwrap();
        assert_eq!(calls[0].1["q"], "first");
        assert_eq!(calls[1].1["q"], "second");

        // Second request carries the whole exchange
        assert_eq!(provider.requests.lock().unwrap()[1].messages.len(), 4);
    }

    #[tokio::test]
    async fn bad_arguments_become_empty_object() {
        let provider = ScriptedProvider::new(vec![
            vec![call(0, "c1", "lookup", "{bad json"), done()],
            vec![text("ok"), done()],
        ]);
        let engine = TurnEngine::new(provider, "mock-model");
        let tools = RecordingTools::default();
        let mut conv = Conversation::new();

        engine.ask(&mut conv, "go", &tools).await.unwrap();
        assert_eq!(tools.calls.lock().unwrap()[0].1, serde_json::json!({}));
    }

    #[tokio::test]
    async fn provider_error_keeps_history() {
        let provider = ScriptedProvider::new(vec![vec![call(0, "c1", "lookup", "{}"), done()]]);
        let engine = TurnEngine::new(provider, "mock-model");
        let tools = RecordingTools::default();
        let mut conv = Conversation::new();

        let err = engine.ask(&mut conv, "go", &tools).await.unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Network(_))));
        // user, assistant(call), tool result survive the failed second request
        assert_eq!(conv.len(), 3);
        assert_eq!(conv.messages()[2].tool_call_id(), Some("c1"));
    }

    #[tokio::test]
    async fn non_streaming_mode_uses_complete() {
        let provider = ScriptedProvider::new(vec![vec![text("one shot")]]);
        let engine = TurnEngine::new(provider.clone(), "mock-model").with_streaming(false);
        let tools = RecordingTools::default();
        let mut conv = Conversation::new();
        let mut events = Vec::new();

        let outcome = engine
            .run(
                &mut conv,
                "hi",
                &tools,
                &mut |e: TurnEvent| events.push(e),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.text, "one shot");
        assert!(!provider.requests.lock().unwrap()[0].stream);
        assert_eq!(
            events[0],
            TurnEvent::Chunk {
                content: "one shot".into()
            }
        );
    }

    #[tokio::test]
    async fn max_iterations_stops_the_loop() {
        let provider = ScriptedProvider::new(vec![
            vec![call(0, "c1", "lookup", "{}"), done()],
            vec![call(0, "c2", "lookup", "{}"), done()],
        ]);
        let engine = TurnEngine::new(provider, "mock-model").with_max_iterations(Some(1));
        let tools = RecordingTools::default();
        let mut conv = Conversation::new();

        let outcome = engine.ask(&mut conv, "loop", &tools).await.unwrap();
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.tool_calls_made, 1);
        assert_eq!(outcome.text, "");
    }

    #[tokio::test]
    async fn cancelled_before_request() {
        let provider = ScriptedProvider::new(vec![vec![text("never"), done()]]);
        let engine = TurnEngine::new(provider.clone(), "mock-model");
        let tools = RecordingTools::default();
        let mut conv = Conversation::new();
        let token = CancellationToken::new();
        token.cancel();

        let err = engine
            .run(&mut conv, "hi", &tools, &mut |_: TurnEvent| {}, &token)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(provider.requests.lock().unwrap().is_empty());
        assert_eq!(conv.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_while_streaming() {
        let provider = Arc::new(StalledProvider {
            senders: Mutex::new(Vec::new()),
        });
        let engine = TurnEngine::new(provider, "mock-model");
        let tools = RecordingTools::default();
        let mut conv = Conversation::new();
        let token = CancellationToken::new();

        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let mut chunks = 0;
        let err = engine
            .run(&mut conv, "hi", &tools, &mut |_: TurnEvent| chunks += 1, &token)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(chunks, 1);
        // The partial assistant message is not kept
        assert_eq!(conv.len(), 1);
    }

    /// Streams scripted items, errors included, one sequence per request.
    struct FlakyProvider {
        replies: Mutex<VecDeque<Vec<ProviderResult<StreamChunk>>>>,
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> ProviderResult<ProviderResponse> {
            Err(ProviderError::Network("streaming only".into()))
        }

        async fn stream(
            &self,
            _request: ProviderRequest,
        ) -> ProviderResult<ChunkReceiver> {
            let items = self.replies.lock().unwrap().pop_front().unwrap_or_default();
            let (tx, rx) = tokio::sync::mpsc::channel(items.len().max(1));
            for item in items {
                let _ = tx.send(item).await;
            }
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn stream_error_after_text_discards_partial_message() {
        let provider = Arc::new(FlakyProvider {
            replies: Mutex::new(VecDeque::from(vec![
                vec![Ok(call(0, "call_1", "lookup", r#"{"q":"x"}"#)), Ok(done())],
                vec![
                    Ok(text("Half an ans")),
                    Err(ProviderError::StreamInterrupted("connection reset".into())),
                ],
            ])),
        });
        let engine = TurnEngine::new(provider, "mock-model");
        let tools = RecordingTools::default();
        let mut conv = Conversation::new();

        let mut events = Vec::new();
        let err = engine
            .run(
                &mut conv,
                "look it up",
                &tools,
                &mut |e: TurnEvent| events.push(e),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Provider(ProviderError::StreamInterrupted(_))
        ));
        // User, assistant with the call, tool result; no partial answer
        assert_eq!(conv.len(), 3);
        assert_eq!(conv.messages()[1].tool_calls()[0].id, "call_1");
        assert_eq!(conv.messages()[2].tool_call_id(), Some("call_1"));
        assert!(conv.messages().iter().all(|m| m.content() != "Half an ans"));

        // The text was still shown while it streamed, but the turn never finished
        assert!(events.contains(&TurnEvent::Chunk {
            content: "Half an ans".into()
        }));
        assert!(!events.iter().any(|e| e.event_type() == "done"));
    }
}
