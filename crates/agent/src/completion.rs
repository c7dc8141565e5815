//! Completion Adapter.
//!
//! Wraps a `Provider` for one completion round: prepends the persona's
//! system prompt, forwards text deltas as they arrive and reassembles the
//! fragmented tool calls into the final assistant message.

use shopwire_core::error::ProviderError;
use shopwire_core::message::{Message, MessageToolCall, Role};
use shopwire_core::persona::PersonaSet;
use shopwire_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ToolCallDelta, ToolDefinition, Usage,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Why a completion round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The message requests tool invocations
    ToolUse,
    /// The model is done for this turn
    EndTurn,
}

/// The reassembled result of one completion round.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub message: Message,
    pub stop_reason: StopReason,
    pub usage: Option<Usage>,
}

/// One item pulled from a `CompletionStream`.
#[derive(Debug, Clone)]
pub enum CompletionEvent {
    /// A text delta, in arrival order
    Text(String),
    /// The finished round; always the last item
    Final(CompletionOutcome),
}

/// Completion service front-end bound to a model and a persona set.
pub struct CompletionAdapter {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    personas: PersonaSet,
}

impl CompletionAdapter {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            personas: PersonaSet::builtin(),
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

    pub fn with_personas(mut self, personas: PersonaSet) -> Self {
        self.personas = personas;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build the request for one round. Any system messages in `history` are
    /// replaced by the selected persona's prompt.
    pub fn build_request(
        &self,
        history: &[Message],
        persona: Option<&str>,
        tools: &[ToolDefinition],
    ) -> ProviderRequest {
        let prompt = self.personas.resolve(persona);
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !prompt.is_empty() {
            messages.push(Message::system(prompt));
        }
        messages.extend(history.iter().filter(|m| m.role != Role::System).cloned());

        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: tools.to_vec(),
        }
    }

    /// Start a completion round.
    pub async fn stream(
        &self,
        history: &[Message],
        persona: Option<&str>,
        tools: &[ToolDefinition],
    ) -> Result<CompletionStream, ProviderError> {
        let request = self.build_request(history, persona, tools);
        debug!(
            provider = self.provider.name(),
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Starting completion"
        );
        let rx = self.provider.stream(request).await?;
        Ok(CompletionStream::new(rx))
    }
}

/// Pull-based view of one completion round.
pub struct CompletionStream {
    rx: ChunkReceiver,
    text: String,
    calls: BTreeMap<u32, ToolCallAccumulator>,
    usage: Option<Usage>,
    finish_reason: Option<String>,
    done: bool,
}

impl CompletionStream {
    fn new(rx: ChunkReceiver) -> Self {
        Self {
            rx,
            text: String::new(),
            calls: BTreeMap::new(),
            usage: None,
            finish_reason: None,
            done: false,
        }
    }

    /// Next text delta, then the final outcome, then `None`.
    ///
    /// A provider failure is yielded once and ends the stream.
    pub async fn next(&mut self) -> Option<Result<CompletionEvent, ProviderError>> {
        if self.done {
            return None;
        }

        loop {
            match self.rx.recv().await {
                None => {
                    self.done = true;
                    return Some(Ok(CompletionEvent::Final(self.finish())));
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Some(Ok(chunk)) => {
                    for delta in chunk.tool_call_deltas {
                        self.calls.entry(delta.index).or_default().apply(delta);
                    }
                    if chunk.usage.is_some() {
                        self.usage = chunk.usage;
                    }
                    if chunk.finish_reason.is_some() {
                        self.finish_reason = chunk.finish_reason;
                    }
                    if let Some(text) = chunk.text.filter(|t| !t.is_empty()) {
                        self.text.push_str(&text);
                        return Some(Ok(CompletionEvent::Text(text)));
                    }
                }
            }
        }
    }

    fn finish(&mut self) -> CompletionOutcome {
        let mut message = Message::assistant(std::mem::take(&mut self.text));
        message.tool_calls = std::mem::take(&mut self.calls)
            .into_values()
            .map(ToolCallAccumulator::into_tool_call)
            .collect();

        // The presence of tool calls decides, whatever the provider reported.
        let stop_reason = if message.has_tool_calls() {
            StopReason::ToolUse
        } else {
            StopReason::EndTurn
        };
        debug!(
            finish_reason = self.finish_reason.as_deref().unwrap_or("none"),
            tool_calls = message.tool_calls.len(),
            "Completion finished"
        );

        CompletionOutcome {
            message,
            stop_reason,
            usage: self.usage.take(),
        }
    }
}

/// Accumulates incremental tool call deltas into a complete tool call.
#[derive(Default)]
struct ToolCallAccumulator {
    id: Option<String>,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn apply(&mut self, delta: ToolCallDelta) {
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            self.id = Some(id);
        }
        if let Some(name) = delta.name {
            self.name.push_str(&name);
        }
        if let Some(args) = delta.arguments {
            self.arguments.push_str(&args);
        }
    }

    fn into_tool_call(self) -> MessageToolCall {
        MessageToolCall {
            id: self
                .id
                .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple())),
            name: self.name,
            arguments: self.arguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedProvider, text_turn, tool_turn};
    use shopwire_core::provider::StreamChunk;

    async fn drain(stream: &mut CompletionStream) -> (Vec<String>, CompletionOutcome) {
        let mut texts = Vec::new();
        while let Some(item) = stream.next().await {
            match item.unwrap() {
                CompletionEvent::Text(t) => texts.push(t),
                CompletionEvent::Final(outcome) => {
                    assert!(stream.next().await.is_none());
                    return (texts, outcome);
                }
            }
        }
        panic!("stream ended without a final outcome");
    }

    #[tokio::test]
    async fn text_deltas_then_final_message() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_turn(&["Hel", "lo"])]));
        let adapter = CompletionAdapter::new(provider, "mock-model");

        let mut stream = adapter.stream(&[Message::user("hi")], None, &[]).await.unwrap();
        let (texts, outcome) = drain(&mut stream).await;

        assert_eq!(texts, vec!["Hel", "lo"]);
        assert_eq!(outcome.message.content, "Hello");
        assert_eq!(outcome.message.role, Role::Assistant);
        assert_eq!(outcome.stop_reason, StopReason::EndTurn);
    }

    #[tokio::test]
    async fn fragmented_tool_calls_are_reassembled_in_index_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_turn(&[
            ("call_a", "search_shop_catalog", r#"{"query":"red shoes"}"#),
            ("call_b", "get_cart", "{}"),
        ])]));
        let adapter = CompletionAdapter::new(provider, "mock-model");

        let mut stream = adapter.stream(&[Message::user("hi")], None, &[]).await.unwrap();
        let (texts, outcome) = drain(&mut stream).await;

        assert!(texts.is_empty());
        assert_eq!(outcome.stop_reason, StopReason::ToolUse);
        let calls = &outcome.message.tool_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].name, "search_shop_catalog");
        assert_eq!(calls[0].arguments, r#"{"query":"red shoes"}"#);
        assert_eq!(calls[1].name, "get_cart");
    }

    #[tokio::test]
    async fn missing_call_id_is_generated() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![
            Ok(StreamChunk::tool_call(ToolCallDelta {
                index: 0,
                name: Some("get_cart".into()),
                ..Default::default()
            })),
            Ok(StreamChunk::finish("tool_calls")),
        ]]));
        let adapter = CompletionAdapter::new(provider, "mock-model");

        let mut stream = adapter.stream(&[], None, &[]).await.unwrap();
        let (_, outcome) = drain(&mut stream).await;
        assert!(outcome.message.tool_calls[0].id.starts_with("call_"));
    }

    #[tokio::test]
    async fn mid_stream_failure_is_yielded_once() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![
            Ok(StreamChunk::text("partial")),
            Err(ProviderError::StreamInterrupted("reset".into())),
        ]]));
        let adapter = CompletionAdapter::new(provider, "mock-model");

        let mut stream = adapter.stream(&[], None, &[]).await.unwrap();
        assert!(matches!(stream.next().await, Some(Ok(CompletionEvent::Text(_)))));
        assert!(matches!(
            stream.next().await,
            Some(Err(ProviderError::StreamInterrupted(_)))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn refused_request_surfaces_error() {
        let provider = Arc::new(ScriptedProvider::refusing(ProviderError::AuthenticationFailed(
            "bad key".into(),
        )));
        let adapter = CompletionAdapter::new(provider, "mock-model");
        assert!(matches!(
            adapter.stream(&[], None, &[]).await,
            Err(ProviderError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn request_starts_with_persona_prompt() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let adapter = CompletionAdapter::new(provider, "mock-model")
            .with_temperature(0.2)
            .with_max_tokens(256);

        let history = vec![Message::system("stale"), Message::user("hi")];
        let request = adapter.build_request(&history, Some("enthusiastic"), &[]);

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert!(request.messages[0].content.contains("upbeat"));
        assert_eq!(request.messages[1].content, "hi");
        assert_eq!(request.max_tokens, Some(256));
        assert!((request.temperature - 0.2).abs() < f32::EPSILON);
    }
}
