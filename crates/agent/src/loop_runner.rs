//! The conversation loop.
//!
//! One turn runs as a state machine:
//!
//! 1. **Seed**: load the replay window, persist and append the user message
//! 2. **Complete**: stream a completion round, forwarding text as `chunk`
//! 3. **Act**: if the round asked for tools, run each call in order and loop
//! 4. **Finish**: emit gathered products, then `end_turn`
//!
//! Provider failures end the turn with a single `error`. Cancellation stops
//! the turn silently, with no further events or writes.

use serde_json::Value;
use shopwire_core::error::{ProviderError, ToolError};
use shopwire_core::message::{ConversationId, Message, MessageToolCall};
use shopwire_core::tool::{ToolCall, ToolResult};
use shopwire_tools::{ProductSummary, ToolInvoker};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::completion::{CompletionAdapter, CompletionEvent, StopReason};
use crate::history::HistoryManager;
use crate::multiplexer::{EventSink, SinkClosed};
use crate::stream_event::StreamEvent;

/// The caller's side of one turn.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub conversation_id: ConversationId,
    pub message: String,
    pub persona: Option<String>,
}

/// Why a turn stopped before finishing.
#[derive(Debug)]
enum TurnAbort {
    Cancelled,
    Provider(ProviderError),
}

impl From<SinkClosed> for TurnAbort {
    fn from(_: SinkClosed) -> Self {
        Self::Cancelled
    }
}

impl From<ProviderError> for TurnAbort {
    fn from(e: ProviderError) -> Self {
        Self::Provider(e)
    }
}

/// Run `fut` unless the turn is cancelled first.
async fn guarded<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, TurnAbort> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TurnAbort::Cancelled),
        out = fut => Ok(out),
    }
}

/// Drives completion rounds and tool calls for a turn.
pub struct ConversationLoop {
    /// Completion service front-end
    adapter: Arc<CompletionAdapter>,

    /// Persistence and replay
    history: Arc<HistoryManager>,

    /// Maximum completion rounds per turn
    max_iterations: usize,
}

impl ConversationLoop {
    pub fn new(adapter: Arc<CompletionAdapter>, history: Arc<HistoryManager>) -> Self {
        Self {
            adapter,
            history,
            max_iterations: 10,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// Run one turn to completion, closing `sink` with its terminal event.
    pub async fn run(
        &self,
        input: TurnInput,
        invoker: ToolInvoker,
        mut sink: EventSink,
        cancel: CancellationToken,
    ) {
        let conversation_id = input.conversation_id.clone();
        info!(conversation_id = %conversation_id, "Processing turn");

        match self.drive(input, &invoker, &mut sink, &cancel).await {
            Ok(products) => {
                if !products.is_empty() {
                    debug!(conversation_id = %conversation_id, count = products.len(), "Emitting product results");
                    if sink.emit(StreamEvent::ProductResults { products }).await.is_err() {
                        return;
                    }
                }
                sink.end_turn().await;
                info!(conversation_id = %conversation_id, "Turn complete");
            }
            Err(TurnAbort::Cancelled) => {
                info!(conversation_id = %conversation_id, "Turn cancelled");
            }
            Err(TurnAbort::Provider(e)) => {
                warn!(conversation_id = %conversation_id, error = %e, "Turn failed");
                sink.fail(e.to_string()).await;
            }
        }
    }

    async fn drive(
        &self,
        input: TurnInput,
        invoker: &ToolInvoker,
        sink: &mut EventSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProductSummary>, TurnAbort> {
        let id = &input.conversation_id;
        let persona = input.persona.as_deref();

        // ── Seed ──
        let mut working = guarded(cancel, self.history.load_truncated(id)).await?;
        let user = Message::user(&input.message);
        self.history.append(id, &user);
        working.push(user);

        let tools = invoker.definitions();
        let mut products = Vec::new();

        for iteration in 1..=self.max_iterations {
            if cancel.is_cancelled() {
                return Err(TurnAbort::Cancelled);
            }
            debug!(conversation_id = %id, iteration, "Completion round");

            // ── Complete ──
            let mut stream = guarded(cancel, self.adapter.stream(&working, persona, &tools)).await??;
            let outcome = loop {
                match guarded(cancel, stream.next()).await? {
                    Some(Ok(CompletionEvent::Text(chunk))) => {
                        sink.emit(StreamEvent::Chunk { chunk }).await?;
                    }
                    Some(Ok(CompletionEvent::Final(outcome))) => break outcome,
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        return Err(ProviderError::StreamInterrupted(
                            "completion ended without a final message".into(),
                        )
                        .into());
                    }
                }
            };

            let message = outcome.message;
            working.push(message.clone());
            self.history.append(id, &message);
            sink.emit(StreamEvent::MessageComplete {
                message: message.clone(),
            })
            .await?;

            if outcome.stop_reason == StopReason::EndTurn {
                return Ok(products);
            }

            // ── Act ──
            debug!(conversation_id = %id, tool_count = message.tool_calls.len(), "Executing tool calls");
            for call in &message.tool_calls {
                let result = self
                    .act(call, invoker, sink, cancel, &mut products)
                    .await?;

                let tool_message =
                    Message::tool_result(&result.tool_call_id, &result.content, result.is_error);
                working.push(tool_message.clone());
                self.history.append(id, &tool_message);

                let event = if result.is_auth_required() {
                    StreamEvent::AuthRequired {
                        tool_call_id: call.id.clone(),
                        name: call.name.clone(),
                        message: result.content,
                    }
                } else {
                    StreamEvent::NewMessage {
                        message: tool_message,
                    }
                };
                sink.emit(event).await?;
            }
        }

        warn!(
            conversation_id = %id,
            iterations = self.max_iterations,
            "Max completion rounds reached, ending turn"
        );
        Ok(products)
    }

    /// Announce and perform one tool call.
    async fn act(
        &self,
        call: &MessageToolCall,
        invoker: &ToolInvoker,
        sink: &mut EventSink,
        cancel: &CancellationToken,
        products: &mut Vec<ProductSummary>,
    ) -> Result<ToolResult, TurnAbort> {
        let parsed = call.parsed_arguments();
        let shown = match &parsed {
            Ok(args) => Value::Object(args.clone()),
            Err(_) => Value::String(call.arguments.clone()),
        };
        sink.emit(StreamEvent::ToolUse {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            arguments: shown,
        })
        .await?;

        match parsed {
            Ok(args) => {
                let request = ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: Value::Object(args),
                };
                let invocation = guarded(cancel, invoker.invoke(&request)).await?;
                products.extend(invocation.products);
                Ok(invocation.result)
            }
            Err(reason) => {
                warn!(tool = %call.name, call_id = %call.id, reason = %reason, "Malformed tool arguments");
                Ok(ToolResult::from_error(
                    &call.id,
                    &ToolError::InvalidArguments(reason),
                ))
            }
        }
    }
}
