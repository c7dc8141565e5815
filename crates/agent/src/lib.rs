//! The conversation engine: the heart of shopwire.
//!
//! A turn follows a **Complete → Act → Observe** cycle:
//!
//! 1. **Receive** a user message and announce the conversation id
//! 2. **Replay** a short window of earlier user/assistant text
//! 3. **Stream** a completion, forwarding text as it arrives
//! 4. **If tool calls**: run them against the conversation's tool catalog,
//!    append results, loop back to step 3
//! 5. **Otherwise**: emit any product cards and end the turn
//!
//! The loop stops when the model answers without tool calls or the
//! iteration ceiling is reached.

pub mod completion;
pub mod history;
pub mod loop_runner;
pub mod multiplexer;
pub mod orchestrator;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod testing;

pub use completion::{CompletionAdapter, CompletionEvent, CompletionOutcome, StopReason};
pub use history::HistoryManager;
pub use loop_runner::{ConversationLoop, TurnInput};
pub use multiplexer::{EventSink, TurnStream};
pub use orchestrator::{ChatRequest, Orchestrator};
pub use stream_event::StreamEvent;
