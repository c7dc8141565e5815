//! Stream Multiplexer.
//!
//! The loop writes events into an `EventSink`; the caller reads them from a
//! `TurnStream`. The terminal methods consume the sink, so after `end_turn`
//! or `fail` nothing else can be sent and the channel closes.

use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::stream_event::StreamEvent;

/// The caller went away; nobody is reading the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// Writing half of one turn's event stream.
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
}

/// Reading half of one turn's event stream.
pub struct TurnStream {
    inner: ReceiverStream<StreamEvent>,
}

/// Create a connected sink/stream pair.
pub fn channel(capacity: usize) -> (EventSink, TurnStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        EventSink { tx },
        TurnStream {
            inner: ReceiverStream::new(rx),
        },
    )
}

impl EventSink {
    /// Deliver a non-terminal event in order.
    pub async fn emit(&mut self, event: StreamEvent) -> Result<(), SinkClosed> {
        debug_assert!(!event.is_terminal(), "terminal events go through end_turn/fail");
        self.tx.send(event).await.map_err(|_| SinkClosed)
    }

    /// Close the turn normally.
    pub async fn end_turn(self) {
        let _ = self.tx.send(StreamEvent::EndTurn).await;
    }

    /// Close the turn with a single error event.
    pub async fn fail(self, error: impl Into<String>) {
        let _ = self
            .tx
            .send(StreamEvent::Error {
                error: error.into(),
            })
            .await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl TurnStream {
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        futures::StreamExt::next(&mut self.inner).await
    }

    /// Drain every event until the stream closes.
    pub async fn collect_events(mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }
}

impl Stream for TurnStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
