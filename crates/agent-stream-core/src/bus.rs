//! Broadcast + history message bus for session consumers.

use std::{
    collections::VecDeque,
    sync::{Arc, RwLock},
};

use futures::{StreamExt, future};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::event::{EventPayload, StreamEvent};

/// Default history size limit.
const HISTORY_BYTES: usize = 100_000 * 1024;

/// Message carried on the bus.
///
/// Decoded stream events plus the few client-originated notices the protocol
/// requires (violations, fatal failures, end of session).
#[derive(Debug, Clone)]
pub enum SessionMsg {
    /// A decoded stream event, in exact decode order.
    Event(StreamEvent),
    /// The server violated the stream protocol; the stream continues.
    ProtocolViolation { message: String },
    /// The session failed permanently (e.g. retry budget exhausted).
    Fatal { message: String },
    /// No further messages will follow.
    Finished,
}

impl SessionMsg {
    fn approx_bytes(&self) -> usize {
        const OVERHEAD: usize = 64;
        let payload = match self {
            Self::Event(event) => match &event.payload {
                EventPayload::Text { content } | EventPayload::Thinking { content } => {
                    content.len()
                }
                EventPayload::ToolUse { tool_name, tool_input } => {
                    tool_name.len() + tool_input.to_string().len()
                }
                EventPayload::ToolResult { content, metadata, .. } => {
                    content.as_ref().map_or(0, String::len)
                        + metadata.as_ref().map_or(0, |m| m.to_string().len())
                }
                EventPayload::Error { content } => content.len(),
                EventPayload::Complete { metadata } => {
                    metadata.as_ref().map_or(0, |m| m.to_string().len())
                }
                EventPayload::AskUserQuestion { question } => question.prompt.len(),
            },
            Self::ProtocolViolation { message } | Self::Fatal { message } => message.len(),
            Self::Finished => 0,
        };
        payload + OVERHEAD
    }
}

#[derive(Clone)]
struct StoredMsg {
    msg: SessionMsg,
    bytes: usize,
}

struct Inner {
    history: VecDeque<StoredMsg>,
    total_bytes: usize,
}

/// Message bus with broadcast and history support.
///
/// A consumer that attaches late (or re-attaches after its own disconnect)
/// receives the retained history in order, then switches to live updates.
pub struct EventBus {
    inner: RwLock<Inner>,
    sender: broadcast::Sender<SessionMsg>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a new bus.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(10000);
        Self {
            inner: RwLock::new(Inner {
                history: VecDeque::with_capacity(32),
                total_bytes: 0,
            }),
            sender,
        }
    }

    /// Push a message to both live listeners and history.
    pub fn push(&self, msg: SessionMsg) {
        let _ = self.sender.send(msg.clone()); // live listeners
        let bytes = msg.approx_bytes();

        let mut inner = self.inner.write().unwrap();
        while inner.total_bytes.saturating_add(bytes) > HISTORY_BYTES {
            if let Some(front) = inner.history.pop_front() {
                inner.total_bytes = inner.total_bytes.saturating_sub(front.bytes);
            } else {
                break;
            }
        }
        inner.history.push_back(StoredMsg { msg, bytes });
        inner.total_bytes = inner.total_bytes.saturating_add(bytes);
    }

    /// Push a decoded stream event.
    pub fn push_event(&self, event: StreamEvent) {
        self.push(SessionMsg::Event(event));
    }

    /// Push a protocol-violation notice.
    pub fn push_violation<S: Into<String>>(&self, message: S) {
        self.push(SessionMsg::ProtocolViolation {
            message: message.into(),
        });
    }

    /// Push a fatal failure notice.
    pub fn push_fatal<S: Into<String>>(&self, message: S) {
        self.push(SessionMsg::Fatal {
            message: message.into(),
        });
    }

    /// Push the end-of-session marker.
    pub fn push_finished(&self) {
        self.push(SessionMsg::Finished);
    }

    /// Get a receiver for live updates only.
    #[must_use]
    pub fn get_receiver(&self) -> broadcast::Receiver<SessionMsg> {
        self.sender.subscribe()
    }

    /// Get a snapshot of the history.
    #[must_use]
    pub fn get_history(&self) -> Vec<SessionMsg> {
        self.inner
            .read()
            .unwrap()
            .history
            .iter()
            .map(|s| s.msg.clone())
            .collect()
    }

    /// Stream that yields history first, then live updates.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, SessionMsg> {
        let (history, rx) = (self.get_history(), self.get_receiver());

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        Box::pin(hist.chain(live))
    }

    /// Stream of decoded events only, ending at the `Finished` marker.
    #[must_use]
    pub fn event_stream(&self) -> futures::stream::BoxStream<'static, StreamEvent> {
        self.history_plus_stream()
            .take_while(|msg| future::ready(!matches!(msg, SessionMsg::Finished)))
            .filter_map(|msg| async move {
                match msg {
                    SessionMsg::Event(event) => Some(event),
                    _ => None,
                }
            })
            .boxed()
    }
}
