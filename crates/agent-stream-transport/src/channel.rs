//! In-process channel transport.
//!
//! Backs a session with channels instead of a network: the transport half is
//! handed to the session, the backend half to the test (or demo) driving it.
//! Useful for deterministic protocol tests and for wiring a session to a
//! local event producer.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use agent_stream_core::{
    AnswerRequest, ByteStream, StreamEvent, StreamTransport, TaskRequest, TransportError,
};

/// Create a connected transport/backend pair.
///
/// See [`ChannelTransport::pair`].
#[must_use]
pub fn pair() -> (ChannelTransport, ChannelBackend) {
    ChannelTransport::pair()
}

/// Transport half: hand this to the session.
pub struct ChannelTransport {
    conn_tx: mpsc::UnboundedSender<ChannelConn>,
    answers: Arc<Mutex<Vec<AnswerRequest>>>,
    open_count: Arc<AtomicUsize>,
    fail_opens: Arc<AtomicUsize>,
}

/// Backend half: accepts connections and inspects submissions.
pub struct ChannelBackend {
    conn_rx: mpsc::UnboundedReceiver<ChannelConn>,
    answers: Arc<Mutex<Vec<AnswerRequest>>>,
    open_count: Arc<AtomicUsize>,
}

/// One accepted connection, seen from the backend side.
pub struct ChannelConn {
    request: TaskRequest,
    chunk_tx: mpsc::UnboundedSender<Result<Bytes, TransportError>>,
}

impl ChannelTransport {
    /// Create a connected transport/backend pair.
    #[must_use]
    pub fn pair() -> (Self, ChannelBackend) {
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        let answers = Arc::new(Mutex::new(Vec::new()));
        let open_count = Arc::new(AtomicUsize::new(0));

        let transport = Self {
            conn_tx,
            answers: Arc::clone(&answers),
            open_count: Arc::clone(&open_count),
            fail_opens: Arc::new(AtomicUsize::new(0)),
        };
        let backend = ChannelBackend {
            conn_rx,
            answers,
            open_count,
        };
        (transport, backend)
    }

    /// Make the next `n` calls to `open` fail with a connect error.
    pub fn fail_next_opens(&self, n: usize) {
        self.fail_opens.store(n, Ordering::SeqCst);
    }

    /// Total `open` calls so far, including injected failures.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    fn take_injected_failure(&self) -> bool {
        let mut current = self.fail_opens.load(Ordering::SeqCst);
        loop {
            if current == 0 {
                return false;
            }
            match self.fail_opens.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

#[async_trait]
impl StreamTransport for ChannelTransport {
    async fn open(&self, request: &TaskRequest) -> Result<ByteStream, TransportError> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        if self.take_injected_failure() {
            return Err(TransportError::Connect("injected failure".into()));
        }

        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let conn = ChannelConn {
            request: request.clone(),
            chunk_tx,
        };
        self.conn_tx
            .send(conn)
            .map_err(|_| TransportError::Connect("backend closed".into()))?;

        Ok(UnboundedReceiverStream::new(chunk_rx).boxed())
    }

    async fn answer(&self, request: &AnswerRequest) -> Result<(), TransportError> {
        self.answers.lock().unwrap().push(request.clone());
        Ok(())
    }
}

impl ChannelBackend {
    /// Wait for the next connection. `None` once the transport is dropped.
    pub async fn accept(&mut self) -> Option<ChannelConn> {
        self.conn_rx.recv().await
    }

    /// Total `open` calls so far, including injected failures.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Answers submitted through the side channel, in order.
    #[must_use]
    pub fn answers(&self) -> Vec<AnswerRequest> {
        self.answers.lock().unwrap().clone()
    }
}

impl ChannelConn {
    /// The submission that opened this connection.
    #[must_use]
    pub const fn request(&self) -> &TaskRequest {
        &self.request
    }

    /// Send a raw chunk of bytes, which may contain partial lines.
    pub fn send_chunk(&self, chunk: impl Into<Bytes>) {
        let _ = self.chunk_tx.send(Ok(chunk.into()));
    }

    /// Send one complete line (newline appended).
    pub fn send_line(&self, line: &str) {
        self.send_chunk(format!("{line}\n").into_bytes());
    }

    /// Send an event as a framed `data: ` record.
    pub fn send_event(&self, event: &StreamEvent) {
        match serde_json::to_string(event) {
            Ok(json) => self.send_line(&format!("data: {json}")),
            Err(error) => tracing::error!(%error, "failed to serialize event"),
        }
    }

    /// Fail the stream with a transport error.
    pub fn fail(&self, message: &str) {
        let _ = self
            .chunk_tx
            .send(Err(TransportError::Stream(message.into())));
    }

    /// End the stream cleanly.
    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use agent_stream_core::{EventPayload, TaskContext};

    use super::*;

    #[tokio::test]
    async fn test_open_delivers_request_and_chunks() {
        let (transport, mut backend) = pair();
        let request = TaskContext::new("hello").to_request(false);

        let mut stream = transport.open(&request).await.unwrap();
        let conn = backend.accept().await.unwrap();
        assert_eq!(conn.request().prompt, "hello");

        conn.send_event(&StreamEvent::new(EventPayload::Text {
            content: "hi".into(),
        }));
        let chunk = stream.next().await.unwrap().unwrap();
        assert!(chunk.starts_with(b"data: "));
        assert!(chunk.ends_with(b"\n"));

        drop(conn);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_injected_failures_are_counted_and_consumed() {
        let (transport, backend) = pair();
        transport.fail_next_opens(2);
        let request = TaskContext::new("x").to_request(false);

        assert!(transport.open(&request).await.is_err());
        assert!(transport.open(&request).await.is_err());
        assert!(transport.open(&request).await.is_ok());
        assert_eq!(backend.open_count(), 3);
    }

    #[tokio::test]
    async fn test_answers_are_recorded_in_order() {
        let (transport, backend) = pair();
        for id in ["q-1", "q-2"] {
            transport
                .answer(&AnswerRequest {
                    session_id: "s-1".into(),
                    question_id: id.into(),
                    answer: agent_stream_core::AnswerValue::Boolean(true),
                })
                .await
                .unwrap();
        }
        let ids: Vec<_> = backend
            .answers()
            .into_iter()
            .map(|a| a.question_id)
            .collect();
        assert_eq!(ids, ["q-1", "q-2"]);
    }
}
