//! Seam traits: the stream transport and the retry timer.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::context::{AnswerRequest, TaskRequest};

/// Raw byte chunks of one physical connection.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),
    #[error("Request rejected: status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("Stream failed: {0}")]
    Stream(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for opening task streams and submitting answers.
///
/// One implementation per backend; the session engine only sees this seam.
/// `open` is called once per physical connection (initial submission,
/// follow-up turn, or reconnect); `answer` is the out-of-band side channel.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open a new event stream for `request`.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established or the
    /// server rejects the request.
    async fn open(&self, request: &TaskRequest) -> Result<ByteStream, TransportError>;

    /// Submit an answer to a pending question, out-of-band from the stream.
    ///
    /// # Errors
    /// Returns an error if delivery fails; the pending question is unaffected.
    async fn answer(&self, request: &AnswerRequest) -> Result<(), TransportError>;
}

/// Trait for the backoff timer, injectable so retry logic is testable
/// without real sleeps.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio runtime clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
