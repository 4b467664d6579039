//! Core abstractions for streaming agent task sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `StreamEvent` - Typed event records decoded from the task stream
//! - `Question` / `AnswerValue` - Interactive question protocol
//! - `TaskContext` - Resumable description of one logical task
//! - `EventBus` - Broadcast + history for late and re-attaching consumers
//! - Transport and timer traits

pub mod bus;
pub mod context;
pub mod event;
pub mod question;
pub mod state;
pub mod transport;

pub use bus::{EventBus, SessionMsg};
pub use context::{AnswerRequest, PermissionMode, TaskContext, TaskRequest};
pub use event::{EventKind, EventPayload, StreamEvent};
pub use question::{AnswerType, AnswerValue, Question, QuestionOption};
pub use state::{ConnectionState, RetryInfo, StatusSnapshot};
pub use transport::{ByteStream, Sleeper, StreamTransport, TokioSleeper, TransportError};

/// Client-side task identifier.
pub type TaskId = uuid::Uuid;
