//! Streaming task-session engine.
//!
//! Provides:
//! - `FrameDecoder` - Incremental byte-stream to event decoding
//! - `RetryPolicy` - Capped exponential backoff with a retry budget
//! - `SuspensionGate` - Interactive question suspension
//! - `TaskSession` / `SessionHandle` - The per-session protocol state machine

pub mod frame;
pub mod retry;
pub mod session;
pub mod suspension;

pub use frame::FrameDecoder;
pub use retry::RetryPolicy;
pub use session::{SessionConfig, SessionError, SessionHandle, TaskSession};
pub use suspension::{SuspensionError, SuspensionGate};
