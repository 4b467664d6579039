//! Connection state published to external observers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection state of a task session. Exactly one is active per session.
///
/// Transitions are driven only by the session state machine; everything else
/// reads them through the published [`StatusSnapshot`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Retry progress shown while `Reconnecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryInfo {
    /// Attempt about to be made (1-based).
    pub attempt: u32,
    /// Retry budget.
    pub max_attempts: u32,
    /// Backoff delay before the attempt fires.
    pub delay: Duration,
}

/// Observable indicator for the UI or any external consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: ConnectionState,
    /// Populated only while `Reconnecting`.
    pub retry: Option<RetryInfo>,
}

impl StatusSnapshot {
    /// Snapshot for a plain state with no retry in flight.
    #[must_use]
    pub const fn of(state: ConnectionState) -> Self {
        Self { state, retry: None }
    }

    /// Snapshot for `Reconnecting` with retry progress.
    #[must_use]
    pub const fn reconnecting(retry: RetryInfo) -> Self {
        Self {
            state: ConnectionState::Reconnecting,
            retry: Some(retry),
        }
    }
}
