//! Stream transport implementations.
//!
//! Provides:
//! - HTTP transport over reqwest (feature: http, default)
//! - In-process channel transport for tests and demos

pub mod channel;

#[cfg(feature = "http")]
pub mod http;

pub use channel::{ChannelBackend, ChannelConn, ChannelTransport};

#[cfg(feature = "http")]
pub use http::HttpTransport;
