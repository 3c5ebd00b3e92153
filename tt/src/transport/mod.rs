//! Message transport for the streaming session
//!
//! The session is split into a read half, owned exclusively by the event stream
//! reader, and a write half used for the subscribe request and the final close
//! frame. Both halves sit behind traits so the lifecycle can run over any
//! message channel.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::management::{ClientEvent, ServerEvent};

#[cfg(test)]
pub mod mock;
mod websocket;

pub use websocket::{WebSocketReader, WebSocketWriter, split};

/// Close code and reason carried by a close frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseStatus {
    pub code: u16,
    pub reason: String,
}

impl CloseStatus {
    pub const NORMAL_CLOSURE: u16 = 1000;
    pub const NO_STATUS_RECEIVED: u16 = 1005;
    pub const INTERNAL_ERROR: u16 = 1011;

    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Normal closure with an empty reason
    pub fn normal() -> Self {
        Self::new(Self::NORMAL_CLOSURE, "")
    }

    pub fn is_normal(&self) -> bool {
        self.code == Self::NORMAL_CLOSURE
    }
}

impl fmt::Display for CloseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.code, self.reason)
    }
}

/// Closure status of the write half
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
}

/// Errors raised while reading from or writing to the session
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connection closed: {0}")]
    Closed(CloseStatus),

    #[error("connection ended without a close frame")]
    Disconnected,

    #[error("unable to decode event: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl StreamError {
    /// Extract the close status when this error is the remote closing the session
    pub fn as_closed(&self) -> Option<&CloseStatus> {
        match self {
            StreamError::Closed(status) => Some(status),
            _ => None,
        }
    }
}

/// Read half of a streaming session
#[async_trait]
pub trait EventReader: Send {
    /// Wait for and decode the next server event
    async fn next_event(&mut self) -> Result<ServerEvent, StreamError>;
}

/// Write half of a streaming session
#[async_trait]
pub trait EventWriter: Send {
    /// Send a client event
    async fn send_event(&mut self, event: &ClientEvent) -> Result<(), StreamError>;

    /// Start the close handshake
    ///
    /// Idempotent: once a close frame has been sent, further calls return `Ok(())`
    /// without touching the transport.
    async fn close(&mut self, status: CloseStatus) -> Result<(), StreamError>;

    /// Current closure status
    fn state(&self) -> SessionState;
}
