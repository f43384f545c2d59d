//! The abstract bidirectional connection a participant talks through.
//!
//! A connection is split into a sink (written only by the participant's
//! outbound task) and a stream (read only by its inbound task).

pub mod memory;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Closed,
    Timeout,
    Io(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Closed => write!(f, "Connection closed"),
            TransportError::Timeout => write!(f, "Connection timed out"),
            TransportError::Io(msg) => write!(f, "Transport error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Normal,
    GoingAway,
    InternalError,
}

#[async_trait]
pub trait MessageSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    async fn send_ping(&mut self) -> Result<(), TransportError>;

    async fn close(&mut self, reason: CloseReason);
}

#[async_trait]
pub trait MessageStream: Send {
    /// Next text frame. `None` once the peer closed gracefully.
    async fn next_text(&mut self) -> Option<Result<String, TransportError>>;
}

/// A live connection handed to the core by the session layer.
pub struct Connection {
    pub sink: Box<dyn MessageSink>,
    pub stream: Box<dyn MessageStream>,
}

impl Connection {
    pub fn new(sink: Box<dyn MessageSink>, stream: Box<dyn MessageStream>) -> Self {
        Connection { sink, stream }
    }
}
