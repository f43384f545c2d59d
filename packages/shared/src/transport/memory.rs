//! In-process connection backed by unbounded channels. The server half is a
//! regular [`Connection`]; the client half lets callers script a peer.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{CloseReason, Connection, MessageSink, MessageStream, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping,
    Close(CloseReason),
}

struct MemorySink {
    tx: mpsc::UnboundedSender<Frame>,
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.tx
            .send(Frame::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.tx.send(Frame::Ping).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self, reason: CloseReason) {
        let _ = self.tx.send(Frame::Close(reason));
    }
}

struct MemoryStream {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl MessageStream for MemoryStream {
    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}

/// The scripted peer of a memory connection.
pub struct MemoryClient {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryClient {
    /// Queues a frame for the server. Returns false once hung up.
    pub fn send(&self, text: impl Into<String>) -> bool {
        match &self.tx {
            Some(tx) => tx.send(text.into()).is_ok(),
            None => false,
        }
    }

    /// Closes the client-to-server direction, as a browser tab closing would.
    pub fn hang_up(&mut self) {
        self.tx = None;
    }

    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Next text frame, skipping pings. `None` on close.
    pub async fn recv_text(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await? {
                Frame::Text(text) => return Some(text),
                Frame::Ping => continue,
                Frame::Close(_) => return None,
            }
        }
    }

    /// Everything already delivered, without waiting.
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

pub fn pair() -> (Connection, MemoryClient) {
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    let (client_tx, server_rx) = mpsc::unbounded_channel();

    let connection = Connection::new(
        Box::new(MemorySink { tx: server_tx }),
        Box::new(MemoryStream { rx: server_rx }),
    );
    let client = MemoryClient {
        tx: Some(client_tx),
        rx: client_rx,
    };
    (connection, client)
}
