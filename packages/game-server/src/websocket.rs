//! Adapts an upgraded axum WebSocket to the lobby's connection traits.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tracing::debug;

use shared::transport::{CloseReason, Connection, MessageSink, MessageStream, TransportError};

/// Upper bound on a single frame write before the peer is considered gone.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

pub fn into_connection(socket: WebSocket, pong_wait: Duration) -> Connection {
    let (sink, stream) = socket.split();
    Connection::new(
        Box::new(WebSocketSink { sink }),
        Box::new(WebSocketStream { stream, pong_wait }),
    )
}

struct WebSocketSink {
    sink: SplitSink<WebSocket, Message>,
}

impl WebSocketSink {
    async fn write(&mut self, message: Message) -> Result<(), TransportError> {
        match timeout(WRITE_WAIT, self.sink.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Io(e.to_string())),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

#[async_trait]
impl MessageSink for WebSocketSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.write(Message::Text(text.into())).await
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.write(Message::Ping(Bytes::new())).await
    }

    async fn close(&mut self, reason: CloseReason) {
        let code = match reason {
            CloseReason::Normal => close_code::NORMAL,
            CloseReason::GoingAway => close_code::AWAY,
            CloseReason::InternalError => close_code::ERROR,
        };
        let frame = CloseFrame {
            code,
            reason: "".into(),
        };
        if let Err(e) = self.write(Message::Close(Some(frame))).await {
            debug!("Close frame not delivered: {}", e);
        }
        let _ = self.sink.close().await;
    }
}

struct WebSocketStream {
    stream: SplitStream<WebSocket>,
    pong_wait: Duration,
}

#[async_trait]
impl MessageStream for WebSocketStream {
    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            let message = match timeout(self.pong_wait, self.stream.next()).await {
                Err(_) => return Some(Err(TransportError::Timeout)),
                Ok(None) => return None,
                Ok(Some(Err(e))) => return Some(Err(TransportError::Io(e.to_string()))),
                Ok(Some(Ok(message))) => message,
            };
            match message {
                Message::Text(text) => return Some(Ok(text.as_str().to_string())),
                Message::Close(_) => return None,
                // Pings, pongs and binary frames only count as liveness.
                Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => continue,
            }
        }
    }
}
