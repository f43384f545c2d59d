//! A participant's connection inside a game: its seat, its clock and the
//! outbound queues the room writes to.
//!
//! Every connection runs two tasks. The outbound task is the only writer
//! to the sink and multiplexes the move, chat and signal queues with a
//! keepalive ping. The inbound task is the only reader of the stream and
//! turns client frames into room events.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    color::Color,
    messages::{ChatLine, ClientMessage, Signal},
    time_control::TimeControl,
    user::User,
};
use crate::services::{
    clock::Clock,
    room::{RoomEvent, RoomHandle},
    room_matcher::PoolHandle,
};
use crate::settings::LobbySettings;
use crate::transport::{CloseReason, MessageSink, MessageStream};

pub type HandleId = Uuid;

/// Moves are delivered promptly or not at all.
const MOVE_QUEUE_CAPACITY: usize = 2;
const SIGNAL_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    Full,
    Closed,
}

impl<T> From<mpsc::error::TrySendError<T>> for QueueError {
    fn from(err: mpsc::error::TrySendError<T>) -> Self {
        match err {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        }
    }
}

/// Sending halves of a participant's outbound queues.
#[derive(Debug)]
pub struct Outbox {
    moves: Option<mpsc::Sender<String>>,
    chat: mpsc::Sender<ChatLine>,
    signals: mpsc::Sender<Signal>,
    disconnect: mpsc::Sender<()>,
}

impl Outbox {
    pub fn push_move(&self, text: String) -> Result<(), QueueError> {
        match &self.moves {
            Some(moves) => moves.try_send(text).map_err(QueueError::from),
            None => Err(QueueError::Closed),
        }
    }

    pub fn push_chat(&self, line: ChatLine) -> Result<(), QueueError> {
        self.chat.try_send(line).map_err(QueueError::from)
    }

    pub fn signal(&self, signal: Signal) -> Result<(), QueueError> {
        self.signals.try_send(signal).map_err(QueueError::from)
    }

    /// Tells the outbound task to stop without a close frame.
    pub fn disconnect(&self) {
        let _ = self.disconnect.try_send(());
    }

    /// Closes the move queue, which makes the outbound task end the
    /// connection gracefully.
    pub fn close(&mut self) {
        self.moves = None;
    }
}

/// Receiving halves, owned by the outbound task.
pub struct OutboundQueues {
    moves: mpsc::Receiver<String>,
    chat: mpsc::Receiver<ChatLine>,
    signals: mpsc::Receiver<Signal>,
    disconnect: mpsc::Receiver<()>,
}

#[derive(Debug)]
pub struct Player {
    pub handle_id: HandleId,
    pub match_id: String,
    pub user: User,
    pub color: Color,
    pub time_control: TimeControl,
    pub clock: Clock,
    pub last_move: Option<Instant>,
    pub outbox: Outbox,
    room: watch::Sender<Option<RoomHandle>>,
}

impl Player {
    pub fn new(
        match_id: &str,
        user: User,
        color: Color,
        time_control: TimeControl,
        chat_queue_capacity: usize,
    ) -> (Player, OutboundQueues, watch::Receiver<Option<RoomHandle>>) {
        let (moves_tx, moves_rx) = mpsc::channel(MOVE_QUEUE_CAPACITY);
        let (chat_tx, chat_rx) = mpsc::channel(chat_queue_capacity.max(1));
        let (signals_tx, signals_rx) = mpsc::channel(SIGNAL_QUEUE_CAPACITY);
        let (disconnect_tx, disconnect_rx) = mpsc::channel(1);
        let (room_tx, room_rx) = watch::channel(None);

        let player = Player {
            handle_id: Uuid::new_v4(),
            match_id: match_id.to_string(),
            user,
            color,
            time_control,
            clock: Clock::new(time_control.duration()),
            last_move: None,
            outbox: Outbox {
                moves: Some(moves_tx),
                chat: chat_tx,
                signals: signals_tx,
                disconnect: disconnect_tx,
            },
            room: room_tx,
        };
        let queues = OutboundQueues {
            moves: moves_rx,
            chat: chat_rx,
            signals: signals_rx,
            disconnect: disconnect_rx,
        };
        (player, queues, room_rx)
    }

    pub fn attach(&self, room: RoomHandle) {
        self.room.send_replace(Some(room));
    }

    pub fn detach(&self) {
        self.room.send_replace(None);
    }
}

pub struct OutboundContext {
    pub recipient_id: String,
    pub default_username: String,
    pub ping_period: Duration,
}

impl OutboundContext {
    pub fn new(recipient_id: &str, settings: &LobbySettings) -> Self {
        OutboundContext {
            recipient_id: recipient_id.to_string(),
            default_username: settings.default_username.clone(),
            ping_period: settings.ping_period,
        }
    }
}

/// Drains the participant's queues onto the connection until the room
/// closes the move queue, the room disconnects it, or a write fails.
pub async fn run_outbound(
    mut sink: Box<dyn MessageSink>,
    mut queues: OutboundQueues,
    context: OutboundContext,
) {
    let mut keepalive = tokio::time::interval_at(
        Instant::now() + context.ping_period,
        context.ping_period,
    );

    loop {
        let written = tokio::select! {
            Some(()) = queues.disconnect.recv() => {
                debug!("Outbound task for {} disconnected by room", context.recipient_id);
                return;
            }
            next = queues.moves.recv() => match next {
                Some(text) => sink.send_text(text).await,
                None => {
                    debug!("Move queue closed for {}, closing connection", context.recipient_id);
                    let pending = drain_chat(&mut queues.chat, &context, Vec::new());
                    if !pending.is_empty() {
                        if let Err(e) = sink.send_text(pending.join("\n")).await {
                            debug!("Final chat to {} not delivered: {}", context.recipient_id, e);
                        }
                    }
                    sink.close(CloseReason::GoingAway).await;
                    return;
                }
            },
            Some(line) = queues.chat.recv() => {
                let first = vec![line.render_for(&context.recipient_id, &context.default_username)];
                let batch = drain_chat(&mut queues.chat, &context, first);
                sink.send_text(batch.join("\n")).await
            }
            Some(signal) = queues.signals.recv() => sink.send_text(signal.payload()).await,
            _ = keepalive.tick() => sink.send_ping().await,
        };

        if let Err(e) = written {
            debug!("Write to {} failed: {}", context.recipient_id, e);
            return;
        }
    }
}

/// Appends every chat line already queued, rendered for the recipient.
fn drain_chat(
    chat: &mut mpsc::Receiver<ChatLine>,
    context: &OutboundContext,
    mut batch: Vec<String>,
) -> Vec<String> {
    while let Ok(line) = chat.try_recv() {
        batch.push(line.render_for(&context.recipient_id, &context.default_username));
    }
    batch
}

pub struct InboundContext {
    pub handle_id: HandleId,
    pub match_id: String,
    pub room: watch::Receiver<Option<RoomHandle>>,
    pub pool: PoolHandle,
}

/// Reads client frames and forwards them to the room. Frames that arrive
/// before the room is attached are dropped. When the connection ends the
/// room is told, or the pending seat is given up if pairing never happened.
pub async fn run_inbound(mut stream: Box<dyn MessageStream>, context: InboundContext) {
    let InboundContext {
        handle_id,
        match_id,
        room,
        pool,
    } = context;

    while let Some(frame) = stream.next_text().await {
        let text = match frame {
            Ok(text) => text,
            Err(e) => {
                debug!("Read from handle {} ended: {}", handle_id, e);
                break;
            }
        };

        let message = match ClientMessage::decode(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping connection {} after undecodable frame: {}", handle_id, e);
                break;
            }
        };

        let event = match message {
            ClientMessage::FinishRoom => {
                info!("Handle {} left match {}", handle_id, match_id);
                break;
            }
            other => match RoomEvent::from_message(handle_id, other) {
                Some(event) => event,
                None => {
                    debug!("Ignoring unrecognised frame from {}", handle_id);
                    continue;
                }
            },
        };

        let current = room.borrow().clone();
        match current {
            Some(room) => {
                if room.send(event).await.is_err() {
                    debug!("Room for match {} is gone", match_id);
                    break;
                }
            }
            None => debug!("Dropping frame from {} before pairing", handle_id),
        }
    }

    let current = room.borrow().clone();
    match current {
        Some(room) => room.disconnect(handle_id).await,
        None => pool.abandon(&match_id, handle_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{self, Frame};

    fn player(color: Color) -> (Player, OutboundQueues, watch::Receiver<Option<RoomHandle>>) {
        Player::new(
            "match-1",
            User::new("u-1", "alice"),
            color,
            TimeControl::OneMinute,
            4,
        )
    }

    fn context() -> OutboundContext {
        OutboundContext {
            recipient_id: "u-1".to_string(),
            default_username: "anonymous".to_string(),
            ping_period: Duration::from_secs(54),
        }
    }

    #[test]
    fn test_new_player_has_full_stopped_clock() {
        let (player, _, room) = player(Color::White);

        assert_eq!(player.clock.remaining(), Duration::from_secs(60));
        assert!(!player.clock.is_running());
        assert!(player.last_move.is_none());
        assert!(room.borrow().is_none());
    }

    #[test]
    fn test_move_queue_holds_two_entries() {
        let (player, _queues, _) = player(Color::White);

        assert_eq!(player.outbox.push_move("a".to_string()), Ok(()));
        assert_eq!(player.outbox.push_move("b".to_string()), Ok(()));
        assert_eq!(
            player.outbox.push_move("c".to_string()),
            Err(QueueError::Full)
        );
    }

    #[test]
    fn test_closed_move_queue_rejects_moves() {
        let (mut player, _queues, _) = player(Color::White);

        player.outbox.close();

        assert_eq!(
            player.outbox.push_move("a".to_string()),
            Err(QueueError::Closed)
        );
    }

    #[tokio::test]
    async fn test_outbound_batches_chat_burst_into_one_write() {
        let (connection, mut client) = memory::pair();
        let (player, queues, _) = player(Color::White);
        for n in 0..3 {
            player
                .outbox
                .push_chat(ChatLine {
                    text: format!("line {}", n),
                    from: "bob".to_string(),
                    sender_id: "u-2".to_string(),
                })
                .unwrap();
        }

        tokio::spawn(run_outbound(connection.sink, queues, context()));

        let text = client.recv_text().await.unwrap();
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], r#"{"chat":"line 0","from":"bob"}"#);
    }

    #[tokio::test]
    async fn test_outbound_closes_gracefully_when_move_queue_closes() {
        let (connection, mut client) = memory::pair();
        let (mut player, queues, _) = player(Color::Black);
        player.outbox.push_move(r#"{"clock":1}"#.to_string()).unwrap();

        let task = tokio::spawn(run_outbound(connection.sink, queues, context()));
        assert_eq!(client.recv_text().await.unwrap(), r#"{"clock":1}"#);
        player.outbox.close();
        task.await.unwrap();

        assert_eq!(
            client.recv().await,
            Some(Frame::Close(CloseReason::GoingAway))
        );
    }

    #[tokio::test]
    async fn test_outbound_flushes_queued_chat_before_closing() {
        let (connection, mut client) = memory::pair();
        let (mut player, queues, _) = player(Color::White);
        player
            .outbox
            .push_chat(ChatLine {
                text: "gg".to_string(),
                from: "bob".to_string(),
                sender_id: "u-2".to_string(),
            })
            .unwrap();
        player.outbox.close();

        run_outbound(connection.sink, queues, context()).await;

        assert_eq!(
            client.recv().await,
            Some(Frame::Text(r#"{"chat":"gg","from":"bob"}"#.to_string()))
        );
        assert_eq!(
            client.recv().await,
            Some(Frame::Close(CloseReason::GoingAway))
        );
    }

    #[tokio::test]
    async fn test_outbound_stops_without_close_frame_on_disconnect() {
        let (connection, mut client) = memory::pair();
        let (player, queues, _) = player(Color::White);

        player.outbox.disconnect();
        run_outbound(connection.sink, queues, context()).await;

        assert_eq!(client.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbound_sends_keepalive_pings() {
        let (connection, mut client) = memory::pair();
        let (_player, queues, _) = player(Color::White);

        tokio::spawn(run_outbound(connection.sink, queues, context()));
        tokio::time::sleep(Duration::from_secs(55)).await;

        assert_eq!(client.recv().await, Some(Frame::Ping));
    }

    #[tokio::test]
    async fn test_outbound_delivers_signals() {
        let (connection, mut client) = memory::pair();
        let (player, queues, _) = player(Color::White);
        player.outbox.signal(Signal::OpponentReady).unwrap();

        tokio::spawn(run_outbound(connection.sink, queues, context()));

        assert_eq!(client.recv_text().await.unwrap(), r#"{"oppReady":"true"}"#);
    }
}
